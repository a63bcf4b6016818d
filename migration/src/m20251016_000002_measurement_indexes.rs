use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_measurements_experiment_sequence")
                    .table(Measurements::Table)
                    .col(Measurements::ExperimentId)
                    .col(Measurements::SequenceNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_measurements_timestamp")
                    .table(Measurements::Table)
                    .col(Measurements::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_alerts_is_resolved_created_at")
                    .table(Alerts::Table)
                    .col(Alerts::IsResolved)
                    .col(Alerts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_alerts_experiment_id")
                    .table(Alerts::Table)
                    .col(Alerts::ExperimentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table) in [
            ("idx_alerts_experiment_id", Alerts::Table.into_iden()),
            ("idx_alerts_is_resolved_created_at", Alerts::Table.into_iden()),
            ("idx_measurements_timestamp", Measurements::Table.into_iden()),
            (
                "idx_measurements_experiment_sequence",
                Measurements::Table.into_iden(),
            ),
        ] {
            manager
                .drop_index(Index::drop().if_exists().name(name).table(table).to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    ExperimentId,
    SequenceNumber,
    Timestamp,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    ExperimentId,
    IsResolved,
    CreatedAt,
}
