use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[allow(clippy::too_many_lines)] // One table definition per entity
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        if backend == sea_orm::DatabaseBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";")
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(UserRole::Table)
                        .values([UserRole::Admin, UserRole::Researcher, UserRole::Viewer])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(ExperimentStatus::Table)
                        .values([
                            ExperimentStatus::Active,
                            ExperimentStatus::Completed,
                            ExperimentStatus::Archived,
                        ])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(AlertSeverity::Table)
                        .values([
                            AlertSeverity::Low,
                            AlertSeverity::Medium,
                            AlertSeverity::High,
                            AlertSeverity::Critical,
                        ])
                        .to_owned(),
                )
                .await?;
        }

        // Users
        let mut users_table = Table::create()
            .table(Users::Table)
            .if_not_exists()
            .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
            .col(ColumnDef::new(Users::Email).text())
            .col(ColumnDef::new(Users::Name).text())
            .col(
                ColumnDef::new(Users::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Users::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_owned();

        match backend {
            sea_orm::DatabaseBackend::Postgres => {
                users_table.col(
                    ColumnDef::new(Users::Role)
                        .custom(UserRole::Table)
                        .not_null()
                        .default("viewer"),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                users_table.col(ColumnDef::new(Users::Role).text().not_null().default("viewer"));
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(users_table).await?;

        // Experiments
        let mut experiments_table = Table::create()
            .table(Experiments::Table)
            .if_not_exists()
            .col(ColumnDef::new(Experiments::Name).text().not_null())
            .col(ColumnDef::new(Experiments::Description).text())
            .col(ColumnDef::new(Experiments::OperatorId).uuid())
            .col(ColumnDef::new(Experiments::OperatorName).text())
            .col(ColumnDef::new(Experiments::DeviceAddress).text())
            .col(ColumnDef::new(Experiments::DeviceType).text())
            .col(
                ColumnDef::new(Experiments::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Experiments::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_experiments_operator_id")
                    .from(Experiments::Table, Experiments::OperatorId)
                    .to(Users::Table, Users::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();

        match backend {
            sea_orm::DatabaseBackend::Postgres => {
                experiments_table
                    .col(
                        ColumnDef::new(Experiments::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("uuid_generate_v4()")),
                    )
                    .col(
                        ColumnDef::new(Experiments::Status)
                            .custom(ExperimentStatus::Table)
                            .not_null()
                            .default("active"),
                    );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                experiments_table
                    .col(ColumnDef::new(Experiments::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Experiments::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    );
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(experiments_table).await?;

        // Measurements
        manager
            .create_table(
                Table::create()
                    .table(Measurements::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Measurements::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Measurements::ExperimentId).uuid().not_null())
                    .col(ColumnDef::new(Measurements::SequenceNumber).integer().not_null())
                    .col(
                        ColumnDef::new(Measurements::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Measurements::Voltage).double().not_null())
                    .col(ColumnDef::new(Measurements::Current).double().not_null())
                    .col(ColumnDef::new(Measurements::Power).double().not_null())
                    .col(ColumnDef::new(Measurements::Resistance).double())
                    .col(ColumnDef::new(Measurements::Temperature).double())
                    .col(
                        ColumnDef::new(Measurements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_measurements_experiment_id")
                            .from(Measurements::Table, Measurements::ExperimentId)
                            .to(Experiments::Table, Experiments::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        // Alerts
        let mut alerts_table = Table::create()
            .table(Alerts::Table)
            .if_not_exists()
            .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
            .col(ColumnDef::new(Alerts::ExperimentId).uuid())
            .col(ColumnDef::new(Alerts::AlertType).text().not_null())
            .col(ColumnDef::new(Alerts::Message).text().not_null())
            .col(ColumnDef::new(Alerts::ThresholdValue).double())
            .col(ColumnDef::new(Alerts::ActualValue).double())
            .col(
                ColumnDef::new(Alerts::IsResolved)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(ColumnDef::new(Alerts::ResolvedAt).timestamp_with_time_zone())
            .col(
                ColumnDef::new(Alerts::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_alerts_experiment_id")
                    .from(Alerts::Table, Alerts::ExperimentId)
                    .to(Experiments::Table, Experiments::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();

        match backend {
            sea_orm::DatabaseBackend::Postgres => {
                alerts_table.col(
                    ColumnDef::new(Alerts::Severity)
                        .custom(AlertSeverity::Table)
                        .not_null(),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                alerts_table.col(ColumnDef::new(Alerts::Severity).text().not_null());
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(alerts_table).await?;

        // Overview metrics, one snapshot per day
        manager
            .create_table(
                Table::create()
                    .table(OverviewMetrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OverviewMetrics::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OverviewMetrics::MetricDate)
                            .date()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OverviewMetrics::TotalExperiments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OverviewMetrics::TotalDataPoints)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OverviewMetrics::MinVoltage).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::AvgVoltage).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::MaxVoltage).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::MinCurrent).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::AvgCurrent).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::MaxCurrent).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::MinPower).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::AvgPower).double().not_null().default(0.0))
                    .col(ColumnDef::new(OverviewMetrics::MaxPower).double().not_null().default(0.0))
                    .col(
                        ColumnDef::new(OverviewMetrics::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(OverviewMetrics::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Measurements::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Experiments::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).if_exists().to_owned())
            .await?;

        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .drop_type(Type::drop().name(AlertSeverity::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_type(
                    Type::drop()
                        .name(ExperimentStatus::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_type(Type::drop().name(UserRole::Table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    Role,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Experiments {
    Table,
    Id,
    Name,
    Description,
    OperatorId,
    OperatorName,
    DeviceAddress,
    DeviceType,
    Status,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    Id,
    ExperimentId,
    SequenceNumber,
    Timestamp,
    Voltage,
    Current,
    Power,
    Resistance,
    Temperature,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    ExperimentId,
    AlertType,
    Severity,
    Message,
    ThresholdValue,
    ActualValue,
    IsResolved,
    ResolvedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OverviewMetrics {
    Table,
    Id,
    MetricDate,
    TotalExperiments,
    TotalDataPoints,
    MinVoltage,
    AvgVoltage,
    MaxVoltage,
    MinCurrent,
    AvgCurrent,
    MaxCurrent,
    MinPower,
    AvgPower,
    MaxPower,
    LastUpdated,
}

#[derive(DeriveIden)]
enum UserRole {
    #[sea_orm(iden = "user_role")]
    Table,
    Admin,
    Researcher,
    Viewer,
}

#[derive(DeriveIden)]
enum ExperimentStatus {
    #[sea_orm(iden = "experiment_status")]
    Table,
    Active,
    Completed,
    Archived,
}

#[derive(DeriveIden)]
enum AlertSeverity {
    #[sea_orm(iden = "alert_severity")]
    Table,
    Low,
    Medium,
    High,
    Critical,
}
