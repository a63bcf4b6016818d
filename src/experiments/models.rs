use crate::measurements::services::{count_for_experiment, counts_for_experiments};
use chrono::{DateTime, Utc};
use crudcrate::{CRUDResource, EntityToModels};
use sea_orm::{
    Condition, DatabaseConnection, EntityTrait, Order, QueryOrder, QuerySelect,
    entity::prelude::*,
};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "experiment_status")]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "archived")]
    Archived,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "experiments")]
#[crudcrate(
    generate_router,
    api_struct = "Experiment",
    name_singular = "experiment",
    name_plural = "experiments",
    description = "Test runs of photovoltaic shutdown devices, each owning the measurement rows imported for it.",
    fn_get_one = get_one_experiment,
    fn_get_all = get_all_experiments
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(filterable, fulltext, list_model = false)]
    pub description: Option<String>,
    #[crudcrate(filterable)]
    pub operator_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub operator_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub device_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub device_type: Option<String>,
    #[crudcrate(sortable, filterable, enum_field, create_model = false, on_create = ExperimentStatus::Active)]
    pub status: ExperimentStatus,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
    #[sea_orm(ignore)]
    #[crudcrate(non_db_attr = true, default = None, create_model = false, update_model = false)]
    pub data_point_count: Option<u64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::measurements::models::Entity")]
    Measurements,
    #[sea_orm(has_many = "crate::alerts::models::Entity")]
    Alerts,
    #[sea_orm(
        belongs_to = "crate::users::models::Entity",
        from = "Column::OperatorId",
        to = "crate::users::models::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Operator,
}

impl Related<crate::measurements::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Measurements.def()
    }
}

impl Related<crate::alerts::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

impl Related<crate::users::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub(super) async fn get_one_experiment(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<Experiment, DbErr> {
    let model = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Experiment with id '{id}' not found")))?;

    let mut experiment: Experiment = model.into();
    experiment.data_point_count = Some(count_for_experiment(db, id).await?);

    Ok(experiment)
}

pub(super) async fn get_all_experiments(
    db: &DatabaseConnection,
    condition: &Condition,
    order_column: Column,
    order_direction: Order,
    offset: u64,
    limit: u64,
) -> Result<Vec<ExperimentList>, DbErr> {
    let models = Entity::find()
        .filter(condition.clone())
        .order_by(order_column, order_direction)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let counts = counts_for_experiments(db, &ids).await?;

    Ok(models
        .into_iter()
        .map(|model| {
            let count = counts.get(&model.id).copied().unwrap_or(0);
            let mut experiment: Experiment = model.into();
            experiment.data_point_count = Some(count);
            experiment.into()
        })
        .collect())
}
