use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: String,
    pub endpoint: String,
    pub content_type: Option<String>,
    pub tokens_used: i64,
    pub credits_used: i64,
    pub cost: f64,
    pub ai_model: String,
    pub response_time_ms: i64,
    pub status_code: i32,
    pub extra_data: Option<Json>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
