use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Accounting period between pool-found blocks. Exactly one `Open` round
/// exists per coin at any time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rounds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub coin: String,
    pub state: RoundState,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub block_hash: Option<String>,
    pub block_height: Option<i64>,
    pub reward: i64,
    pub total_weight: i64,
    pub matured_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
pub enum RoundState {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "pending_confirmation")]
    PendingConfirmation,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "orphaned")]
    Orphaned,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
