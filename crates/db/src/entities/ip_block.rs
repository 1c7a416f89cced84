//! IP block entity (addresses barred from calling a business's tables).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why an address was blocked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum IpBlockReason {
    #[sea_orm(string_value = "spam")]
    Spam,
    #[sea_orm(string_value = "abuse")]
    Abuse,
    #[sea_orm(string_value = "manual")]
    Manual,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ip_block")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub ip_address: String,

    pub business_id: String,

    pub blocked_by: String,

    pub reason: IpBlockReason,

    #[sea_orm(nullable, column_type = "Text")]
    pub notes: Option<String>,

    /// Call that prompted the block, if any
    #[sea_orm(nullable)]
    pub source_call_id: Option<String>,

    pub blocked_at: DateTimeWithTimeZone,

    /// When the block expires (NULL = permanent)
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub unblocked_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the block applies at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.unblocked_at.is_none() && self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::business::Entity",
        from = "Column::BusinessId",
        to = "super::business::Column::Id",
        on_delete = "Cascade"
    )]
    Business,
}

impl ActiveModelBehavior for ActiveModel {}
