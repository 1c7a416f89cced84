//! Dining table entity (a physical table with a QR code).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dining_table")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub business_id: String,

    /// Table number shown to staff, unique per business
    pub number: i32,

    #[sea_orm(nullable)]
    pub name: Option<String>,

    /// Code embedded in the printed QR
    #[sea_orm(unique)]
    pub code: String,

    #[sea_orm(default_value = true)]
    pub notifications_enabled: bool,

    /// Waiter currently serving this table
    #[sea_orm(nullable)]
    pub active_waiter_id: Option<String>,

    #[sea_orm(nullable)]
    pub waiter_assigned_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Human label used in notification texts.
    #[must_use]
    pub fn label(&self) -> String {
        format!("Table {}", self.number)
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

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ActiveWaiterId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    ActiveWaiter,

    #[sea_orm(has_many = "super::waiter_call::Entity")]
    WaiterCall,
}

impl Related<super::business::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Business.def()
    }
}

impl Related<super::waiter_call::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WaiterCall.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
