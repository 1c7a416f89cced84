//! Table silence entity (suppression window for new calls).

use chrono::Duration;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifetime of an automatic silence.
pub const AUTOMATIC_SILENCE_MINUTES: i64 = 10;

/// Why a table was silenced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum SilenceReason {
    /// Set by staff; open-ended unless a duration was given
    #[sea_orm(string_value = "manual")]
    Manual,
    /// Set by the system after completion or spam; expires after ten minutes
    #[sea_orm(string_value = "automatic")]
    Automatic,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "table_silence")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub table_id: String,

    pub business_id: String,

    /// Staff member who silenced the table (NULL = system)
    #[sea_orm(nullable)]
    pub silenced_by: Option<String>,

    pub reason: SilenceReason,

    pub silenced_at: DateTimeWithTimeZone,

    /// Explicit end of a time-boxed manual silence
    #[sea_orm(nullable)]
    pub ends_at: Option<DateTimeWithTimeZone>,

    /// Set when lifted, either explicitly or by the expiry sweep
    #[sea_orm(nullable)]
    pub unsilenced_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub unsilenced_by: Option<String>,

    /// Calls that led to an automatic silence
    pub call_count: i32,

    #[sea_orm(nullable, column_type = "Text")]
    pub notes: Option<String>,
}

impl Model {
    /// When the silence lapses on its own. `None` means it never does.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTimeWithTimeZone> {
        match self.reason {
            SilenceReason::Automatic => {
                Some(self.silenced_at + Duration::minutes(AUTOMATIC_SILENCE_MINUTES))
            }
            SilenceReason::Manual => self.ends_at,
        }
    }

    /// Whether the silence suppresses calls at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTimeWithTimeZone) -> bool {
        if self.unsilenced_at.is_some() || self.silenced_at > now {
            return false;
        }
        self.expires_at().is_none_or(|expires_at| now < expires_at)
    }

    /// Seconds left before the silence lapses; `None` for open-ended silences.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTimeWithTimeZone) -> Option<i64> {
        self.expires_at()
            .map(|expires_at| (expires_at - now).num_seconds().max(0))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dining_table::Entity",
        from = "Column::TableId",
        to = "super::dining_table::Column::Id",
        on_delete = "Cascade"
    )]
    DiningTable,
}

impl Related<super::dining_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiningTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
