//! Waiter call entity (one customer request for attention).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a call.
///
/// Calls only move forward:
/// `pending -> acknowledged -> completed`, or `pending | acknowledged -> cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "acknowledged")]
    Acknowledged,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl CallStatus {
    /// Statuses that count against the one-open-call-per-table rule.
    pub const UNRESOLVED: [Self; 2] = [Self::Pending, Self::Acknowledged];

    /// Whether the call still needs a waiter.
    #[must_use]
    pub const fn is_unresolved(self) -> bool {
        matches!(self, Self::Pending | Self::Acknowledged)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_unresolved()
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Acknowledged)
                | (Self::Acknowledged, Self::Completed)
                | (Self::Pending | Self::Acknowledged, Self::Cancelled)
        )
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How urgent the customer marked the call.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum CallUrgency {
    #[sea_orm(string_value = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "high")]
    High,
}

/// Request context stored in the call's metadata column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Where the call came from, e.g. `qr`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "waiter_call")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub table_id: String,

    /// Denormalized from the table for tenant-scoped queries
    pub business_id: String,

    /// Waiter who claimed the call (set on acknowledgement)
    #[sea_orm(nullable)]
    pub waiter_id: Option<String>,

    pub status: CallStatus,

    pub urgency: CallUrgency,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    pub called_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub acknowledged_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Seconds between the call and its acknowledgement.
    #[must_use]
    pub fn response_seconds(&self) -> Option<i64> {
        self.acknowledged_at
            .map(|at| (at - self.called_at).num_seconds())
    }

    /// Seconds between the call and its completion.
    #[must_use]
    pub fn total_seconds(&self) -> Option<i64> {
        self.completed_at.map(|at| (at - self.called_at).num_seconds())
    }

    /// Decoded metadata; malformed JSON yields an empty bag.
    #[must_use]
    pub fn metadata(&self) -> CallMetadata {
        serde_json::from_value(self.metadata.clone()).unwrap_or_default()
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

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::WaiterId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Waiter,
}

impl Related<super::dining_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiningTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Acknowledged));
        assert!(CallStatus::Acknowledged.can_transition_to(CallStatus::Completed));
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Cancelled));
        assert!(CallStatus::Acknowledged.can_transition_to(CallStatus::Cancelled));
    }

    #[test]
    fn test_backward_and_skip_transitions_rejected() {
        use sea_orm::Iterable;

        // pending -> completed skips the claim
        assert!(!CallStatus::Pending.can_transition_to(CallStatus::Completed));
        assert!(!CallStatus::Acknowledged.can_transition_to(CallStatus::Pending));
        for next in CallStatus::iter() {
            assert!(!CallStatus::Completed.can_transition_to(next));
            assert!(!CallStatus::Cancelled.can_transition_to(next));
            assert!(!next.can_transition_to(next));
        }
    }

    #[test]
    fn test_unresolved_statuses() {
        assert!(CallStatus::Pending.is_unresolved());
        assert!(CallStatus::Acknowledged.is_unresolved());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_timing_helpers() {
        let called_at = Utc::now().fixed_offset();
        let call = Model {
            id: "c1".to_string(),
            table_id: "t1".to_string(),
            business_id: "b1".to_string(),
            waiter_id: Some("w1".to_string()),
            status: CallStatus::Completed,
            urgency: CallUrgency::Normal,
            message: "Call from table 5".to_string(),
            metadata: serde_json::json!({"client_ip": "10.0.0.1", "source": "qr"}),
            called_at,
            acknowledged_at: Some(called_at + Duration::seconds(45)),
            completed_at: Some(called_at + Duration::seconds(300)),
            cancelled_at: None,
        };

        assert_eq!(call.response_seconds(), Some(45));
        assert_eq!(call.total_seconds(), Some(300));
        let meta = call.metadata();
        assert_eq!(meta.client_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(meta.source.as_deref(), Some("qr"));
        assert!(meta.user_agent.is_none());
    }
}
