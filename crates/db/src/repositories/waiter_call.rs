//! Waiter call repository.
//!
//! Status changes are single conditional `UPDATE`s so that concurrent
//! requests cannot both move the same call: the caller inspects
//! `rows_affected` to learn whether its write won.

use std::sync::Arc;

use crate::entities::{
    WaiterCall,
    waiter_call::{self, CallStatus},
};
use mozo_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};

use super::unique_violation_or;

/// Filters for a history page.
#[derive(Debug, Clone, Default)]
pub struct CallHistoryQuery {
    pub business_id: String,
    /// Restrict to calls claimed by this waiter
    pub waiter_id: Option<String>,
    /// Only calls made at or after this instant
    pub since: Option<DateTimeWithTimeZone>,
    /// Zero-based page index
    pub page: u64,
    pub limit: u64,
}

/// Number of calls in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromQueryResult)]
pub struct StatusCount {
    pub status: CallStatus,
    pub count: i64,
}

/// Waiter call repository for database operations.
#[derive(Clone)]
pub struct WaiterCallRepository {
    db: Arc<DatabaseConnection>,
}

impl WaiterCallRepository {
    /// Create a new waiter call repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a call by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<waiter_call::Model>> {
        WaiterCall::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a call by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<waiter_call::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))
    }

    /// Insert a new call.
    ///
    /// A second unresolved call for the same table violates the partial
    /// unique index and is reported as [`AppError::AlreadyCalled`].
    pub async fn create(&self, model: waiter_call::ActiveModel) -> AppResult<waiter_call::Model> {
        model.insert(self.db.as_ref()).await.map_err(|e| {
            unique_violation_or(e, || {
                AppError::AlreadyCalled("table already has an open call".to_string())
            })
        })
    }

    /// The pending or acknowledged call of a table, if any.
    pub async fn find_unresolved_for_table(
        &self,
        table_id: &str,
    ) -> AppResult<Option<waiter_call::Model>> {
        WaiterCall::find()
            .filter(waiter_call::Column::TableId.eq(table_id))
            .filter(waiter_call::Column::Status.is_in(CallStatus::UNRESOLVED))
            .order_by_desc(waiter_call::Column::CalledAt)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Unresolved calls of a business, oldest first.
    pub async fn find_unresolved_for_business(
        &self,
        business_id: &str,
    ) -> AppResult<Vec<waiter_call::Model>> {
        WaiterCall::find()
            .filter(waiter_call::Column::BusinessId.eq(business_id))
            .filter(waiter_call::Column::Status.is_in(CallStatus::UNRESOLVED))
            .order_by_asc(waiter_call::Column::CalledAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Number of calls a table made since `since`.
    pub async fn count_recent_for_table(
        &self,
        table_id: &str,
        since: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        WaiterCall::find()
            .filter(waiter_call::Column::TableId.eq(table_id))
            .filter(waiter_call::Column::CalledAt.gte(since))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Claim a pending call for `waiter_id`. Returns rows updated (0 or 1).
    pub async fn claim(
        &self,
        call_id: &str,
        waiter_id: &str,
        at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = WaiterCall::update_many()
            .col_expr(
                waiter_call::Column::Status,
                Expr::value(CallStatus::Acknowledged.as_str()),
            )
            .col_expr(waiter_call::Column::WaiterId, Expr::value(waiter_id))
            .col_expr(waiter_call::Column::AcknowledgedAt, Expr::value(at))
            .filter(waiter_call::Column::Id.eq(call_id))
            .filter(waiter_call::Column::Status.eq(CallStatus::Pending))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Complete an acknowledged call held by `waiter_id`. Returns rows updated.
    pub async fn complete(
        &self,
        call_id: &str,
        waiter_id: &str,
        at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = WaiterCall::update_many()
            .col_expr(
                waiter_call::Column::Status,
                Expr::value(CallStatus::Completed.as_str()),
            )
            .col_expr(waiter_call::Column::CompletedAt, Expr::value(at))
            .filter(waiter_call::Column::Id.eq(call_id))
            .filter(waiter_call::Column::Status.eq(CallStatus::Acknowledged))
            .filter(waiter_call::Column::WaiterId.eq(waiter_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Cancel a call that is still unresolved. Returns rows updated.
    pub async fn cancel(&self, call_id: &str, at: DateTimeWithTimeZone) -> AppResult<u64> {
        let result = WaiterCall::update_many()
            .col_expr(
                waiter_call::Column::Status,
                Expr::value(CallStatus::Cancelled.as_str()),
            )
            .col_expr(waiter_call::Column::CancelledAt, Expr::value(at))
            .filter(waiter_call::Column::Id.eq(call_id))
            .filter(waiter_call::Column::Status.is_in(CallStatus::UNRESOLVED))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Like [`Self::cancel`], but only while the call is still in `expected`.
    ///
    /// The sweep uses this so a call claimed after it was selected is left alone.
    pub async fn cancel_if_status(
        &self,
        call_id: &str,
        expected: CallStatus,
        at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = WaiterCall::update_many()
            .col_expr(
                waiter_call::Column::Status,
                Expr::value(CallStatus::Cancelled.as_str()),
            )
            .col_expr(waiter_call::Column::CancelledAt, Expr::value(at))
            .filter(waiter_call::Column::Id.eq(call_id))
            .filter(waiter_call::Column::Status.eq(expected))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Unresolved calls left hanging, oldest first: pending calls made before
    /// `pending_before` and acknowledged calls claimed before `acknowledged_before`.
    pub async fn find_stale(
        &self,
        pending_before: DateTimeWithTimeZone,
        acknowledged_before: DateTimeWithTimeZone,
        limit: u64,
    ) -> AppResult<Vec<waiter_call::Model>> {
        WaiterCall::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(waiter_call::Column::Status.eq(CallStatus::Pending))
                            .add(waiter_call::Column::CalledAt.lt(pending_before)),
                    )
                    .add(
                        Condition::all()
                            .add(waiter_call::Column::Status.eq(CallStatus::Acknowledged))
                            .add(waiter_call::Column::AcknowledgedAt.lt(acknowledged_before)),
                    ),
            )
            .order_by_asc(waiter_call::Column::CalledAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// One page of history, newest first, and the total number of matches.
    pub async fn find_history(
        &self,
        query: &CallHistoryQuery,
    ) -> AppResult<(Vec<waiter_call::Model>, u64)> {
        let mut select = WaiterCall::find()
            .filter(waiter_call::Column::BusinessId.eq(query.business_id.as_str()));

        if let Some(waiter_id) = &query.waiter_id {
            select = select.filter(waiter_call::Column::WaiterId.eq(waiter_id.as_str()));
        }
        if let Some(since) = query.since {
            select = select.filter(waiter_call::Column::CalledAt.gte(since));
        }

        let total = select
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let items = select
            .order_by_desc(waiter_call::Column::CalledAt)
            .offset(query.page.saturating_mul(query.limit))
            .limit(query.limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((items, total))
    }

    /// Calls per status within the scope of `query` (pagination ignored).
    pub async fn count_by_status(&self, query: &CallHistoryQuery) -> AppResult<Vec<StatusCount>> {
        let mut select = WaiterCall::find()
            .select_only()
            .column(waiter_call::Column::Status)
            .column_as(waiter_call::Column::Id.count(), "count")
            .filter(waiter_call::Column::BusinessId.eq(query.business_id.as_str()));

        if let Some(waiter_id) = &query.waiter_id {
            select = select.filter(waiter_call::Column::WaiterId.eq(waiter_id.as_str()));
        }
        if let Some(since) = query.since {
            select = select.filter(waiter_call::Column::CalledAt.gte(since));
        }

        select
            .group_by(waiter_call::Column::Status)
            .into_model::<StatusCount>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Average seconds between call and acknowledgement within the scope of `query`.
    pub async fn average_response_seconds(
        &self,
        query: &CallHistoryQuery,
    ) -> AppResult<Option<f64>> {
        let mut select = WaiterCall::find()
            .select_only()
            .column_as(
                Expr::cust("AVG(EXTRACT(EPOCH FROM (acknowledged_at - called_at)))::float8"),
                "avg_seconds",
            )
            .filter(waiter_call::Column::BusinessId.eq(query.business_id.as_str()))
            .filter(waiter_call::Column::AcknowledgedAt.is_not_null());

        if let Some(waiter_id) = &query.waiter_id {
            select = select.filter(waiter_call::Column::WaiterId.eq(waiter_id.as_str()));
        }
        if let Some(since) = query.since {
            select = select.filter(waiter_call::Column::CalledAt.gte(since));
        }

        #[derive(FromQueryResult)]
        struct AverageRow {
            avg_seconds: Option<f64>,
        }

        let row = select
            .into_model::<AverageRow>()
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.and_then(|r| r.avg_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::waiter_call::CallUrgency;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_call(id: &str, status: CallStatus) -> waiter_call::Model {
        waiter_call::Model {
            id: id.to_string(),
            table_id: "t5".to_string(),
            business_id: "b1".to_string(),
            waiter_id: None,
            status,
            urgency: CallUrgency::Normal,
            message: "Call from table 5".to_string(),
            metadata: serde_json::json!({}),
            called_at: Utc::now().into(),
            acknowledged_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn test_claim_is_conditional_on_pending() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db.clone());
        let now = Utc::now().fixed_offset();

        assert_eq!(repo.claim("c1", "waiter-a", now).await.unwrap(), 1);
        assert_eq!(repo.claim("c1", "waiter-b", now).await.unwrap(), 0);

        drop(repo);
        let Ok(conn) = Arc::try_unwrap(db) else {
            panic!("connection still shared");
        };
        let log = conn.into_transaction_log();
        assert_eq!(log.len(), 2);
        let first = format!("{:?}", log[0]);
        assert!(first.contains("UPDATE"));
        assert!(first.contains("\"acknowledged\""));
        assert!(first.contains("\"pending\""));
    }

    #[tokio::test]
    async fn test_find_unresolved_for_table() {
        let call = create_test_call("c1", CallStatus::Acknowledged);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[call]])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let found = repo.find_unresolved_for_table("t5").await.unwrap();

        assert_eq!(found.map(|c| c.status), Some(CallStatus::Acknowledged));
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<waiter_call::Model>::new()])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::CallNotFound(_))));
    }

    #[tokio::test]
    async fn test_count_recent_for_table() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(3))
                }]])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let count = repo
            .count_recent_for_table("t5", Utc::now().fixed_offset())
            .await
            .unwrap();

        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_find_history_returns_page_and_total() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(41))
                }]])
                .append_query_results([[
                    create_test_call("c2", CallStatus::Completed),
                    create_test_call("c1", CallStatus::Cancelled),
                ]])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let query = CallHistoryQuery {
            business_id: "b1".to_string(),
            page: 2,
            limit: 20,
            ..Default::default()
        };
        let (items, total) = repo.find_history(&query).await.unwrap();

        assert_eq!(total, 41);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_find_history_far_page_saturates_offset() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .append_query_results([Vec::<waiter_call::Model>::new()])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let query = CallHistoryQuery {
            business_id: "b1".to_string(),
            page: u64::MAX,
            limit: 100,
            ..Default::default()
        };
        let (items, total) = repo.find_history(&query).await.unwrap();

        assert_eq!(total, 1);
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    maplit::btreemap! {
                        "status" => sea_orm::Value::String(Some(Box::new("completed".to_string()))),
                        "count" => sea_orm::Value::BigInt(Some(7)),
                    },
                    maplit::btreemap! {
                        "status" => sea_orm::Value::String(Some(Box::new("pending".to_string()))),
                        "count" => sea_orm::Value::BigInt(Some(2)),
                    },
                ]])
                .into_connection(),
        );

        let repo = WaiterCallRepository::new(db);
        let counts = repo
            .count_by_status(&CallHistoryQuery {
                business_id: "b1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            counts,
            vec![
                StatusCount {
                    status: CallStatus::Completed,
                    count: 7
                },
                StatusCount {
                    status: CallStatus::Pending,
                    count: 2
                },
            ]
        );
    }
}
