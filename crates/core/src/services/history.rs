//! Call history and service statistics.

use chrono::{DateTime, Duration, Utc};
use mozo_common::AppResult;
use mozo_db::{
    entities::waiter_call::{self, CallStatus},
    repositories::{CallHistoryQuery, DiningTableRepository, WaiterCallRepository},
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::profile::Staff;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;
/// Deeper pages are clamped here; the offset stays well inside `i64`.
const MAX_PAGE: u64 = 10_000;

/// Time window of a history or stats query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFilter {
    /// The last sixty minutes.
    Hour,
    /// Since midnight UTC.
    #[default]
    Today,
    /// Everything.
    Historic,
}

impl HistoryFilter {
    /// Lower bound on `called_at`, if any.
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Hour => Some(now - Duration::hours(1)),
            Self::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc()),
            Self::Historic => None,
        }
    }
}

/// Query string of the history endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub filter: HistoryFilter,
    /// One-based page number.
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub call: waiter_call::Model,
    pub table_number: Option<i32>,
    pub response_seconds: Option<i64>,
    pub total_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub has_more: bool,
}

/// Aggregates over a history window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallStats {
    pub filter: HistoryFilter,
    pub total: u64,
    pub pending: u64,
    pub acknowledged: u64,
    pub completed: u64,
    pub cancelled: u64,
    /// Completed calls as a percentage of all calls.
    pub completion_rate: f64,
    pub average_response_seconds: Option<f64>,
    pub efficiency_score: u8,
}

/// Score from 0 to 100: the completion rate, minus five points per call
/// still waiting (at most thirty).
#[must_use]
pub fn efficiency_score(completed: u64, total: u64, pending: u64) -> u8 {
    if total == 0 {
        return 100;
    }

    #[allow(clippy::cast_precision_loss)]
    let rate = completed as f64 / total as f64 * 100.0;
    #[allow(clippy::cast_precision_loss)]
    let penalty = (pending as f64 * 5.0).min(30.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = (rate - penalty).round().clamp(0.0, 100.0) as u8;
    score
}

#[derive(Clone)]
pub struct HistoryService {
    calls: WaiterCallRepository,
    tables: DiningTableRepository,
}

impl HistoryService {
    #[must_use]
    pub const fn new(calls: WaiterCallRepository, tables: DiningTableRepository) -> Self {
        Self { calls, tables }
    }

    /// Calls within the window, newest first.
    ///
    /// Waiters see the calls they handled, admins every call of the business.
    pub async fn history(&self, staff: &Staff, params: HistoryParams) -> AppResult<HistoryPage> {
        let page = params.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let mut query = scope(staff, params.filter)?;
        query.page = page - 1;
        query.limit = limit;

        let (calls, total) = self.calls.find_history(&query).await?;

        let mut table_ids: Vec<String> = calls.iter().map(|c| c.table_id.clone()).collect();
        table_ids.sort();
        table_ids.dedup();
        let numbers: HashMap<String, i32> = self
            .tables
            .find_by_ids(&table_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t.number))
            .collect();

        let items = calls
            .into_iter()
            .map(|call| HistoryItem {
                table_number: numbers.get(&call.table_id).copied(),
                response_seconds: call.response_seconds(),
                total_seconds: call.total_seconds(),
                call,
            })
            .collect();

        Ok(HistoryPage {
            items,
            page,
            limit,
            total,
            has_more: page.saturating_mul(limit) < total,
        })
    }

    /// Per-status totals and derived scores for the window.
    pub async fn stats(&self, staff: &Staff, filter: HistoryFilter) -> AppResult<CallStats> {
        let query = scope(staff, filter)?;

        let mut stats = CallStats {
            filter,
            ..CallStats::default()
        };
        for row in self.calls.count_by_status(&query).await? {
            let count = u64::try_from(row.count).unwrap_or(0);
            match row.status {
                CallStatus::Pending => stats.pending = count,
                CallStatus::Acknowledged => stats.acknowledged = count,
                CallStatus::Completed => stats.completed = count,
                CallStatus::Cancelled => stats.cancelled = count,
            }
            stats.total += count;
        }

        if stats.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let rate = stats.completed as f64 / stats.total as f64 * 100.0;
            stats.completion_rate = (rate * 10.0).round() / 10.0;
        }
        stats.average_response_seconds = self.calls.average_response_seconds(&query).await?;
        stats.efficiency_score = efficiency_score(stats.completed, stats.total, stats.pending);

        Ok(stats)
    }
}

fn scope(staff: &Staff, filter: HistoryFilter) -> AppResult<CallHistoryQuery> {
    staff.ensure_profile()?;

    let since: Option<DateTimeWithTimeZone> = filter.since(Utc::now()).map(|at| at.fixed_offset());

    Ok(CallHistoryQuery {
        business_id: staff.business_id().to_string(),
        waiter_id: (!staff.is_admin()).then(|| staff.id().to_string()),
        since,
        page: 0,
        limit: DEFAULT_LIMIT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::tests::{call, table};
    use crate::services::profile::tests::{admin, waiter};
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::sync::Arc;

    fn service(db: MockDatabase) -> HistoryService {
        let conn = Arc::new(db.into_connection());
        HistoryService::new(
            WaiterCallRepository::new(conn.clone()),
            DiningTableRepository::new(conn),
        )
    }

    #[test]
    fn test_efficiency_score() {
        assert_eq!(efficiency_score(0, 0, 0), 100);
        assert_eq!(efficiency_score(10, 10, 0), 100);
        assert_eq!(efficiency_score(8, 10, 1), 75);
        // penalty is capped at thirty points
        assert_eq!(efficiency_score(9, 10, 10), 60);
        assert_eq!(efficiency_score(1, 10, 6), 0);
    }

    #[test]
    fn test_filter_since() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 15, 30, 0).unwrap();

        assert_eq!(
            HistoryFilter::Hour.since(now),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap())
        );
        assert_eq!(
            HistoryFilter::Today.since(now),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(HistoryFilter::Historic.since(now), None);
    }

    #[test]
    fn test_filter_parses_lowercase() {
        let params: HistoryParams =
            serde_json::from_value(serde_json::json!({"filter": "historic", "page": 2})).unwrap();
        assert_eq!(params.filter, HistoryFilter::Historic);
        assert_eq!(params.page, Some(2));
    }

    #[tokio::test]
    async fn test_history_page() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[maplit::btreemap! {
                "num_items" => Value::BigInt(Some(45))
            }]])
            .append_query_results([[call(CallStatus::Completed, Some("w1"))]])
            .append_query_results([[table(None)]]);
        let service = service(db);

        let page = service
            .history(
                &waiter("w1"),
                HistoryParams {
                    filter: HistoryFilter::Historic,
                    page: Some(2),
                    limit: Some(20),
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 45);
        assert_eq!(page.page, 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].table_number, Some(5));
        assert_eq!(page.items[0].response_seconds, Some(0));
    }

    #[tokio::test]
    async fn test_history_limit_is_capped() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[maplit::btreemap! {
                "num_items" => Value::BigInt(Some(0))
            }]])
            .append_query_results([Vec::<waiter_call::Model>::new()])
            .append_query_results([Vec::<mozo_db::entities::dining_table::Model>::new()]);
        let service = service(db);

        let page = service
            .history(
                &admin("a1"),
                HistoryParams {
                    limit: Some(500),
                    ..HistoryParams::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.limit, MAX_LIMIT);
        assert_eq!(page.page, 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_history_page_is_clamped() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[maplit::btreemap! {
                "num_items" => Value::BigInt(Some(3))
            }]])
            .append_query_results([Vec::<waiter_call::Model>::new()]);
        let service = service(db);

        let page = service
            .history(
                &admin("a1"),
                HistoryParams {
                    filter: HistoryFilter::Historic,
                    page: Some(u64::MAX),
                    limit: Some(20),
                },
            )
            .await
            .unwrap();

        assert_eq!(page.page, MAX_PAGE);
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_stats() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[
                maplit::btreemap! {
                    "status" => Value::String(Some(Box::new("completed".to_string()))),
                    "count" => Value::BigInt(Some(8)),
                },
                maplit::btreemap! {
                    "status" => Value::String(Some(Box::new("pending".to_string()))),
                    "count" => Value::BigInt(Some(1)),
                },
                maplit::btreemap! {
                    "status" => Value::String(Some(Box::new("cancelled".to_string()))),
                    "count" => Value::BigInt(Some(1)),
                },
            ]])
            .append_query_results([[maplit::btreemap! {
                "avg_seconds" => Value::Double(Some(42.5))
            }]]);
        let service = service(db);

        let stats = service
            .stats(&admin("a1"), HistoryFilter::Today)
            .await
            .unwrap();

        assert_eq!(stats.total, 10);
        assert_eq!(stats.completed, 8);
        assert!((stats.completion_rate - 80.0).abs() < f64::EPSILON);
        assert_eq!(stats.average_response_seconds, Some(42.5));
        assert_eq!(stats.efficiency_score, 75);
    }

    #[test]
    fn test_waiters_are_scoped_to_their_calls() {
        let query = scope(&waiter("w1"), HistoryFilter::Hour).unwrap();
        assert_eq!(query.waiter_id.as_deref(), Some("w1"));
        assert!(query.since.is_some());

        let query = scope(&admin("a1"), HistoryFilter::Historic).unwrap();
        assert_eq!(query.waiter_id, None);
        assert_eq!(query.since, None);
    }
}
