//! Dining table repository.

use std::sync::Arc;

use crate::entities::{DiningTable, dining_table};
use chrono::Utc;
use mozo_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr,
};

/// Dining table repository for database operations.
#[derive(Clone)]
pub struct DiningTableRepository {
    db: Arc<DatabaseConnection>,
}

impl DiningTableRepository {
    /// Create a new dining table repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a table by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<dining_table::Model>> {
        DiningTable::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a table by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<dining_table::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::TableNotFound(id.to_string()))
    }

    /// Find tables by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<dining_table::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        DiningTable::find()
            .filter(dining_table::Column::Id.is_in(ids.iter().cloned()))
            .order_by_asc(dining_table::Column::Number)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All tables of a business, by number.
    pub async fn find_by_business(&self, business_id: &str) -> AppResult<Vec<dining_table::Model>> {
        DiningTable::find()
            .filter(dining_table::Column::BusinessId.eq(business_id))
            .order_by_asc(dining_table::Column::Number)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Assign a waiter to a table unless another waiter already holds it.
    ///
    /// Returns the number of rows updated (0 when held by someone else).
    pub async fn assign_waiter(&self, table_id: &str, waiter_id: &str) -> AppResult<u64> {
        let now = Utc::now().fixed_offset();

        let result = DiningTable::update_many()
            .col_expr(dining_table::Column::ActiveWaiterId, Expr::value(waiter_id))
            .col_expr(dining_table::Column::WaiterAssignedAt, Expr::value(now))
            .col_expr(dining_table::Column::UpdatedAt, Expr::value(now))
            .filter(dining_table::Column::Id.eq(table_id))
            .filter(
                Condition::any()
                    .add(dining_table::Column::ActiveWaiterId.is_null())
                    .add(dining_table::Column::ActiveWaiterId.eq(waiter_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Clear the waiter assignment. With `expected_waiter`, only if that waiter holds it.
    pub async fn release_waiter(
        &self,
        table_id: &str,
        expected_waiter: Option<&str>,
    ) -> AppResult<u64> {
        let mut update = DiningTable::update_many()
            .col_expr(
                dining_table::Column::ActiveWaiterId,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                dining_table::Column::WaiterAssignedAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .col_expr(
                dining_table::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(dining_table::Column::Id.eq(table_id));

        if let Some(waiter_id) = expected_waiter {
            update = update.filter(dining_table::Column::ActiveWaiterId.eq(waiter_id));
        }

        let result = update
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Toggle whether the table accepts calls.
    pub async fn set_notifications_enabled(&self, table_id: &str, enabled: bool) -> AppResult<u64> {
        let result = DiningTable::update_many()
            .col_expr(dining_table::Column::NotificationsEnabled, Expr::value(enabled))
            .col_expr(
                dining_table::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(dining_table::Column::Id.eq(table_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_table(id: &str, number: i32) -> dining_table::Model {
        dining_table::Model {
            id: id.to_string(),
            business_id: "b1".to_string(),
            number,
            name: None,
            code: format!("qr-{id}"),
            notifications_enabled: true,
            active_waiter_id: None,
            waiter_assigned_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<dining_table::Model>::new()])
                .into_connection(),
        );

        let repo = DiningTableRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_by_business() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_table("t1", 1), create_test_table("t2", 2)]])
                .into_connection(),
        );

        let repo = DiningTableRepository::new(db);
        let tables = repo.find_by_business("b1").await.unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].label(), "Table 2");
    }

    #[tokio::test]
    async fn test_assign_waiter_held_by_other() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = DiningTableRepository::new(db);
        let updated = repo.assign_waiter("t1", "w2").await.unwrap();

        assert_eq!(updated, 0);
    }
}
