//! Table silence repository.

use std::sync::Arc;

use crate::entities::{
    TableSilence,
    table_silence::{self, AUTOMATIC_SILENCE_MINUTES, SilenceReason},
};
use chrono::Duration;
use mozo_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, prelude::DateTimeWithTimeZone, sea_query::Expr,
};

use super::unique_violation_or;

/// Table silence repository for database operations.
#[derive(Clone)]
pub struct TableSilenceRepository {
    db: Arc<DatabaseConnection>,
}

impl TableSilenceRepository {
    /// Create a new table silence repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The open (not yet lifted) silence row of a table.
    ///
    /// The row may already have lapsed; callers decide with
    /// [`table_silence::Model::is_active_at`].
    pub async fn find_open_for_table(
        &self,
        table_id: &str,
    ) -> AppResult<Option<table_silence::Model>> {
        TableSilence::find()
            .filter(table_silence::Column::TableId.eq(table_id))
            .filter(table_silence::Column::UnsilencedAt.is_null())
            .order_by_desc(table_silence::Column::SilencedAt)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Open silence rows of a business.
    pub async fn find_open_for_business(
        &self,
        business_id: &str,
    ) -> AppResult<Vec<table_silence::Model>> {
        TableSilence::find()
            .filter(table_silence::Column::BusinessId.eq(business_id))
            .filter(table_silence::Column::UnsilencedAt.is_null())
            .order_by_desc(table_silence::Column::SilencedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a silence.
    ///
    /// A second open silence for the same table violates the partial unique
    /// index and is reported as [`AppError::TableAlreadySilenced`].
    pub async fn create(
        &self,
        model: table_silence::ActiveModel,
    ) -> AppResult<table_silence::Model> {
        model.insert(self.db.as_ref()).await.map_err(|e| {
            unique_violation_or(e, || AppError::TableAlreadySilenced("an open silence exists".to_string()))
        })
    }

    /// Lift an open silence. Returns rows updated (0 if it was already lifted).
    pub async fn close(
        &self,
        id: &str,
        by: Option<&str>,
        at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = TableSilence::update_many()
            .col_expr(table_silence::Column::UnsilencedAt, Expr::value(at))
            .col_expr(
                table_silence::Column::UnsilencedBy,
                Expr::value(by.map(ToString::to_string)),
            )
            .filter(table_silence::Column::Id.eq(id))
            .filter(table_silence::Column::UnsilencedAt.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Close open silences that lapsed by `now`, optionally for one table only.
    pub async fn close_lapsed(
        &self,
        now: DateTimeWithTimeZone,
        table_id: Option<&str>,
    ) -> AppResult<u64> {
        let automatic_cutoff = now - Duration::minutes(AUTOMATIC_SILENCE_MINUTES);

        let mut update = TableSilence::update_many()
            .col_expr(table_silence::Column::UnsilencedAt, Expr::value(now))
            .filter(table_silence::Column::UnsilencedAt.is_null())
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(table_silence::Column::Reason.eq(SilenceReason::Automatic))
                            .add(table_silence::Column::SilencedAt.lte(automatic_cutoff)),
                    )
                    .add(
                        Condition::all()
                            .add(table_silence::Column::Reason.eq(SilenceReason::Manual))
                            .add(table_silence::Column::EndsAt.is_not_null())
                            .add(table_silence::Column::EndsAt.lte(now)),
                    ),
            );

        if let Some(table_id) = table_id {
            update = update.filter(table_silence::Column::TableId.eq(table_id));
        }

        let result = update
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
