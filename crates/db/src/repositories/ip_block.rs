//! IP block repository.

use std::sync::Arc;

use crate::entities::{IpBlock, ip_block};
use mozo_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, prelude::DateTimeWithTimeZone, sea_query::Expr,
};

/// IP block repository for database operations.
#[derive(Clone)]
pub struct IpBlockRepository {
    db: Arc<DatabaseConnection>,
}

impl IpBlockRepository {
    /// Create a new IP block repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn active_condition(now: DateTimeWithTimeZone) -> Condition {
        Condition::all()
            .add(ip_block::Column::UnblockedAt.is_null())
            .add(
                Condition::any()
                    .add(ip_block::Column::ExpiresAt.is_null())
                    .add(ip_block::Column::ExpiresAt.gt(now)),
            )
    }

    /// Find a block by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<ip_block::Model>> {
        IpBlock::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The active block for an address within a business, if any.
    pub async fn find_active(
        &self,
        business_id: &str,
        ip_address: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Option<ip_block::Model>> {
        IpBlock::find()
            .filter(ip_block::Column::BusinessId.eq(business_id))
            .filter(ip_block::Column::IpAddress.eq(ip_address))
            .filter(Self::active_condition(now))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Active blocks of a business, newest first.
    pub async fn find_active_by_business(
        &self,
        business_id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Vec<ip_block::Model>> {
        IpBlock::find()
            .filter(ip_block::Column::BusinessId.eq(business_id))
            .filter(Self::active_condition(now))
            .order_by_desc(ip_block::Column::BlockedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a block.
    pub async fn create(&self, model: ip_block::ActiveModel) -> AppResult<ip_block::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Lift a block. Returns rows updated.
    pub async fn unblock(&self, id: &str, at: DateTimeWithTimeZone) -> AppResult<u64> {
        let result = IpBlock::update_many()
            .col_expr(ip_block::Column::UnblockedAt, Expr::value(at))
            .filter(ip_block::Column::Id.eq(id))
            .filter(ip_block::Column::UnblockedAt.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
