//! Device token repository.

use std::sync::Arc;

use crate::entities::{DeviceToken, device_token};
use mozo_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    prelude::DateTimeWithTimeZone, sea_query::Expr,
};

use super::unique_violation_or;

/// Device token repository for database operations.
#[derive(Clone)]
pub struct DeviceTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl DeviceTokenRepository {
    /// Create a new device token repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a token registered by a user.
    pub async fn find_by_user_and_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> AppResult<Option<device_token::Model>> {
        DeviceToken::find()
            .filter(device_token::Column::UserId.eq(user_id))
            .filter(device_token::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All tokens of a user, most recently used first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<device_token::Model>> {
        DeviceToken::find()
            .filter(device_token::Column::UserId.eq(user_id))
            .order_by_desc(device_token::Column::LastUsedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All tokens of several users.
    pub async fn find_by_users(&self, user_ids: &[String]) -> AppResult<Vec<device_token::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        DeviceToken::find()
            .filter(device_token::Column::UserId.is_in(user_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new token.
    pub async fn create(&self, model: device_token::ActiveModel) -> AppResult<device_token::Model> {
        model.insert(self.db.as_ref()).await.map_err(|e| {
            unique_violation_or(e, || AppError::Conflict("token already registered".to_string()))
        })
    }

    /// Refresh platform, name and last use of an existing token.
    pub async fn refresh(
        &self,
        existing: device_token::Model,
        platform: device_token::DevicePlatform,
        device_name: Option<String>,
        at: DateTimeWithTimeZone,
    ) -> AppResult<device_token::Model> {
        let mut active: device_token::ActiveModel = existing.into();
        active.platform = Set(platform);
        active.device_name = Set(device_name);
        active.last_used_at = Set(at);

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark tokens as used at `at`.
    pub async fn touch(&self, ids: &[String], at: DateTimeWithTimeZone) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = DeviceToken::update_many()
            .col_expr(device_token::Column::LastUsedAt, Expr::value(at))
            .filter(device_token::Column::Id.is_in(ids.iter().cloned()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Delete a token of a user.
    pub async fn delete_for_user(&self, user_id: &str, token: &str) -> AppResult<u64> {
        let result = DeviceToken::delete_many()
            .filter(device_token::Column::UserId.eq(user_id))
            .filter(device_token::Column::Token.eq(token))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Delete tokens by ID (used when the push service rejects them).
    pub async fn delete_by_ids(&self, ids: &[String]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = DeviceToken::delete_many()
            .filter(device_token::Column::Id.is_in(ids.iter().cloned()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Delete tokens not used since `before`.
    pub async fn delete_idle(&self, before: DateTimeWithTimeZone) -> AppResult<u64> {
        let result = DeviceToken::delete_many()
            .filter(device_token::Column::LastUsedAt.lt(before))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
