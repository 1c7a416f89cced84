//! Staff profile repository (admin and waiter profiles).

use std::sync::Arc;

use crate::entities::{AdminProfile, WaiterProfile, admin_profile, waiter_profile};
use mozo_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// Staff profile repository for database operations.
#[derive(Clone)]
pub struct StaffProfileRepository {
    db: Arc<DatabaseConnection>,
}

impl StaffProfileRepository {
    /// Create a new staff profile repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the admin profile of a user.
    pub async fn find_admin_by_user_id(
        &self,
        user_id: &str,
    ) -> AppResult<Option<admin_profile::Model>> {
        AdminProfile::find()
            .filter(admin_profile::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the waiter profile of a user.
    pub async fn find_waiter_by_user_id(
        &self,
        user_id: &str,
    ) -> AppResult<Option<waiter_profile::Model>> {
        WaiterProfile::find()
            .filter(waiter_profile::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find waiter profiles for several users.
    pub async fn find_waiters_by_user_ids(
        &self,
        user_ids: &[String],
    ) -> AppResult<Vec<waiter_profile::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        WaiterProfile::find()
            .filter(waiter_profile::Column::UserId.is_in(user_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Active waiter profiles of a business.
    pub async fn find_active_waiters_by_business(
        &self,
        business_id: &str,
    ) -> AppResult<Vec<waiter_profile::Model>> {
        WaiterProfile::find()
            .filter(waiter_profile::Column::BusinessId.eq(business_id))
            .filter(waiter_profile::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
