//! User repository.

use std::sync::Arc;

use crate::entities::{User, user};
use mozo_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by API token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::ApiToken.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All waiters of a business.
    pub async fn find_waiters_by_business(&self, business_id: &str) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(user::Column::BusinessId.eq(business_id))
            .filter(user::Column::Role.eq(user::UserRole::Waiter))
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_user(id: &str, role: user::UserRole) -> user::Model {
        user::Model {
            id: id.to_string(),
            business_id: "b1".to_string(),
            name: format!("{id} name"),
            email: format!("{id}@example.com"),
            role,
            api_token: format!("token-{id}"),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_token() {
        let user = create_test_user("u1", user::UserRole::Waiter);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo.find_by_token("token-u1").await.unwrap();

        assert_eq!(found.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_find_waiters_by_business() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_user("w1", user::UserRole::Waiter),
                    create_test_user("w2", user::UserRole::Waiter),
                ]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let waiters = repo.find_waiters_by_business("b1").await.unwrap();

        assert_eq!(waiters.len(), 2);
        assert!(waiters.iter().all(|w| w.role == user::UserRole::Waiter));
    }
}
