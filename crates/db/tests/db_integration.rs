//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `mozo_test`)
//!   `TEST_DB_PASSWORD` (default: `mozo_test`)
//!   `TEST_DB_NAME` (default: `mozo_test`)

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use mozo_common::{AppError, IdGenerator};
use mozo_db::entities::{
    table_silence::{self, SilenceReason},
    waiter_call::{self, CallStatus, CallUrgency},
};
use mozo_db::repositories::{TableSilenceRepository, WaiterCallRepository};
use mozo_db::test_utils::{Fixtures, TestDatabase, TestDbConfig};
use sea_orm::Set;

fn pending_call(table_id: &str, business_id: &str) -> waiter_call::ActiveModel {
    waiter_call::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        table_id: Set(table_id.to_string()),
        business_id: Set(business_id.to_string()),
        waiter_id: Set(None),
        status: Set(CallStatus::Pending),
        urgency: Set(CallUrgency::Normal),
        message: Set("Call from table 5".to_string()),
        metadata: Set(serde_json::json!({})),
        called_at: Set(Utc::now().fixed_offset()),
        acknowledged_at: Set(None),
        completed_at: Set(None),
        cancelled_at: Set(None),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_truncate_all() {
    let db = TestDatabase::connect().await.expect("Failed to connect");
    let result = db.truncate_all().await;
    assert!(result.is_ok(), "Cleanup failed: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_execute_query() {
    let db = TestDatabase::connect().await.expect("Failed to connect");

    // Connection should be valid
    use sea_orm::ConnectionTrait;
    let result = db
        .connection()
        .execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_string(),
        ))
        .await;

    assert!(result.is_ok(), "Query failed: {:?}", result.err());
}

#[test]
fn test_config_from_env() {
    // Test that default config is valid
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}

#[test]
fn test_database_url_format() {
    let config = TestDbConfig {
        host: "testhost".to_string(),
        port: 5432,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        database: "testdb".to_string(),
    };

    let url = config.database_url();
    assert!(url.starts_with("postgres://"));
    assert!(url.contains("testhost"));
    assert!(url.contains("5432"));
    assert!(url.contains("testuser"));
    assert!(url.contains("testdb"));
}

#[test]
fn test_postgres_url_format() {
    let config = TestDbConfig::default();
    let url = config.postgres_url();
    assert!(url.ends_with("/postgres"));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_claims_have_one_winner() {
    let db = TestDatabase::isolated().await.expect("Failed to create database");
    let fx = Fixtures::insert(db.connection(), "claim").await.unwrap();
    let repo = WaiterCallRepository::new(db.shared());

    let call = repo
        .create(pending_call(&fx.table.id, &fx.business.id))
        .await
        .unwrap();

    let now = Utc::now().fixed_offset();
    let (a, b) = tokio::join!(
        repo.claim(&call.id, &fx.waiter_a.id, now),
        repo.claim(&call.id, &fx.waiter_b.id, now),
    );
    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let stored = repo.get_by_id(&call.id).await.unwrap();
    assert_eq!(stored.status, CallStatus::Acknowledged);
    assert!(stored.acknowledged_at.is_some());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_second_unresolved_call_rejected_by_index() {
    let db = TestDatabase::isolated().await.expect("Failed to create database");
    let fx = Fixtures::insert(db.connection(), "open").await.unwrap();
    let repo = WaiterCallRepository::new(db.shared());

    let first = repo
        .create(pending_call(&fx.table.id, &fx.business.id))
        .await
        .unwrap();
    let second = repo
        .create(pending_call(&fx.table.id, &fx.business.id))
        .await;
    assert!(matches!(second, Err(AppError::AlreadyCalled(_))));

    // Once resolved, the table may call again
    repo.cancel(&first.id, Utc::now().fixed_offset()).await.unwrap();
    assert!(repo
        .create(pending_call(&fx.table.id, &fx.business.id))
        .await
        .is_ok());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_one_open_silence_per_table() {
    let db = TestDatabase::isolated().await.expect("Failed to create database");
    let fx = Fixtures::insert(db.connection(), "silence").await.unwrap();
    let repo = TableSilenceRepository::new(db.shared());

    let silence = |reason| table_silence::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        table_id: Set(fx.table.id.clone()),
        business_id: Set(fx.business.id.clone()),
        silenced_by: Set(Some(fx.waiter_a.id.clone())),
        reason: Set(reason),
        silenced_at: Set(Utc::now().fixed_offset()),
        ends_at: Set(None),
        unsilenced_at: Set(None),
        unsilenced_by: Set(None),
        call_count: Set(0),
        notes: Set(None),
    };

    let first = repo.create(silence(SilenceReason::Manual)).await.unwrap();
    let second = repo.create(silence(SilenceReason::Automatic)).await;
    assert!(matches!(second, Err(AppError::TableAlreadySilenced(_))));

    let now = Utc::now().fixed_offset();
    let (a, b) = tokio::join!(
        repo.close(&first.id, Some(&fx.waiter_a.id), now),
        repo.close(&first.id, Some(&fx.waiter_b.id), now),
    );
    assert_eq!(a.unwrap() + b.unwrap(), 1);
    assert!(repo.find_open_for_table(&fx.table.id).await.unwrap().is_none());

    db.drop_database().await.unwrap();
}
