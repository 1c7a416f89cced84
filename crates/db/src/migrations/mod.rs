//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_business_table;
mod m20250101_000002_create_staff_tables;
mod m20250101_000003_create_dining_table_table;
mod m20250101_000004_create_waiter_call_table;
mod m20250101_000005_create_table_silence_table;
mod m20250101_000006_create_device_token_table;
mod m20250101_000007_create_ip_block_table;

/// Migrator for running all migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_business_table::Migration),
            Box::new(m20250101_000002_create_staff_tables::Migration),
            Box::new(m20250101_000003_create_dining_table_table::Migration),
            Box::new(m20250101_000004_create_waiter_call_table::Migration),
            Box::new(m20250101_000005_create_table_silence_table::Migration),
            Box::new(m20250101_000006_create_device_token_table::Migration),
            Box::new(m20250101_000007_create_ip_block_table::Migration),
        ]
    }
}
