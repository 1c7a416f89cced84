//! Repositories wrapping sea-orm queries.

mod device_token;
mod dining_table;
mod ip_block;
mod staff_profile;
mod table_silence;
mod user;
mod waiter_call;

pub use device_token::DeviceTokenRepository;
pub use dining_table::DiningTableRepository;
pub use ip_block::IpBlockRepository;
pub use staff_profile::StaffProfileRepository;
pub use table_silence::TableSilenceRepository;
pub use user::UserRepository;
pub use waiter_call::{CallHistoryQuery, StatusCount, WaiterCallRepository};

use mozo_common::AppError;
use sea_orm::{DbErr, SqlErr};

/// Map a unique-constraint violation to `on_conflict`, anything else to a database error.
pub(crate) fn unique_violation_or(err: DbErr, on_conflict: impl FnOnce() -> AppError) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => on_conflict(),
        _ => AppError::Database(err.to_string()),
    }
}
