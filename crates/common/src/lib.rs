//! Common utilities and shared types for mozo.
//!
//! This crate provides foundational components used across all mozo crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use mozo_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("{} listening on port {}", id, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{
    CallPolicyConfig, Config, FcmConfig, LogFormat, MaintenanceConfig, PushConfig,
    RealtimeConfig,
};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
