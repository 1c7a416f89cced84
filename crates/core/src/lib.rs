//! Core business logic for mozo.

pub mod services;

pub use services::*;
