//! Job definitions.

#![allow(missing_docs)]

mod push;

pub use push::PushJob;
