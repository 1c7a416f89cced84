//! Job workers.

mod push;

pub use push::{PushContext, push_worker};
