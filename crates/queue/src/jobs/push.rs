//! Push notification job.

use mozo_core::PushRequest;
use serde::{Deserialize, Serialize};

/// Job to send one push request to the devices of its recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushJob {
    pub request: PushRequest,

    /// Zero for the first try.
    #[serde(default)]
    pub attempt: u32,
}

impl PushJob {
    /// Create a new push job.
    #[must_use]
    pub const fn new(request: PushRequest) -> Self {
        Self {
            request,
            attempt: 0,
        }
    }

    /// The same push, one attempt later.
    #[must_use]
    pub fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }

    /// Call the push is about, for logging.
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.request.payload.data.call_id
    }
}
