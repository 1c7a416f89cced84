//! ID generation utilities.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs sort lexicographically by creation time, so call and silence
    /// rows can be paged by ID without a secondary index on the timestamp.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Extract the creation time encoded in an ID produced by [`Self::generate`].
    #[must_use]
    pub fn timestamp_of(&self, id: &str) -> Option<DateTime<Utc>> {
        let ulid = Ulid::from_string(&id.to_uppercase()).ok()?;
        let millis = i64::try_from(ulid.timestamp_ms()).ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}
