//! Persisted cache envelope around a session record.

use serde::{Deserialize, Serialize};

use crate::identity::SessionRecord;

/// Versioned, timestamped wrapper persisted by the session store.
///
/// An envelope whose `ver` does not match [`CacheEnvelope::CURRENT_VERSION`]
/// is treated as absent, never partially trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub user: SessionRecord,
    /// Capture timestamp, unix milliseconds.
    pub ts: i64,
    /// Schema version tag.
    pub ver: u32,
}

impl CacheEnvelope {
    pub const CURRENT_VERSION: u32 = 1;

    #[must_use]
    pub fn new(user: SessionRecord, ts: i64) -> Self {
        Self {
            user,
            ts,
            ver: Self::CURRENT_VERSION,
        }
    }

    /// Whether this envelope may be hydrated at `now` under the given TTL.
    #[must_use]
    pub fn is_usable(&self, now_millis: i64, ttl_millis: i64) -> bool {
        self.ver == Self::CURRENT_VERSION && now_millis.saturating_sub(self.ts) <= ttl_millis
    }
}
