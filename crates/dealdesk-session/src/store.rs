//! Envelope persistence seam.

use parking_lot::Mutex;
use thiserror::Error;

use crate::envelope::CacheEnvelope;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),
    #[error("store serialization error: {0}")]
    Serialize(String),
}

/// Persistence for the cache envelope, shared by all sessions of one
/// profile.
///
/// Corrupt or unreadable persisted data loads as `None`; absence is never
/// an error. Writers replace the whole envelope, last write wins.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<CacheEnvelope>;

    /// # Errors
    ///
    /// Returns an error when the envelope could not be written; the
    /// manager logs and carries on with in-memory state.
    fn save(&self, envelope: &CacheEnvelope) -> Result<(), StoreError>;

    /// Delete the persisted envelope. A missing envelope is not an error.
    fn clear(&self);
}

/// In-memory store: a single shared slot.
///
/// Used by tests and short-lived embedders; two managers handed the same
/// instance share the slot the way browser tabs share profile storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<CacheEnvelope>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot, bypassing version checks. Test scaffolding.
    pub fn put(&self, envelope: CacheEnvelope) {
        *self.slot.lock() = Some(envelope);
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<CacheEnvelope> {
        self.slot.lock().clone()
    }

    fn save(&self, envelope: &CacheEnvelope) -> Result<(), StoreError> {
        *self.slot.lock() = Some(envelope.clone());
        Ok(())
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}
