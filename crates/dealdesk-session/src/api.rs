//! Identity endpoint seam.

use async_trait::async_trait;
use thiserror::Error;

/// Failure taxonomy of the identity endpoint.
///
/// Only a confirmed 401/403 is definitive. Everything else (connect
/// failures, timeouts, 5xx, unparseable bodies) is transient and must not
/// log the user out on its own.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("session rejected by server")]
    Unauthorized,
    #[error("transient identity endpoint failure: {0}")]
    Transient(String),
}

/// Boundary to the portal's "who am I" and logout endpoints.
///
/// Implementations own the transport concerns: base URL, cookies and the
/// HTTP-level timeout. Structural validation of a successful body is the
/// manager's job, not the transport's.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Fetch the current principal. A 200 body is returned as raw JSON.
    async fn who_am_i(&self) -> Result<serde_json::Value, IdentityError>;

    /// Best-effort server-side logout; the response body is ignored.
    async fn logout(&self) -> Result<(), IdentityError>;

    /// Drop any locally held credential material (session cookie).
    ///
    /// Called on logout and on a definitive rejection. The server stays
    /// authoritative for actual invalidation.
    fn discard_credentials(&self) {}
}
