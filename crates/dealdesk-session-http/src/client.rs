//! Identity client for the portal backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use dealdesk_session::{IdentityApi, IdentityError};

/// Name of the portal's session cookie.
const AUTH_COOKIE: &str = "dealdesk_token";

/// Default HTTP-level timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum PortalClientError {
    #[error("invalid portal base URL: {0}")]
    InvalidBaseUrl(String),
}

/// HTTP client for `GET /api/me` and `POST /api/logout`.
///
/// Owns the cookie jar so the session cookie rides along automatically
/// and can be expired client-side on logout. Only 401/403 are reported
/// as definitive; every other failure is transient.
pub struct PortalIdentityClient {
    client: Client,
    base_url: Url,
    jar: Arc<Jar>,
}

impl PortalIdentityClient {
    /// Create a client with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PortalClientError::InvalidBaseUrl`] when the base URL
    /// does not parse.
    pub fn new(base_url: &str) -> Result<Self, PortalClientError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PortalClientError::InvalidBaseUrl`] when the base URL
    /// does not parse.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, PortalClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| PortalClientError::InvalidBaseUrl(e.to_string()))?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .unwrap_or_default();

        Ok(Self {
            client,
            base_url,
            jar,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

fn transient(err: &reqwest::Error) -> IdentityError {
    if err.is_timeout() {
        IdentityError::Transient("identity request timed out".into())
    } else {
        IdentityError::Transient(err.to_string())
    }
}

#[async_trait]
impl IdentityApi for PortalIdentityClient {
    async fn who_am_i(&self) -> Result<serde_json::Value, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("/api/me"))
            .send()
            .await
            .map_err(|e| transient(&e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Unauthorized),
            status if status.is_success() => response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| IdentityError::Transient(format!("unreadable identity body: {e}"))),
            status => Err(IdentityError::Transient(format!(
                "unexpected identity status {status}"
            ))),
        }
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        self.client
            .post(self.endpoint("/api/logout"))
            .send()
            .await
            .map_err(|e| transient(&e))?;
        // Best effort: any response counts, the body is ignored.
        Ok(())
    }

    fn discard_credentials(&self) {
        // Expiring the cookie removes it from the jar; the server stays
        // authoritative for actual invalidation.
        self.jar.add_cookie_str(
            &format!("{AUTH_COOKIE}=; Max-Age=0; Path=/"),
            &self.base_url,
        );
        tracing::debug!("expired local session cookie");
    }
}
