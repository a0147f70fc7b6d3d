//! Session cache tunables.

/// Cache time-to-live, overridable via `DEALDESK_SESSION_TTL_MS`.
const DEFAULT_CACHE_TTL_MS: i64 = 10 * 60 * 1000;

/// Background revalidation period, overridable via
/// `DEALDESK_REVALIDATE_INTERVAL_MS`.
const DEFAULT_REVALIDATE_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// Minimum gap between non-forced reconciliations (throttles focus bursts).
const DEFAULT_MIN_RECONCILE_INTERVAL_MS: i64 = 5 * 1000;

/// First backoff window after a transient failure.
const DEFAULT_BACKOFF_BASE_MS: i64 = 1000;

/// Backoff ceiling.
const DEFAULT_BACKOFF_MAX_MS: i64 = 60 * 1000;

/// Bound on a single reconciliation round-trip (seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_CACHE_TTL_MS: &str = "DEALDESK_SESSION_TTL_MS";
pub const ENV_REVALIDATE_INTERVAL_MS: &str = "DEALDESK_REVALIDATE_INTERVAL_MS";

/// Session cache configuration.
#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    /// How long a persisted envelope may be hydrated without revalidation.
    pub cache_ttl_ms: i64,
    /// Period of the background revalidation timer.
    pub revalidate_interval_ms: i64,
    /// Minimum gap between non-forced reconciliations.
    pub min_reconcile_interval_ms: i64,
    /// First backoff window; doubles per consecutive transient failure.
    pub backoff_base_ms: i64,
    /// Backoff ceiling.
    pub backoff_max_ms: i64,
    /// Bound on a single reconciliation round-trip.
    pub request_timeout_secs: u64,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            revalidate_interval_ms: DEFAULT_REVALIDATE_INTERVAL_MS,
            min_reconcile_interval_ms: DEFAULT_MIN_RECONCILE_INTERVAL_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SessionCacheConfig {
    /// Default configuration with the environment overrides applied.
    ///
    /// Unset, unparseable or zero values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ttl) = read_positive_ms(ENV_CACHE_TTL_MS) {
            config.cache_ttl_ms = ttl;
        }
        if let Some(interval) = read_positive_ms(ENV_REVALIDATE_INTERVAL_MS) {
            config.revalidate_interval_ms = interval;
        }
        config
    }
}

fn read_positive_ms(var: &str) -> Option<i64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(var, %raw, "ignoring invalid duration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_non_zero() {
        let config = SessionCacheConfig::default();
        assert!(config.cache_ttl_ms > 0);
        assert!(config.revalidate_interval_ms > 0);
        assert!(config.min_reconcile_interval_ms > 0);
        assert!(config.backoff_base_ms > 0);
        assert!(config.backoff_max_ms >= config.backoff_base_ms);
        assert!(config.request_timeout_secs > 0);
    }

    #[test]
    fn env_overrides_reject_garbage_and_zero() {
        // Env mutation is process-global, so exercise both vars in one test.
        std::env::set_var(ENV_CACHE_TTL_MS, "120000");
        std::env::set_var(ENV_REVALIDATE_INTERVAL_MS, "0");
        let config = SessionCacheConfig::from_env();
        assert_eq!(config.cache_ttl_ms, 120_000);
        assert_eq!(
            config.revalidate_interval_ms, DEFAULT_REVALIDATE_INTERVAL_MS,
            "zero must fall back to the default"
        );

        std::env::set_var(ENV_CACHE_TTL_MS, "soon");
        let config = SessionCacheConfig::from_env();
        assert_eq!(config.cache_ttl_ms, DEFAULT_CACHE_TTL_MS);

        std::env::remove_var(ENV_CACHE_TTL_MS);
        std::env::remove_var(ENV_REVALIDATE_INTERVAL_MS);
    }
}
