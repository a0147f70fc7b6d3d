//! The session cache manager.
//!
//! Single source of truth, within one session of the app, for "is this
//! principal authenticated, as whom". Keeps server round-trips rare by
//! hydrating from the persisted envelope, throttling bursts, and backing
//! off exponentially after transient failures, while staying promptly
//! synchronized with server-side invalidation and with peer sessions.
//!
//! Nothing here returns an error or panics: every failure is absorbed
//! into a state transition and logged. Consumers observe exactly the
//! four fields of [`AuthSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::api::{IdentityApi, IdentityError};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionCacheConfig;
use crate::envelope::CacheEnvelope;
use crate::identity::{validate_me_payload, Role, SessionRecord};
use crate::signal::{SessionSignal, SignalBus, SignalKind};
use crate::store::SessionStore;

/// Synchronous view of the current auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub role: Option<Role>,
    pub user_id: Option<i64>,
    /// True only until the very first reconciliation settles when no
    /// usable cache exists. Route guards show a spinner while set.
    pub loading: bool,
}

#[derive(Debug)]
struct AuthState {
    user: Option<SessionRecord>,
    loading: bool,
}

/// Process-local reconciliation bookkeeping. Never persisted.
#[derive(Debug)]
struct ReconState {
    /// When the last attempt was claimed, unix ms. Zero = never.
    last_check_ms: i64,
    /// Epoch of the attempt currently on the wire, if any.
    in_flight: Option<u64>,
    /// Consecutive transient failures.
    failures: u32,
    /// No automatic attempt before this instant.
    next_retry_ms: i64,
    /// Generation counter; bumped by logout so a late response from a
    /// pre-logout attempt is discarded instead of re-authenticating.
    epoch: u64,
}

enum Applied {
    Success(SessionRecord),
    Definitive,
    Transient,
}

struct Inner {
    api: Arc<dyn IdentityApi>,
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn SignalBus>,
    clock: Arc<dyn Clock>,
    config: SessionCacheConfig,
    instance_id: u64,
    auth: RwLock<AuthState>,
    recon: Mutex<ReconState>,
}

/// Cheap-clone handle to one session cache instance.
///
/// Explicitly constructed and passed around; there is no ambient
/// singleton. Initial state is unauthenticated with `loading` set.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn IdentityApi>,
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn SignalBus>,
        config: SessionCacheConfig,
    ) -> Self {
        Self::with_clock(api, store, bus, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        api: Arc<dyn IdentityApi>,
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn SignalBus>,
        config: SessionCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                bus,
                clock,
                config,
                instance_id: rand::random(),
                auth: RwLock::new(AuthState {
                    user: None,
                    loading: true,
                }),
                recon: Mutex::new(ReconState {
                    last_check_ms: 0,
                    in_flight: None,
                    failures: 0,
                    next_retry_ms: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Snapshot of the current state. Never blocks on the network.
    #[must_use]
    pub fn state(&self) -> AuthSnapshot {
        let auth = self.inner.auth.read();
        AuthSnapshot {
            is_authenticated: auth.user.is_some(),
            role: auth.user.as_ref().map(|u| u.role.clone()),
            user_id: auth.user.as_ref().map(|u| u.id),
            loading: auth.loading,
        }
    }

    /// Reconcile local state against the server.
    ///
    /// With `force` unset this prefers the persisted envelope: a usable
    /// one hydrates synchronously without a network call, and only a
    /// session that was not yet authenticated in memory schedules a
    /// deferred background revalidation to confirm the cached identity.
    /// Bursts are throttled: at most one request is on the wire per
    /// session, repeat calls within the minimum interval or inside a
    /// backoff window are no-ops.
    ///
    /// The only await point is the bounded identity request itself.
    pub async fn reconcile(&self, force: bool) {
        let now = self.inner.clock.now_millis();

        if !force {
            if let Some(envelope) = self.inner.store.load() {
                if envelope.is_usable(now, self.inner.config.cache_ttl_ms) {
                    let had_auth = self.inner.auth.read().user.is_some();
                    tracing::debug!(user_id = envelope.user.id, "hydrating session from cache");
                    self.set_authenticated(envelope.user);
                    if !had_auth {
                        // One tick deferred: the UI sees the cached
                        // identity immediately, the server confirms it
                        // in the background.
                        let manager = self.clone();
                        tokio::spawn(async move { manager.revalidate().await });
                    }
                    return;
                }
            }
        }

        let Some(attempt_epoch) = self.try_claim(force, now) else {
            self.settle_unauthenticated_loading();
            return;
        };
        self.run_attempt(attempt_epoch).await;
    }

    /// Background confirmation of a hydrated session. Goes through the
    /// normal gates but never re-reads the cache.
    async fn revalidate(&self) {
        let now = self.inner.clock.now_millis();
        if let Some(attempt_epoch) = self.try_claim(false, now) {
            self.run_attempt(attempt_epoch).await;
        }
    }

    /// Synchronous hydration for a caller that already holds a fresh
    /// record (right after an explicit login). Equivalent to the success
    /// path of [`Self::reconcile`] without the network call.
    pub fn update_state(&self, record: SessionRecord) {
        let now = self.inner.clock.now_millis();
        {
            let mut recon = self.inner.recon.lock();
            recon.failures = 0;
            recon.next_retry_ms = 0;
            recon.last_check_ms = now;
        }
        self.set_authenticated(record.clone());
        self.persist(record, now);
        self.publish(SignalKind::Login);
    }

    /// Log out: best-effort server call, then unconditional local
    /// clearing. Never returns an error.
    ///
    /// The epoch is bumped before anything else so a reconciliation
    /// response already on the wire cannot resurrect the session.
    pub async fn logout(&self) {
        {
            let mut recon = self.inner.recon.lock();
            recon.epoch = recon.epoch.wrapping_add(1);
            recon.failures = 0;
            recon.next_retry_ms = 0;
        }

        let bound = Duration::from_secs(self.inner.config.request_timeout_secs);
        match tokio::time::timeout(bound, self.inner.api.logout()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!(%err, "server logout failed, clearing locally anyway"),
            Err(_) => tracing::debug!("server logout timed out, clearing locally anyway"),
        }

        self.clear_authenticated();
        self.inner.store.clear();
        self.inner.api.discard_credentials();
        self.publish(SignalKind::Logout);
    }

    /// Spawn the automatic triggers: the periodic revalidation timer and
    /// the peer-signal listener. Focus/connectivity events are the
    /// embedder's to forward as `reconcile(false)` calls.
    #[must_use]
    pub fn start_background(&self) -> BackgroundTasks {
        let period = to_duration(self.inner.config.revalidate_interval_ms);
        let timer = {
            let manager = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    manager.reconcile(false).await;
                }
            })
        };

        let listener = {
            let manager = self.clone();
            let mut rx = self.inner.bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(signal) => manager.handle_signal(signal).await,
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "session signal listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        BackgroundTasks {
            tasks: vec![timer, listener],
        }
    }

    async fn handle_signal(&self, signal: SessionSignal) {
        if signal.origin == self.inner.instance_id {
            return;
        }
        match signal.kind {
            SignalKind::Logout => {
                tracing::debug!("peer session logged out, clearing local state");
                // The peer already cleared the shared envelope; no
                // reconciliation call for a confirmed logout.
                self.clear_authenticated();
            }
            SignalKind::Login => {
                tracing::debug!("peer session logged in, hydrating");
                self.reconcile(false).await;
            }
        }
    }

    /// Claim the single in-flight slot, or explain why not.
    fn try_claim(&self, force: bool, now: i64) -> Option<u64> {
        let mut recon = self.inner.recon.lock();
        if recon.in_flight.is_some() {
            tracing::debug!("reconciliation already in flight");
            return None;
        }
        if !force {
            if recon.last_check_ms > 0
                && now - recon.last_check_ms < self.inner.config.min_reconcile_interval_ms
            {
                tracing::debug!("reconciliation throttled by minimum interval");
                return None;
            }
            if now < recon.next_retry_ms {
                tracing::debug!(
                    next_retry_ms = recon.next_retry_ms,
                    "reconciliation deferred by backoff"
                );
                return None;
            }
        }
        recon.last_check_ms = now;
        recon.in_flight = Some(recon.epoch);
        Some(recon.epoch)
    }

    async fn run_attempt(&self, attempt_epoch: u64) {
        let bound = Duration::from_secs(self.inner.config.request_timeout_secs);
        let outcome = match tokio::time::timeout(bound, self.inner.api.who_am_i()).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Transient("identity request timed out".into())),
        };
        self.apply_outcome(attempt_epoch, outcome);
    }

    fn apply_outcome(&self, attempt_epoch: u64, outcome: Result<serde_json::Value, IdentityError>) {
        let applied = match outcome {
            Ok(body) => match validate_me_payload(body) {
                Ok(record) => Applied::Success(record),
                Err(err) => {
                    // A 200 without a usable shape is a local validation
                    // failure, not a rejection.
                    tracing::warn!(%err, "malformed identity payload");
                    Applied::Transient
                }
            },
            Err(IdentityError::Unauthorized) => Applied::Definitive,
            Err(IdentityError::Transient(reason)) => {
                tracing::debug!(%reason, "transient identity failure");
                Applied::Transient
            }
        };

        let now = self.inner.clock.now_millis();
        {
            let mut recon = self.inner.recon.lock();
            if recon.in_flight == Some(attempt_epoch) {
                recon.in_flight = None;
            }
            if recon.epoch != attempt_epoch {
                tracing::debug!("discarding identity response from a stale epoch");
                return;
            }
            match applied {
                Applied::Success(_) | Applied::Definitive => {
                    recon.failures = 0;
                    recon.next_retry_ms = 0;
                }
                Applied::Transient => {
                    recon.failures = recon.failures.saturating_add(1);
                    let window = backoff_window(
                        recon.failures,
                        self.inner.config.backoff_base_ms,
                        self.inner.config.backoff_max_ms,
                    );
                    recon.next_retry_ms = now.saturating_add(window);
                }
            }
        }

        match applied {
            Applied::Success(record) => {
                tracing::debug!(user_id = record.id, role = %record.role, "session reconciled");
                self.set_authenticated(record.clone());
                self.persist(record, now);
                self.publish(SignalKind::Login);
            }
            Applied::Definitive => {
                tracing::debug!("server rejected session, clearing local state");
                self.clear_authenticated();
                self.inner.store.clear();
                self.inner.api.discard_credentials();
            }
            Applied::Transient => {
                // Stale-but-trusted: an authenticated session rides out
                // transient failures until a definitive rejection.
                self.settle_unauthenticated_loading();
            }
        }
    }

    fn persist(&self, record: SessionRecord, now: i64) {
        let envelope = CacheEnvelope::new(record, now);
        if let Err(err) = self.inner.store.save(&envelope) {
            tracing::warn!(%err, "failed to persist session envelope");
        }
    }

    fn publish(&self, kind: SignalKind) {
        self.inner.bus.publish(SessionSignal {
            kind,
            at: self.inner.clock.now_millis(),
            origin: self.inner.instance_id,
        });
    }

    fn set_authenticated(&self, record: SessionRecord) {
        let mut auth = self.inner.auth.write();
        auth.user = Some(record);
        auth.loading = false;
    }

    fn clear_authenticated(&self) {
        let mut auth = self.inner.auth.write();
        auth.user = None;
        auth.loading = false;
    }

    /// A skipped or failed attempt still settles `loading` for an
    /// unauthenticated session so route guards can stop waiting.
    /// Authenticated state is left untouched.
    fn settle_unauthenticated_loading(&self) {
        let mut auth = self.inner.auth.write();
        if auth.user.is_none() {
            auth.loading = false;
        }
    }
}

/// Handles of the spawned trigger tasks. Aborted on [`Self::stop`] or
/// drop; the tasks hold no state worth joining.
#[derive(Debug)]
pub struct BackgroundTasks {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Backoff window after `failures` consecutive transient failures:
/// `base * 2^(failures - 1)`, capped.
fn backoff_window(failures: u32, base_ms: i64, max_ms: i64) -> i64 {
    if failures == 0 {
        return 0;
    }
    let exp = (failures - 1).min(31);
    base_ms.saturating_mul(1_i64 << exp).min(max_ms)
}

fn to_duration(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}
