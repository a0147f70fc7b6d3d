//! Common test utilities for the session manager integration tests.
//!
//! Provides a settable clock, a scripted identity endpoint and a test
//! context wiring them into a manager over the in-memory store and bus.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;

use dealdesk_session::{
    Clock, IdentityApi, IdentityError, LocalSignalBus, MemorySessionStore, SessionCacheConfig,
    SessionManager, SessionStore, SignalBus,
};

/// Wall clock under test control.
#[allow(dead_code)]
#[derive(Debug)]
pub struct MockClock {
    millis: AtomicI64,
}

#[allow(dead_code)]
impl MockClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicI64::new(millis),
        })
    }

    pub fn advance(&self, by_millis: i64) {
        self.millis.fetch_add(by_millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Scripted identity endpoint: responses are consumed front to back.
///
/// An empty script answers with a transient failure, so a test that
/// expects no network call can assert on [`ScriptedApi::who_am_i_calls`]
/// instead of scripting anything.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<VecDeque<Result<serde_json::Value, IdentityError>>>,
    who_am_i_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    discard_calls: AtomicUsize,
    fail_logout: AtomicBool,
    /// When set, `who_am_i` waits for a permit before answering. Lets a
    /// test hold a response on the wire while something else happens.
    hold: Mutex<Option<Arc<Semaphore>>>,
}

#[allow(dead_code)]
impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_success(&self, body: serde_json::Value) {
        self.responses.lock().push_back(Ok(body));
    }

    pub fn push_error(&self, error: IdentityError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Gate the next responses behind a semaphore; release permits to
    /// let them through.
    pub fn hold_responses(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn who_am_i_calls(&self) -> usize {
        self.who_am_i_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn discard_calls(&self) -> usize {
        self.discard_calls.load(Ordering::SeqCst)
    }

    /// Make the logout endpoint fail from now on.
    pub fn fail_logout(&self) {
        self.fail_logout.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityApi for ScriptedApi {
    async fn who_am_i(&self) -> Result<serde_json::Value, IdentityError> {
        self.who_am_i_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.hold.lock().clone();
        if let Some(gate) = gate {
            // Hold the response until the test releases a permit; the
            // permit is intentionally forgotten so each release lets
            // exactly one response through.
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(IdentityError::Transient("gate closed".into())),
            }
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(IdentityError::Transient("no scripted response".into())))
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(IdentityError::Transient("logout endpoint down".into()));
        }
        Ok(())
    }

    fn discard_credentials(&self) {
        self.discard_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A manager wired to mocks, plus handles to all of them.
#[allow(dead_code)]
pub struct TestContext {
    pub manager: SessionManager,
    pub api: Arc<ScriptedApi>,
    pub store: Arc<MemorySessionStore>,
    pub bus: Arc<LocalSignalBus>,
    pub clock: Arc<MockClock>,
    pub config: SessionCacheConfig,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SessionCacheConfig) -> Self {
        init_tracing();
        let api = ScriptedApi::new();
        let store = Arc::new(MemorySessionStore::new());
        let bus = Arc::new(LocalSignalBus::default());
        let clock = MockClock::at(1_000_000);
        let manager = SessionManager::with_clock(
            Arc::clone(&api) as Arc<dyn IdentityApi>,
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&bus) as Arc<dyn SignalBus>,
            config.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            manager,
            api,
            store,
            bus,
            clock,
            config,
        }
    }

    /// A second manager sharing this context's store and bus — a peer
    /// session of the same profile, with its own scripted endpoint.
    pub fn peer(&self) -> (SessionManager, Arc<ScriptedApi>) {
        let api = ScriptedApi::new();
        let manager = SessionManager::with_clock(
            Arc::clone(&api) as Arc<dyn IdentityApi>,
            Arc::clone(&self.store) as Arc<dyn SessionStore>,
            Arc::clone(&self.bus) as Arc<dyn SignalBus>,
            self.config.clone(),
            Arc::clone(&self.clock) as Arc<dyn Clock>,
        );
        (manager, api)
    }
}

/// Small intervals so tests can step over windows with the mock clock.
#[allow(dead_code)]
pub fn test_config() -> SessionCacheConfig {
    SessionCacheConfig {
        cache_ttl_ms: 60_000,
        revalidate_interval_ms: 120_000,
        min_reconcile_interval_ms: 5_000,
        backoff_base_ms: 1_000,
        backoff_max_ms: 60_000,
        request_timeout_secs: 5,
    }
}

/// A structurally valid `/api/me` body.
#[allow(dead_code)]
pub fn me_body(id: i64, role: &str) -> serde_json::Value {
    json!({
        "id": id,
        "role": role,
        "name": "Test Partner",
        "partner": { "id": 1, "name": "ООО Тест", "status": "accredited" }
    })
}

/// Let spawned background work (deferred revalidation, signal handlers)
/// run to completion on the current-thread runtime.
#[allow(dead_code)]
pub async fn drain_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
