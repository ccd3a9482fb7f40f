//! Per-endpoint circuit breaker.
//!
//! A breaker is `Closed` until `failure_threshold` consecutive failures open it.
//! Once `reset_timeout` has elapsed since the last failure, the next
//! [`CircuitBreaker::allow_request`] call moves it to `HalfOpen` and admits that
//! call as a probe. `HalfOpen` admits at most `half_open_max_requests` probes;
//! that many successes close the circuit, any failure re-opens it.
//!
//! All state sits behind one mutex per breaker. State-change listeners run after
//! the lock is released, so a listener may query the breaker it observes.

use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Runtime circuit state for vendor calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub const fn new(
        failure_threshold: u32,
        reset_timeout: Duration,
        half_open_max_requests: u32,
    ) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            half_open_max_requests,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::NonPositiveBreakerSetting {
                field: "failure_threshold",
            });
        }
        if self.reset_timeout.is_zero() {
            return Err(ValidationError::NonPositiveBreakerSetting {
                field: "reset_timeout",
            });
        }
        if self.half_open_max_requests == 0 {
            return Err(ValidationError::NonPositiveBreakerSetting {
                field: "half_open_max_requests",
            });
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker's state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<UtcDateTime>,
    pub half_open_requests: u32,
    pub last_state_change: UtcDateTime,
}

/// Operational counters for dashboards and the `breakers` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<UtcDateTime>,
    pub time_in_state_ms: u64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected_requests: u64,
}

/// Emitted to listeners after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub circuit: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: UtcDateTime,
}

/// Handle returned by [`CircuitBreaker::on_state_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_requests: u32,
    last_failure: Option<(Instant, UtcDateTime)>,
    state_since: Instant,
    last_state_change: UtcDateTime,
    /// Bumped on every transition so stale probe permits cannot release slots.
    generation: u64,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    rejected_requests: u64,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_requests: 0,
            last_failure: None,
            state_since: Instant::now(),
            last_state_change: UtcDateTime::now(),
            generation: 0,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            rejected_requests: 0,
        }
    }

    fn transition(&mut self, name: &str, to: CircuitState) -> Option<StateChange> {
        let from = self.state;
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_requests = 0;
        self.state_since = Instant::now();
        self.last_state_change = UtcDateTime::now();
        self.generation = self.generation.wrapping_add(1);

        (from != to).then(|| StateChange {
            circuit: name.to_owned(),
            from,
            to,
            at: self.last_state_change,
        })
    }

    fn reset_elapsed(&self, reset_timeout: Duration) -> bool {
        match self.last_failure {
            Some((at, _)) => at.elapsed() >= reset_timeout,
            None => true,
        }
    }
}

/// Thread-safe circuit breaker for one named vendor endpoint.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout,
            half_open_max_requests: config.half_open_max_requests.max(1),
        };
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitInner::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Decides whether a call may proceed, admitting a half-open probe when the
    /// reset timeout has elapsed. Check and admission happen under one lock.
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Like [`allow_request`](Self::allow_request), but hands back a permit that
    /// records the outcome and gives the probe slot back if dropped unresolved.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        self.admit().map(|admission| CallPermit {
            breaker: Arc::clone(self),
            probe_generation: admission,
            resolved: false,
        })
    }

    /// Returns `Some(generation)` for half-open probes, `Some(None)` for closed admissions.
    fn admit(&self) -> Option<Option<u64>> {
        let (admitted, change) = {
            let mut inner = self.lock_inner();
            let mut change = None;

            if inner.state == CircuitState::Open && inner.reset_elapsed(self.config.reset_timeout) {
                change = inner.transition(&self.name, CircuitState::HalfOpen);
            }

            let admitted = match inner.state {
                CircuitState::Closed => Some(None),
                CircuitState::HalfOpen
                    if inner.half_open_requests < self.config.half_open_max_requests =>
                {
                    inner.half_open_requests += 1;
                    Some(Some(inner.generation))
                }
                CircuitState::HalfOpen | CircuitState::Open => None,
            };

            if admitted.is_some() {
                inner.total_requests += 1;
            } else {
                inner.rejected_requests += 1;
            }
            (admitted, change)
        };

        self.notify(change);
        admitted
    }

    pub fn record_success(&self) {
        let change = {
            let mut inner = self.lock_inner();
            inner.total_successes += 1;
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.half_open_max_requests {
                        inner.transition(&self.name, CircuitState::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    pub fn record_failure(&self) {
        let change = {
            let mut inner = self.lock_inner();
            inner.total_failures += 1;
            inner.last_failure = Some((Instant::now(), UtcDateTime::now()));
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.transition(&self.name, CircuitState::Open)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => inner.transition(&self.name, CircuitState::Open),
                CircuitState::Open => {
                    inner.failure_count += 1;
                    None
                }
            }
        };
        self.notify(change);
    }

    /// Moves an open circuit to half-open once the reset timeout has elapsed,
    /// without admitting a request. Returns whether a transition happened.
    pub fn try_half_open(&self) -> bool {
        let change = {
            let mut inner = self.lock_inner();
            if inner.state == CircuitState::Open && inner.reset_elapsed(self.config.reset_timeout) {
                inner.transition(&self.name, CircuitState::HalfOpen)
            } else {
                None
            }
        };
        let transitioned = change.is_some();
        self.notify(change);
        transitioned
    }

    /// Forces the circuit closed and clears failure history.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.lock_inner();
            inner.last_failure = None;
            inner.transition(&self.name, CircuitState::Closed)
        };
        self.notify(change);
    }

    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock_inner();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure.map(|(_, at)| at),
            half_open_requests: inner.half_open_requests,
            last_state_change: inner.last_state_change,
        }
    }

    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.lock_inner();
        CircuitMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure.map(|(_, at)| at),
            time_in_state_ms: u64::try_from(inner.state_since.elapsed().as_millis())
                .unwrap_or(u64::MAX),
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            rejected_requests: inner.rejected_requests,
        }
    }

    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when no listener had this id.
    pub fn remove_state_change_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.lock_inner();
        if inner.state == CircuitState::HalfOpen && inner.generation == generation {
            inner.half_open_requests = inner.half_open_requests.saturating_sub(1);
        }
    }

    fn notify(&self, change: Option<StateChange>) {
        let Some(change) = change else {
            return;
        };

        tracing::info!(
            circuit = %change.circuit,
            from = %change.from,
            to = %change.to,
            "circuit state changed"
        );

        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                tracing::error!(circuit = %change.circuit, "circuit state listener panicked");
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission to call through a breaker.
///
/// Resolve with [`success`](Self::success) or [`failure`](Self::failure).
/// Dropping an unresolved permit records nothing; a half-open probe slot is
/// handed back so a cancelled call neither counts as a failure nor burns probe
/// budget.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe_generation: Option<u64>,
    resolved: bool,
}

impl CallPermit {
    pub fn is_probe(&self) -> bool {
        self.probe_generation.is_some()
    }

    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }

    /// Resolves the permit without recording an outcome.
    pub fn neutral(self) {}
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Some(generation) = self.probe_generation {
            self.breaker.release_probe(generation);
        }
    }
}
