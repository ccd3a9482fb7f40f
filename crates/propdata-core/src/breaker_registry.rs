//! Named circuit breakers shared by every gateway in the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitSnapshot};

pub const GLOBAL_CIRCUIT: &str = "global";
pub const AUTHENTICATION_CIRCUIT: &str = "authentication";
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Breaker configuration per circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub endpoint: CircuitBreakerConfig,
    pub global: CircuitBreakerConfig,
    pub authentication: CircuitBreakerConfig,
    pub overrides: HashMap<String, CircuitBreakerConfig>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            endpoint: CircuitBreakerConfig::new(5, Duration::from_secs(60), 3),
            global: CircuitBreakerConfig::new(10, Duration::from_secs(30), 5),
            authentication: CircuitBreakerConfig::new(3, Duration::from_secs(300), 1),
            overrides: HashMap::new(),
        }
    }
}

impl BreakerSettings {
    pub fn with_override(
        mut self,
        circuit: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        self.overrides.insert(circuit.into(), config);
        self
    }

    pub fn config_for(&self, circuit: &str) -> CircuitBreakerConfig {
        if let Some(config) = self.overrides.get(circuit) {
            return *config;
        }
        match circuit {
            GLOBAL_CIRCUIT => self.global,
            AUTHENTICATION_CIRCUIT => self.authentication,
            _ => self.endpoint,
        }
    }
}

/// Get-or-create registry of breakers keyed by endpoint name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        let registry = Self {
            settings,
            breakers: Mutex::new(HashMap::new()),
        };
        let _ = registry.breaker(GLOBAL_CIRCUIT);
        let _ = registry.breaker(AUTHENTICATION_CIRCUIT);
        registry
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();
        Arc::clone(breakers.entry(name.to_owned()).or_insert_with(|| {
            tracing::debug!(circuit = name, "creating circuit breaker");
            Arc::new(CircuitBreaker::new(name, self.settings.config_for(name)))
        }))
    }

    pub fn global(&self) -> Arc<CircuitBreaker> {
        self.breaker(GLOBAL_CIRCUIT)
    }

    pub fn authentication(&self) -> Arc<CircuitBreaker> {
        self.breaker(AUTHENTICATION_CIRCUIT)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.all()
            .into_iter()
            .map(|breaker| (breaker.name().to_owned(), breaker.snapshot()))
            .collect()
    }

    /// Metrics for every breaker, sorted by circuit name.
    pub fn metrics_all(&self) -> Vec<CircuitMetrics> {
        let mut metrics: Vec<CircuitMetrics> =
            self.all().iter().map(|breaker| breaker.metrics()).collect();
        metrics.sort_by(|left, right| left.name.cmp(&right.name));
        metrics
    }

    pub fn reset_all(&self) {
        for breaker in self.all() {
            breaker.reset();
        }
    }

    /// Flips every open breaker whose reset timeout elapsed to half-open.
    pub fn advance_open_circuits(&self) -> usize {
        self.all()
            .iter()
            .filter(|breaker| breaker.try_half_open())
            .count()
    }

    /// Spawns the background monitor on the current tokio runtime.
    pub fn start_monitor(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let (shutdown, receiver) = broadcast::channel(1);
        let registry = Arc::clone(self);
        let task = tokio::spawn(run_monitor(registry, interval, receiver));
        MonitorHandle {
            shutdown,
            task: Some(task),
        }
    }

    // Snapshot of the map so breaker locks are never taken under the registry lock.
    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_monitor(
    registry: Arc<CircuitBreakerRegistry>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = interval.max(Duration::from_millis(1));
    tracing::info!(interval_ms = interval.as_millis() as u64, "breaker monitor starting");

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let advanced = registry.advance_open_circuits();
                if advanced > 0 {
                    tracing::debug!(advanced, "monitor moved circuits to half-open");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("breaker monitor received shutdown signal");
                break;
            }
        }
    }
}

/// Owner of a running monitor task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signals the monitor and waits for it to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    tracing::warn!(%error, "breaker monitor ended abnormally");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
