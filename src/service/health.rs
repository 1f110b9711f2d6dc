use crate::provider::SharedProvider;
use crate::service::broadcast::StatusBroadcaster;
use crate::service::fallback::FallbackController;
use crate::service::types::{
    HealthConfig, ServiceError, ServiceEvent, ServiceHealth, ServiceStatus,
};
use crate::task::{PoolKind, QueueStatus, TaskOutcome};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct HealthState {
    health: ServiceHealth,
    consecutive_failures: u32,
    last_health_check: Option<DateTime<Utc>>,
}

/// Circuit breaker over the remote completion service.
///
/// Worker pools report task outcomes here; consecutive service faults
/// degrade and eventually open the circuit, which engages fallback mode
/// and starts a background probe loop with exponential backoff. A single
/// successful call, whether probe or task, closes the circuit again.
pub struct HealthMonitor {
    config: HealthConfig,
    state: Arc<Mutex<HealthState>>,
    fallback: Arc<FallbackController>,
    broadcaster: Arc<StatusBroadcaster>,
    provider: SharedProvider,
    pool_stats: RwLock<Vec<(PoolKind, Arc<StdMutex<QueueStatus>>)>>,
    probe_generation: AtomicU64,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        fallback: Arc<FallbackController>,
        broadcaster: Arc<StatusBroadcaster>,
        provider: SharedProvider,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Arc::new(Mutex::new(HealthState {
                health: ServiceHealth::Healthy,
                consecutive_failures: 0,
                last_health_check: None,
            })),
            fallback,
            broadcaster,
            provider,
            pool_stats: RwLock::new(Vec::new()),
            probe_generation: AtomicU64::new(0),
        })
    }

    /// Attach a pool's live statistics cell so it appears in status snapshots
    pub fn register_pool(&self, kind: PoolKind, stats: Arc<StdMutex<QueueStatus>>) {
        self.pool_stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, stats));
    }

    /// Feed a finished task into the breaker.
    ///
    /// Successes always reset the failure count. Failures only count when
    /// they indicate a service fault; client-side errors such as rate
    /// limiting or cancellation leave the health state untouched.
    pub async fn record_outcome(self: &Arc<Self>, outcome: &TaskOutcome) {
        match &outcome.result {
            Ok(_) => self.record_success().await,
            Err(error) if error.is_service_fault() => self.record_failure(error).await,
            Err(error) => {
                debug!(
                    "Task {} failed without affecting health: {}",
                    outcome.task_id, error
                );
            }
        }
    }

    /// Count a service fault against the failure thresholds.
    ///
    /// A critical fault opens the circuit in one step regardless of the
    /// current count.
    pub async fn record_failure(self: &Arc<Self>, error: &ServiceError) {
        let (from, to) = {
            let mut state = self.state.lock().await;
            state.consecutive_failures += 1;
            state.last_health_check = Some(Utc::now());
            let from = state.health;
            let to = if error.is_critical()
                || state.consecutive_failures >= self.config.unavailable_threshold
            {
                ServiceHealth::Unavailable
            } else if state.consecutive_failures >= self.config.degraded_threshold {
                ServiceHealth::Degraded
            } else {
                from
            };
            state.health = to;
            (from, to)
        };

        if from != to {
            warn!("Service health degraded: {} -> {} ({})", from, to, error);
            self.broadcaster.publish(&ServiceEvent::HealthTransition {
                from,
                to,
                at: Utc::now(),
            });
        }

        if to == ServiceHealth::Unavailable && from != ServiceHealth::Unavailable {
            if self.fallback.engage_auto().await {
                self.broadcaster.publish(&ServiceEvent::FallbackChanged {
                    engaged: true,
                    manual: false,
                });
            }
            self.spawn_probe_loop();
        }

        self.publish_status().await;
    }

    /// Reset the breaker after a successful call
    pub async fn record_success(&self) {
        let from = {
            let mut state = self.state.lock().await;
            let from = state.health;
            state.consecutive_failures = 0;
            state.health = ServiceHealth::Healthy;
            state.last_health_check = Some(Utc::now());
            from
        };

        if from != ServiceHealth::Healthy {
            info!("Service recovered: {} -> {}", from, ServiceHealth::Healthy);
            self.broadcaster.publish(&ServiceEvent::HealthTransition {
                from,
                to: ServiceHealth::Healthy,
                at: Utc::now(),
            });
            if self.fallback.disengage_auto().await {
                self.broadcaster.publish(&ServiceEvent::FallbackChanged {
                    engaged: false,
                    manual: false,
                });
            }
            self.probe_generation.fetch_add(1, Ordering::SeqCst);
        }

        self.publish_status().await;
    }

    /// Actively probe the service once; success closes the circuit immediately
    pub async fn probe_now(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.run_probe().await
    }

    async fn run_probe(self: &Arc<Self>) -> Result<(), ServiceError> {
        let provider = self.provider.get();
        match provider.probe().await {
            Ok(()) => {
                info!("Service probe succeeded");
                self.record_success().await;
                Ok(())
            }
            Err(error) => {
                let error = ServiceError::from(error);
                if error.is_service_fault() {
                    self.record_failure(&error).await;
                } else {
                    debug!("Service probe rejected without affecting health: {}", error);
                }
                Err(error)
            }
        }
    }

    /// Background recovery loop: probe with exponential backoff until the
    /// service answers or the outage this loop belongs to is over.
    fn spawn_probe_loop(self: &Arc<Self>) {
        let generation = self.probe_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = monitor.config.probe_base_delay;
            loop {
                tokio::time::sleep(jittered(delay)).await;
                if monitor.probe_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if monitor.state.lock().await.health != ServiceHealth::Unavailable {
                    return;
                }
                debug!("Probing service after {:?} backoff", delay);
                if monitor.run_probe().await.is_ok() {
                    return;
                }
                delay = (delay * 2).min(monitor.config.probe_max_delay);
            }
        });
    }

    /// Compose and broadcast a full status snapshot
    pub async fn publish_status(&self) {
        let (health, consecutive_failures, last_health_check) = {
            let state = self.state.lock().await;
            (
                state.health,
                state.consecutive_failures,
                state.last_health_check,
            )
        };
        let fallback_engaged = self.fallback.is_engaged().await;

        let mut queue_status = BTreeMap::new();
        for (kind, stats) in self
            .pool_stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let snapshot = stats.lock().unwrap_or_else(PoisonError::into_inner).clone();
            queue_status.insert(*kind, snapshot);
        }

        let status = ServiceStatus {
            service_status: health,
            is_available: health != ServiceHealth::Unavailable && !fallback_engaged,
            is_fallback_mode: fallback_engaged,
            consecutive_failures,
            last_health_check,
            queue_status,
        };
        self.broadcaster
            .publish(&ServiceEvent::StatusChanged(status));
    }

    pub async fn health(&self) -> ServiceHealth {
        self.state.lock().await.health
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    /// Stop any background probe activity
    pub fn shutdown(&self) {
        self.probe_generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.9..=1.1);
    delay.mul_f64(factor)
}
