use crate::provider::{CompletionRequest, SharedProvider};
use crate::service::health::HealthMonitor;
use crate::service::rate_limiter::RateLimiter;
use crate::service::types::{PoolConfig, RatePermit, ServiceError};
use crate::task::queue::{PendingEntry, PendingQueue};
use crate::task::types::{PoolKind, QueueStatus, Task, TaskId, TaskOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct PoolState {
    pending: PendingQueue,
    executing: HashMap<TaskId, Arc<AtomicBool>>,
}

struct PoolInner {
    kind: PoolKind,
    state: Mutex<PoolState>,
    notify: Notify,
    stats: Arc<StdMutex<QueueStatus>>,
    limiter: Arc<RateLimiter>,
    provider: SharedProvider,
    health: Arc<HealthMonitor>,
    shutdown: AtomicBool,
    enabled: AtomicBool,
}

/// Fixed-size worker pool for one task category.
///
/// Tasks enter through [`WorkerPool::submit`] carrying the rate permit the
/// caller already acquired; the pool owns the permit from then on and
/// releases it exactly once, whatever way the task leaves the pool.
pub struct WorkerPool {
    kind: PoolKind,
    default_deadline: Duration,
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        kind: PoolKind,
        config: &PoolConfig,
        limiter: Arc<RateLimiter>,
        provider: SharedProvider,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            kind,
            state: Mutex::new(PoolState {
                pending: PendingQueue::new(),
                executing: HashMap::new(),
            }),
            notify: Notify::new(),
            stats: Arc::new(StdMutex::new(QueueStatus::default())),
            limiter,
            provider,
            health,
            shutdown: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        });

        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let inner = Arc::clone(&inner);
            workers.push(tokio::spawn(PoolInner::worker_loop(inner, index)));
        }
        debug!("{} pool started with {} workers", kind, worker_count);

        Self {
            kind,
            default_deadline: config.default_deadline,
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a task for execution. The receiver resolves with the outcome
    /// once a worker has finished, cancelled, or timed the task out.
    pub async fn submit(&self, task: Task, permit: RatePermit) -> oneshot::Receiver<TaskOutcome> {
        let (responder, receiver) = oneshot::channel();
        let task_id = task.id;

        // The flag is checked under the state lock: a concurrent shutdown
        // either drains this entry or this check observes the flag.
        let verdict = {
            let mut state = self.inner.state.lock().await;
            if self.inner.shutdown.load(Ordering::SeqCst) {
                Err(responder)
            } else {
                state.pending.push(PendingEntry {
                    task,
                    permit,
                    responder,
                    enqueued_at: Instant::now(),
                });
                let pending_len = state.pending.len();
                self.inner.update_stats(|stats| stats.pending = pending_len);
                Ok(())
            }
        };

        match verdict {
            Ok(()) => {
                debug!("Task {} queued on {} pool", task_id, self.kind);
                self.inner.notify.notify_one();
            }
            Err(responder) => {
                self.inner.limiter.release().await;
                let _ = responder.send(TaskOutcome {
                    task_id,
                    result: Err(ServiceError::Cancelled),
                    duration: Duration::ZERO,
                });
            }
        }
        receiver
    }

    /// Cancel a task by id.
    ///
    /// A queued task is removed and its caller answered immediately; an
    /// executing task is flagged and its result discarded when the in-flight
    /// call returns. Returns false when the task is unknown to this pool.
    pub async fn cancel(&self, task_id: TaskId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock().await;
            if let Some(entry) = state.pending.remove(task_id) {
                let pending_len = state.pending.len();
                self.inner.update_stats(|stats| {
                    stats.pending = pending_len;
                    stats.failed += 1;
                });
                Some(entry)
            } else if let Some(flag) = state.executing.get(&task_id) {
                flag.store(true, Ordering::SeqCst);
                info!("Task {} flagged for cancellation mid-execution", task_id);
                return true;
            } else {
                None
            }
        };

        match removed {
            Some(entry) => {
                self.inner.limiter.release().await;
                let _ = entry.responder.send(TaskOutcome {
                    task_id,
                    result: Err(ServiceError::Cancelled),
                    duration: Duration::ZERO,
                });
                info!("Task {} cancelled while queued", task_id);
                true
            }
            None => false,
        }
    }

    /// Stop accepting work, cancel everything still queued, and join the
    /// workers once their in-flight tasks are done.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);

        let drained = {
            let mut state = self.inner.state.lock().await;
            let drained = state.pending.drain();
            let drained_count = drained.len() as u64;
            self.inner.update_stats(|stats| {
                stats.pending = 0;
                stats.failed += drained_count;
            });
            drained
        };
        if !drained.is_empty() {
            info!(
                "{} pool dropping {} queued tasks on shutdown",
                self.kind,
                drained.len()
            );
        }
        for entry in drained {
            self.inner.limiter.release().await;
            let _ = entry.responder.send(TaskOutcome {
                task_id: entry.task.id,
                result: Err(ServiceError::Cancelled),
                duration: Duration::ZERO,
            });
        }

        self.inner.notify.notify_waiters();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        debug!("{} pool shut down", self.kind);
    }

    pub fn stats(&self) -> QueueStatus {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared statistics cell, for registration with the health monitor
    pub fn stats_handle(&self) -> Arc<StdMutex<QueueStatus>> {
        Arc::clone(&self.inner.stats)
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(
                "{} pool {}",
                self.kind,
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
}

impl PoolInner {
    async fn worker_loop(inner: Arc<PoolInner>, index: usize) {
        debug!("{} pool worker {} running", inner.kind, index);
        loop {
            // Arm the wakeup before checking state so a notification sent
            // between the check and the await is not lost.
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if inner.shutdown.load(Ordering::SeqCst) {
                debug!("{} pool worker {} stopping", inner.kind, index);
                return;
            }

            let next = {
                let mut state = inner.state.lock().await;
                match state.pending.pop_next() {
                    Some(entry) => {
                        let cancel = Arc::new(AtomicBool::new(false));
                        state.executing.insert(entry.task.id, Arc::clone(&cancel));
                        let pending_len = state.pending.len();
                        inner.update_stats(|stats| {
                            stats.pending = pending_len;
                            stats.processing += 1;
                        });
                        Some((entry, cancel))
                    }
                    None => None,
                }
            };

            match next {
                Some((entry, cancel)) => inner.execute(entry, cancel).await,
                None => notified.await,
            }
        }
    }

    async fn execute(self: &Arc<Self>, entry: PendingEntry, cancel: Arc<AtomicBool>) {
        let PendingEntry {
            task,
            permit: _permit,
            responder,
            enqueued_at,
        } = entry;
        let task_id = task.id;
        let started = Instant::now();
        debug!(
            "Task {} dispatched on {} pool after {:?} in queue",
            task_id,
            self.kind,
            enqueued_at.elapsed()
        );

        self.update_stats(|stats| stats.active_requests += 1);

        let request = build_request(&task);
        let provider = self.provider.get();
        let result = match tokio::time::timeout(task.deadline, provider.complete(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(ServiceError::from(error)),
            Err(_) => Err(ServiceError::Timeout {
                elapsed: task.deadline,
            }),
        };

        self.update_stats(|stats| {
            stats.active_requests = stats.active_requests.saturating_sub(1)
        });

        let cancelled = {
            let mut state = self.state.lock().await;
            state.executing.remove(&task_id);
            let cancelled = cancel.load(Ordering::SeqCst);
            self.update_stats(|stats| {
                stats.processing = stats.processing.saturating_sub(1);
                if cancelled || result.is_err() {
                    stats.failed += 1;
                } else {
                    stats.completed += 1;
                }
            });
            cancelled
        };

        self.limiter.release().await;

        let outcome = if cancelled {
            debug!("Task {} was cancelled mid-execution; result discarded", task_id);
            TaskOutcome {
                task_id,
                result: Err(ServiceError::Cancelled),
                duration: started.elapsed(),
            }
        } else {
            let outcome = TaskOutcome {
                task_id,
                result,
                duration: started.elapsed(),
            };
            self.health.record_outcome(&outcome).await;
            outcome
        };

        if responder.send(outcome).is_err() {
            debug!("Task {} finished but the caller went away", task_id);
        }
    }

    fn update_stats(&self, apply: impl FnOnce(&mut QueueStatus)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut stats);
    }
}

fn build_request(task: &Task) -> CompletionRequest {
    let mut context = task.context.to_wire();
    context.insert("task".to_string(), task.kind.label().to_string());
    CompletionRequest {
        id: task.id,
        prompt: task.prompt.clone(),
        system: None,
        context,
        max_tokens: None,
        temperature: None,
    }
}
