use crate::service::types::{ServiceEvent, ServiceStatus};
use dashmap::DashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Token identifying a registered status subscriber
pub type SubscriberId = Uuid;

type Callback = dyn Fn(&ServiceEvent) + Send + Sync;

/// Synchronous fan-out of service events to registered subscribers.
///
/// Delivery works on a snapshot of the registry: subscribers added while a
/// publish is running do not receive that event, and removed ones may still
/// receive one final event. A panicking subscriber is isolated and logged;
/// the remaining subscribers are still notified.
pub struct StatusBroadcaster {
    subscribers: DashMap<SubscriberId, Arc<Callback>>,
    latest: RwLock<ServiceStatus>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            latest: RwLock::new(ServiceStatus::default()),
        }
    }

    /// Register a callback; the returned token controls its lifetime
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Arc::new(callback));
        debug!("Status subscriber {} registered", id);
        id
    }

    /// Remove a subscriber; returns whether the token was known
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!("Status subscriber {} removed", id);
        }
        removed
    }

    /// Deliver an event to every currently registered subscriber
    pub fn publish(&self, event: &ServiceEvent) {
        if let ServiceEvent::StatusChanged(status) = event {
            *self
                .latest
                .write()
                .unwrap_or_else(PoisonError::into_inner) = status.clone();
        }

        let targets: Vec<(SubscriberId, Arc<Callback>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (id, callback) in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("Status subscriber {} panicked during delivery", id);
            }
        }
    }

    /// Last published status snapshot
    pub fn latest(&self) -> ServiceStatus {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Ready-made subscriber that mirrors service events into the log stream
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    pub fn register(broadcaster: &StatusBroadcaster) -> SubscriberId {
        broadcaster.subscribe(|event| match event {
            ServiceEvent::StatusChanged(status) => {
                debug!(
                    "Service status: {} (available: {}, fallback: {}, failures: {})",
                    status.service_status,
                    status.is_available,
                    status.is_fallback_mode,
                    status.consecutive_failures
                );
            }
            ServiceEvent::HealthTransition { from, to, at } => {
                info!("Service health changed {} -> {} at {}", from, to, at);
            }
            ServiceEvent::FallbackChanged { engaged, manual } => {
                info!(
                    "Fallback mode {} ({})",
                    if *engaged { "engaged" } else { "disengaged" },
                    if *manual { "manual" } else { "automatic" }
                );
            }
        })
    }
}
