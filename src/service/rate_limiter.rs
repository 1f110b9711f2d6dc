use crate::service::types::{RateLimitConfig, RatePermit, ServiceError};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

const WINDOW: Duration = Duration::from_secs(60);

// Retry hint when the window has room but every concurrency slot is busy;
// slot release times are not knowable in advance.
const CONCURRENCY_RETRY_HINT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<RateLimiterState>>,
}

#[derive(Debug)]
struct RateLimiterState {
    config: RateLimitConfig,
    window: VecDeque<Instant>,
    in_flight: u32,
    consecutive_denials: u32,
    cooldown_until: Option<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let state = RateLimiterState {
            config,
            window: VecDeque::new(),
            in_flight: 0,
            consecutive_denials: 0,
            cooldown_until: None,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Try to claim a request slot.
    ///
    /// A grant consumes one entry of the rolling window budget and one
    /// concurrency slot; the slot must be given back with [`release`]
    /// once the request reaches a terminal state.
    ///
    /// [`release`]: RateLimiter::release
    pub async fn try_acquire(&self) -> Result<RatePermit, ServiceError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        state.prune_window(now);

        if let Some(until) = state.cooldown_until {
            if now < until {
                let retry_after = until - now;
                debug!("Request denied, cooling down for {:?}", retry_after);
                return Err(ServiceError::RateLimited { retry_after });
            }
            state.cooldown_until = None;
        }

        if state.window.len() >= state.config.requests_per_minute as usize {
            // Budget frees up when the oldest grant leaves the window
            let retry_after = state
                .window
                .front()
                .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                .unwrap_or(WINDOW);
            return Err(state.deny(now, retry_after));
        }

        if state.in_flight >= state.config.max_concurrent_requests {
            return Err(state.deny(now, CONCURRENCY_RETRY_HINT));
        }

        state.window.push_back(now);
        state.in_flight += 1;
        state.consecutive_denials = 0;

        Ok(RatePermit {
            permit_id: Uuid::new_v4(),
            granted_at: Utc::now(),
        })
    }

    /// Give back the concurrency slot of a finished request
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Swap in new limits; the grant history is preserved
    pub async fn update_config(&self, config: RateLimitConfig) {
        let mut state = self.state.lock().await;
        debug!(
            "Rate limits updated: {} req/min, {} concurrent",
            config.requests_per_minute, config.max_concurrent_requests
        );
        state.config = config;
    }

    pub async fn config(&self) -> RateLimitConfig {
        let state = self.state.lock().await;
        state.config.clone()
    }

    /// Current window occupancy, without acquiring anything
    pub async fn remaining(&self) -> RateLimitSnapshot {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune_window(now);

        let remaining = (state.config.requests_per_minute as usize)
            .saturating_sub(state.window.len()) as u32;
        let reset_at = state
            .window
            .front()
            .map(|oldest| Utc::now() + (*oldest + WINDOW).saturating_duration_since(now));
        let cooldown_until = state
            .cooldown_until
            .filter(|until| *until > now)
            .map(|until| Utc::now() + (until - now));

        RateLimitSnapshot {
            remaining,
            in_flight: state.in_flight,
            reset_at,
            cooldown_until,
        }
    }
}

impl RateLimiterState {
    fn prune_window(&mut self, now: Instant) {
        while let Some(oldest) = self.window.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn deny(&mut self, now: Instant, retry_after: Duration) -> ServiceError {
        self.consecutive_denials += 1;
        if self.consecutive_denials >= self.config.cooldown_after_denials {
            warn!(
                "{} consecutive denials, imposing {:?} cooldown",
                self.consecutive_denials, self.config.cooldown_period
            );
            self.cooldown_until = Some(now + self.config.cooldown_period);
            self.consecutive_denials = 0;
            return ServiceError::RateLimited {
                retry_after: self.config.cooldown_period,
            };
        }
        debug!(
            "Request denied, retry in {:?} ({} consecutive denials)",
            retry_after, self.consecutive_denials
        );
        ServiceError::RateLimited { retry_after }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub in_flight: u32,
    pub reset_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}
