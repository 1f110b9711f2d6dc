use crate::provider::types::TokenUsage;
use crate::task::types::{PoolKind, QueueStatus, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Coarse health classification of the remote completion service
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceHealth {
    Healthy,
    Degraded,
    Unavailable,
}

impl ServiceHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceHealth::Healthy => "healthy",
            ServiceHealth::Degraded => "degraded",
            ServiceHealth::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of the whole service, published on every change.
///
/// Written only by the health monitor; everything else treats it as read-only.
#[derive(Serialize, Clone, Debug)]
pub struct ServiceStatus {
    pub service_status: ServiceHealth,
    pub is_available: bool,
    pub is_fallback_mode: bool,
    pub consecutive_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    pub queue_status: BTreeMap<PoolKind, QueueStatus>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            service_status: ServiceHealth::Healthy,
            is_available: true,
            is_fallback_mode: false,
            consecutive_failures: 0,
            last_health_check: None,
            queue_status: BTreeMap::new(),
        }
    }
}

/// Events delivered to status subscribers
#[derive(Clone, Debug)]
pub enum ServiceEvent {
    /// A fresh status snapshot was composed
    StatusChanged(ServiceStatus),
    /// The health classification moved between states
    HealthTransition {
        from: ServiceHealth,
        to: ServiceHealth,
        at: DateTime<Utc>,
    },
    /// Fallback mode was engaged or disengaged; `manual` marks operator action
    FallbackChanged { engaged: bool, manual: bool },
}

/// Receipt for a granted rate-limiter slot
#[derive(Debug, Clone)]
pub struct RatePermit {
    pub permit_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// Successful result of a request, as returned by the service surface
#[derive(Debug, Clone)]
pub struct TaskResponse {
    pub task_id: TaskId,
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub duration: Duration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("Request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("API error: {message}")]
    Api { message: String, critical: bool },
    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },
    #[error("Request cancelled")]
    Cancelled,
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ServiceError {
    /// Whether this error is evidence of a service-side fault.
    ///
    /// Rate limiting, cancellation, and request validation say nothing about
    /// the remote service and must not move the health state machine.
    pub fn is_service_fault(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout { .. }
                | ServiceError::Network { .. }
                | ServiceError::Api { .. }
        )
    }

    /// Critical faults (bad credentials, malformed configuration) that make
    /// further attempts pointless until an operator intervenes
    pub fn is_critical(&self) -> bool {
        matches!(self, ServiceError::Api { critical: true, .. })
    }

    /// Stable machine-readable code for logs and diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::RateLimited { .. } => "RATE_LIMITED",
            ServiceError::Timeout { .. } => "TIMEOUT",
            ServiceError::Network { .. } => "NETWORK_ERROR",
            ServiceError::Api { .. } => "API_ERROR",
            ServiceError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            ServiceError::Cancelled => "CANCELLED",
            ServiceError::InvalidRequest { .. } => "INVALID_REQUEST",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub max_concurrent_requests: u32,
    pub cooldown_period: Duration,
    pub cooldown_after_denials: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub degraded_threshold: u32,
    pub unavailable_threshold: u32,
    pub probe_base_delay: Duration,
    pub probe_max_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub workers: usize,
    pub default_deadline: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            max_concurrent_requests: 10,
            cooldown_period: Duration::from_secs(10),
            cooldown_after_denials: 3,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: 2,
            unavailable_threshold: 3,
            probe_base_delay: Duration::from_secs(10),
            probe_max_delay: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            default_deadline: Duration::from_secs(30),
        }
    }
}
