pub mod types;
pub mod rate_limiter;
pub mod health;
pub mod fallback;
pub mod broadcast;
pub mod facade;

#[cfg(test)]
mod tests;

pub use types::*;
pub use rate_limiter::{RateLimitSnapshot, RateLimiter};
pub use health::HealthMonitor;
pub use fallback::{Engagement, FallbackController};
pub use broadcast::{LoggingSubscriber, StatusBroadcaster, SubscriberId};
pub use facade::{AssistRequest, AssistantService, ConfigUpdate};
