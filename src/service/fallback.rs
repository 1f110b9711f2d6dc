use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How fallback mode was entered, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    /// Normal operation, requests flow to the remote service
    None,
    /// Engaged by the health monitor after the service became unavailable
    Auto,
    /// Engaged explicitly by the operator
    Manual,
}

/// Tracks whether the service is running in local fallback mode.
///
/// Automatic engagement never overrides a manual one: an operator who
/// forced fallback on keeps it on until they turn it off themselves.
#[derive(Clone)]
pub struct FallbackController {
    state: Arc<Mutex<Engagement>>,
}

impl FallbackController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Engagement::None)),
        }
    }

    /// Engage fallback by operator request; returns the previous engagement
    pub async fn engage_manual(&self) -> Engagement {
        let mut state = self.state.lock().await;
        let previous = *state;
        *state = Engagement::Manual;
        if previous != Engagement::Manual {
            info!("Fallback mode engaged manually");
        }
        previous
    }

    /// Engage fallback automatically; returns true if this call engaged it.
    /// Does nothing when fallback is already engaged in either mode.
    pub async fn engage_auto(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == Engagement::None {
            *state = Engagement::Auto;
            info!("Fallback mode engaged automatically");
            true
        } else {
            false
        }
    }

    /// Clear any engagement; returns true if fallback had been engaged
    pub async fn disengage(&self) -> bool {
        let mut state = self.state.lock().await;
        let was_engaged = *state != Engagement::None;
        *state = Engagement::None;
        if was_engaged {
            info!("Fallback mode disengaged");
        }
        was_engaged
    }

    /// Clear an automatic engagement only; manual engagement is left intact
    pub async fn disengage_auto(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == Engagement::Auto {
            *state = Engagement::None;
            info!("Automatic fallback disengaged after recovery");
            true
        } else {
            if *state == Engagement::Manual {
                debug!("Service recovered but manual fallback stays engaged");
            }
            false
        }
    }

    pub async fn engagement(&self) -> Engagement {
        *self.state.lock().await
    }

    pub async fn is_engaged(&self) -> bool {
        *self.state.lock().await != Engagement::None
    }
}

impl Default for FallbackController {
    fn default() -> Self {
        Self::new()
    }
}
