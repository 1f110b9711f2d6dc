use crate::config::ServiceConfig;
use crate::provider::{CompletionProvider, HttpCompletionProvider, SharedProvider};
use crate::service::broadcast::{StatusBroadcaster, SubscriberId};
use crate::service::fallback::{Engagement, FallbackController};
use crate::service::health::HealthMonitor;
use crate::service::rate_limiter::{RateLimitSnapshot, RateLimiter};
use crate::service::types::{
    ServiceError, ServiceEvent, ServiceHealth, ServiceStatus, TaskResponse,
};
use crate::task::{PoolKind, Task, TaskContext, TaskId, TaskKind, TaskPriority, WorkerPool};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A unit of work as the caller describes it, before it becomes a queued task
#[derive(Debug, Clone)]
pub struct AssistRequest {
    pub kind: TaskKind,
    pub prompt: String,
    pub context: TaskContext,
    pub priority: TaskPriority,
    pub deadline: Option<Duration>,
}

impl AssistRequest {
    pub fn new(kind: TaskKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            context: TaskContext::None,
            priority: TaskPriority::Normal,
            deadline: None,
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.prompt.trim().is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "prompt must not be empty".to_string(),
            });
        }
        self.context
            .validate()
            .map_err(|message| ServiceError::InvalidRequest { message })?;
        if let Some(deadline) = self.deadline
            && deadline.is_zero()
        {
            return Err(ServiceError::InvalidRequest {
                message: "deadline must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Partial runtime reconfiguration; absent fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub requests_per_minute: Option<u32>,
    pub max_concurrent_requests: Option<u32>,
    pub cooldown_period: Option<Duration>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// The one object callers talk to.
///
/// Owns the rate limiter, the three worker pools, the health monitor, the
/// fallback controller, and the status broadcaster, and wires them together
/// at construction. Every request passes the same gate sequence: validation,
/// fallback and availability checks, the pool-enabled check, then the rate
/// limiter; only a request that clears all gates becomes a queued task.
pub struct AssistantService {
    config: Mutex<ServiceConfig>,
    provider: SharedProvider,
    limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    fallback: Arc<FallbackController>,
    broadcaster: Arc<StatusBroadcaster>,
    pools: BTreeMap<PoolKind, Arc<WorkerPool>>,
}

impl AssistantService {
    /// Build the service against the HTTP provider described by the config
    pub async fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let provider = HttpCompletionProvider::new(config.provider.clone())?;
        Ok(Self::build(config, Arc::new(provider)).await)
    }

    /// Build the service around an injected provider implementation
    pub async fn with_provider(
        config: ServiceConfig,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self::build(config, provider).await
    }

    async fn build(config: ServiceConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        let broadcaster = Arc::new(StatusBroadcaster::new());
        let fallback = Arc::new(FallbackController::new());
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let shared = SharedProvider::new(provider);
        let health = HealthMonitor::new(
            config.health.clone(),
            Arc::clone(&fallback),
            Arc::clone(&broadcaster),
            shared.clone(),
        );

        let mut pools = BTreeMap::new();
        for kind in PoolKind::ALL {
            let pool = Arc::new(WorkerPool::new(
                kind,
                config.pools.for_kind(kind),
                Arc::clone(&limiter),
                shared.clone(),
                Arc::clone(&health),
            ));
            health.register_pool(kind, pool.stats_handle());
            pools.insert(kind, pool);
        }

        health.publish_status().await;
        info!("Assistant service ready with {} worker pools", pools.len());

        Self {
            config: Mutex::new(config),
            provider: shared,
            limiter,
            health,
            fallback,
            broadcaster,
            pools,
        }
    }

    /// Submit a request and wait for its outcome.
    ///
    /// Fails fast with a typed error when any admission gate rejects it;
    /// otherwise suspends until a worker in the routed pool has produced a
    /// response, a failure, a timeout, or a cancellation.
    pub async fn send_request(&self, request: AssistRequest) -> Result<TaskResponse, ServiceError> {
        request.validate()?;

        if self.fallback.is_engaged().await {
            return Err(ServiceError::ServiceUnavailable {
                reason: "fallback mode engaged".to_string(),
            });
        }
        if self.health.health().await == ServiceHealth::Unavailable {
            return Err(ServiceError::ServiceUnavailable {
                reason: "service marked unavailable".to_string(),
            });
        }

        let pool_kind = request.kind.pool();
        let pool = self
            .pools
            .get(&pool_kind)
            .ok_or_else(|| ServiceError::ServiceUnavailable {
                reason: format!("{} pool not running", pool_kind),
            })?;
        if !pool.is_enabled() {
            return Err(ServiceError::ServiceUnavailable {
                reason: format!("{} pool disabled", pool_kind),
            });
        }

        let permit = self.limiter.try_acquire().await?;

        let deadline = request.deadline.unwrap_or_else(|| pool.default_deadline());
        let task = Task::new(request.kind, request.prompt, deadline)
            .with_context(request.context)
            .with_priority(request.priority);
        let task_id = task.id;
        debug!("Request {} accepted for {} pool", task_id, pool_kind);

        let receiver = pool.submit(task, permit).await;
        let outcome = receiver.await.map_err(|_| ServiceError::Cancelled)?;
        let completion = outcome.result?;
        Ok(TaskResponse {
            task_id,
            content: completion.content,
            model: completion.model,
            usage: completion.usage,
            duration: outcome.duration,
        })
    }

    pub async fn generate_code(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::CodeGeneration, prompt).with_context(context))
            .await
    }

    pub async fn explain_pattern(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Explanation, prompt).with_context(context))
            .await
    }

    pub async fn generate_docs(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Documentation, prompt).with_context(context))
            .await
    }

    pub async fn generate_regex(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(
            AssistRequest::new(TaskKind::RegexGeneration, prompt).with_context(context),
        )
        .await
    }

    pub async fn optimize_pattern(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Optimization, prompt).with_context(context))
            .await
    }

    pub async fn review_code(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Review, prompt).with_context(context))
            .await
    }

    pub async fn debug_assist(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Debugging, prompt).with_context(context))
            .await
    }

    pub async fn suggest_architecture(
        &self,
        prompt: impl Into<String>,
        context: TaskContext,
    ) -> Result<TaskResponse, ServiceError> {
        self.send_request(AssistRequest::new(TaskKind::Architecture, prompt).with_context(context))
            .await
    }

    /// Last broadcast status snapshot; never touches the network
    pub fn get_status(&self) -> ServiceStatus {
        self.broadcaster.latest()
    }

    pub fn subscribe_status<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(callback)
    }

    pub fn unsubscribe_status(&self, id: SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    /// Force fallback mode on; stays on until explicitly disabled
    pub async fn enable_fallback_mode(&self) {
        let previous = self.fallback.engage_manual().await;
        if previous == Engagement::None {
            self.broadcaster.publish(&ServiceEvent::FallbackChanged {
                engaged: true,
                manual: true,
            });
        }
        self.health.publish_status().await;
    }

    /// Leave fallback mode, but only if the service actually answers a probe.
    /// On probe failure fallback stays engaged and the classified error is
    /// returned.
    pub async fn disable_fallback_mode(&self) -> Result<(), ServiceError> {
        match self.health.probe_now().await {
            Ok(()) => {
                if self.fallback.disengage().await {
                    self.broadcaster.publish(&ServiceEvent::FallbackChanged {
                        engaged: false,
                        manual: true,
                    });
                }
                self.health.publish_status().await;
                Ok(())
            }
            Err(error) => {
                warn!("Fallback mode stays engaged, probe failed: {}", error);
                Err(error)
            }
        }
    }

    /// Probe the service immediately instead of waiting for the backoff timer
    pub async fn retry_now(&self) -> Result<(), ServiceError> {
        self.health.probe_now().await
    }

    /// Cancel a task in whichever pool holds it
    pub async fn cancel(&self, task_id: TaskId) -> bool {
        for pool in self.pools.values() {
            if pool.cancel(task_id).await {
                return true;
            }
        }
        false
    }

    /// Apply a partial configuration change at runtime.
    ///
    /// Rate-limit fields retune the limiter in place. Provider fields
    /// rebuild the HTTP provider behind the shared handle; if the rebuild
    /// fails the previous provider and configuration stay in effect.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<(), ServiceError> {
        let mut config = self.config.lock().await;

        let rate_changed = update.requests_per_minute.is_some()
            || update.max_concurrent_requests.is_some()
            || update.cooldown_period.is_some();
        let provider_changed =
            update.model.is_some() || update.api_key.is_some() || update.base_url.is_some();

        if provider_changed {
            let mut provider_config = config.provider.clone();
            if let Some(model) = update.model {
                provider_config.model = model;
            }
            if let Some(api_key) = update.api_key {
                provider_config.api_key = Some(api_key);
            }
            if let Some(base_url) = update.base_url {
                provider_config.base_url = base_url;
            }
            let provider = HttpCompletionProvider::new(provider_config.clone())?;
            self.provider.replace(Arc::new(provider));
            info!("Provider reconfigured for model {}", provider_config.model);
            config.provider = provider_config;
        }

        if rate_changed {
            if let Some(value) = update.requests_per_minute {
                config.rate_limit.requests_per_minute = value;
            }
            if let Some(value) = update.max_concurrent_requests {
                config.rate_limit.max_concurrent_requests = value;
            }
            if let Some(value) = update.cooldown_period {
                config.rate_limit.cooldown_period = value;
            }
            self.limiter.update_config(config.rate_limit.clone()).await;
        }

        drop(config);
        self.health.publish_status().await;
        Ok(())
    }

    pub async fn set_pool_enabled(&self, kind: PoolKind, enabled: bool) {
        if let Some(pool) = self.pools.get(&kind) {
            pool.set_enabled(enabled);
        }
        self.health.publish_status().await;
    }

    pub async fn rate_limits(&self) -> RateLimitSnapshot {
        self.limiter.remaining().await
    }

    pub async fn fallback_engagement(&self) -> Engagement {
        self.fallback.engagement().await
    }

    pub async fn current_config(&self) -> ServiceConfig {
        self.config.lock().await.clone()
    }

    /// Stop probing and drain the pools; queued tasks are cancelled, running
    /// ones finish first.
    pub async fn shutdown(&self) {
        self.health.shutdown();
        for pool in self.pools.values() {
            pool.shutdown().await;
        }
        info!("Assistant service shut down");
    }
}
