//! # Aegis
//!
//! A client-side resilience layer for applications that call a remote,
//! rate-limited AI completion service. Aegis mediates every request through
//! a bounded set of worker pools, enforces a request-rate budget, watches
//! the service's health, and transparently degrades the application into an
//! offline fallback mode so callers never implement retry or
//! circuit-breaking logic themselves.
//!
//! ## Architecture Overview
//!
//! The system consists of several key components organized into modules:
//!
//! - **[`service`]**: The facade, rate limiter, health monitor, fallback
//!   controller, and status broadcaster
//! - **[`task`]**: Task model, priority queues, and the worker pools
//! - **[`provider`]**: The outbound completion-provider abstraction and its
//!   HTTP and mock implementations
//! - **[`config`]**: TOML configuration with a discovery hierarchy
//!
//! ## Features
//!
//! ### 🛡️ Resilience
//! - **Rate Limiting**: Rolling-window request budget with concurrency slots
//!   and a cooldown after repeated denials
//! - **Circuit Breaker**: Healthy → Degraded → Unavailable transitions on
//!   consecutive service faults, with critical-error bypass
//! - **Automatic Recovery**: Exponential-backoff probing with jitter while
//!   the service is down; one successful call restores full operation
//! - **Fallback Mode**: Automatic or operator-forced degradation that fails
//!   new requests fast instead of queueing them against a dead service
//!
//! ### ⚙️ Request Handling
//! - **Worker Pools**: Independent bounded pools per task category with
//!   priority dispatch and FIFO fairness within a priority tier
//! - **Cancellation**: Queued tasks reject immediately; executing tasks
//!   finish cooperatively while the caller observes a cancellation
//! - **Deadlines**: Every execution runs under a per-task timeout
//!
//! ### 📡 Observability
//! - **Status Broadcasting**: Panic-isolated subscriber fan-out of status
//!   snapshots, health transitions, and fallback changes
//! - **Pure Status Reads**: `get_status()` never touches the network
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aegis::{AssistRequest, AssistantService, ServiceConfig, TaskKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::default();
//!     let service = AssistantService::new(config).await?;
//!
//!     let response = service
//!         .send_request(AssistRequest::new(
//!             TaskKind::CodeGeneration,
//!             "Write a function that reverses a linked list",
//!         ))
//!         .await?;
//!
//!     println!("{}", response.content);
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Resilience core: facade, rate limiter, health monitor, fallback, events.
///
/// Everything a caller interacts with lives here; the other modules supply
/// the task plumbing and the outbound provider behind it.
pub mod service;

/// Task model and worker pools.
///
/// Defines the task vocabulary (kinds, priorities, typed context), the
/// priority queue, and the bounded worker pools that execute tasks against
/// the provider.
pub mod task;

/// Outbound completion-provider abstraction.
///
/// The `CompletionProvider` trait plus the HTTP implementation used in
/// production and the scripted mock used in tests.
pub mod provider;

/// TOML configuration, persistence, and the discovery hierarchy.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes the file and directory names used by configuration
/// discovery for easier maintenance and consistency.
pub mod env;

// Re-export the facade surface
pub use service::{
    AssistRequest, AssistantService, ConfigUpdate, Engagement, HealthConfig, LoggingSubscriber,
    PoolConfig, RateLimitConfig, RateLimitSnapshot, ServiceError, ServiceEvent, ServiceHealth,
    ServiceStatus, SubscriberId, TaskResponse,
};

// Re-export the task vocabulary
pub use task::{
    PoolKind, QueueStatus, Task, TaskContext, TaskId, TaskKind, TaskOutcome, TaskPriority,
};

// Re-export provider types
pub use provider::{
    CompletionProvider, CompletionRequest, CompletionResponse, HttpCompletionProvider,
    MockCompletionProvider, ProviderConfig, ProviderError, TokenUsage,
};

// Re-export configuration types
pub use config::{ConfigDiscovery, PoolsConfig, ServiceConfig};

// CLI module for command-line interface
pub mod cli;
