use super::*;
use crate::provider::{MockCompletionProvider, ProviderError, SharedProvider};
use crate::task::{PoolKind, QueueStatus};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use rand::Rng;

fn strict_limits(requests_per_minute: u32, max_concurrent: u32) -> RateLimitConfig {
    RateLimitConfig {
        requests_per_minute,
        max_concurrent_requests: max_concurrent,
        cooldown_period: Duration::from_secs(10),
        cooldown_after_denials: 3,
    }
}

fn network_error() -> ServiceError {
    ServiceError::Network {
        message: "connection refused".to_string(),
    }
}

fn monitor_with_mock(
    config: HealthConfig,
    mock: Arc<MockCompletionProvider>,
) -> (
    Arc<HealthMonitor>,
    Arc<FallbackController>,
    Arc<StatusBroadcaster>,
) {
    let fallback = Arc::new(FallbackController::new());
    let broadcaster = Arc::new(StatusBroadcaster::new());
    let provider = SharedProvider::new(mock);
    let monitor = HealthMonitor::new(
        config,
        Arc::clone(&fallback),
        Arc::clone(&broadcaster),
        provider,
    );
    (monitor, fallback, broadcaster)
}

#[tokio::test]
async fn test_limiter_grants_within_budget() {
    let limiter = RateLimiter::new(strict_limits(3, 10));

    for _ in 0..3 {
        assert!(limiter.try_acquire().await.is_ok());
    }

    let denied = limiter.try_acquire().await;
    assert!(matches!(
        denied,
        Err(ServiceError::RateLimited { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_limiter_window_rolls_over() {
    let limiter = RateLimiter::new(strict_limits(2, 10));

    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_err());

    tokio::time::advance(Duration::from_secs(61)).await;

    assert!(limiter.try_acquire().await.is_ok());
}

#[tokio::test]
async fn test_limiter_concurrency_slots() {
    let limiter = RateLimiter::new(strict_limits(100, 2));

    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_ok());

    let denied = limiter.try_acquire().await;
    match denied {
        Err(ServiceError::RateLimited { retry_after }) => {
            assert!(retry_after <= Duration::from_secs(1));
        }
        other => panic!("Expected rate-limit denial, got {:?}", other),
    }

    limiter.release().await;
    assert!(limiter.try_acquire().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_limiter_cooldown_after_repeated_denials() {
    let limiter = RateLimiter::new(strict_limits(1, 10));

    assert!(limiter.try_acquire().await.is_ok());

    // Two plain denials, the third imposes the cooldown
    assert!(limiter.try_acquire().await.is_err());
    assert!(limiter.try_acquire().await.is_err());
    match limiter.try_acquire().await {
        Err(ServiceError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(10));
        }
        other => panic!("Expected cooldown denial, got {:?}", other),
    }

    // Still inside the cooldown window
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(limiter.try_acquire().await.is_err());

    // Past the cooldown and past the rolling window
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(limiter.try_acquire().await.is_ok());
}

#[tokio::test]
async fn test_limiter_denial_reports_retry_after() {
    let limiter = RateLimiter::new(strict_limits(1, 10));
    assert!(limiter.try_acquire().await.is_ok());

    match limiter.try_acquire().await {
        Err(ServiceError::RateLimited { retry_after }) => {
            assert!(retry_after > Duration::ZERO);
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("Expected denial, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_limiter_never_exceeds_window_budget() {
    let budget = 10;
    let config = RateLimitConfig {
        requests_per_minute: budget,
        max_concurrent_requests: 1000,
        cooldown_period: Duration::from_secs(10),
        cooldown_after_denials: 10_000,
    };
    let limiter = RateLimiter::new(config);

    let mut grants: Vec<tokio::time::Instant> = Vec::new();
    for _ in 0..300 {
        let step = rand::rng().random_range(0..8_000);
        tokio::time::advance(Duration::from_millis(step)).await;

        if limiter.try_acquire().await.is_ok() {
            grants.push(tokio::time::Instant::now());
            limiter.release().await;
        }

        let now = tokio::time::Instant::now();
        let in_window = grants
            .iter()
            .filter(|granted| now.duration_since(**granted) < Duration::from_secs(60))
            .count();
        assert!(
            in_window <= budget as usize,
            "{} grants inside one rolling minute",
            in_window
        );
    }

    assert!(!grants.is_empty());
}

#[tokio::test]
async fn test_limiter_update_config_preserves_window() {
    let limiter = RateLimiter::new(strict_limits(2, 10));

    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_err());

    limiter.update_config(strict_limits(3, 10)).await;

    // One more slot opened up, the two old grants still count
    assert!(limiter.try_acquire().await.is_ok());
    assert!(limiter.try_acquire().await.is_err());
}

#[tokio::test]
async fn test_limiter_remaining_snapshot() {
    let limiter = RateLimiter::new(strict_limits(5, 10));

    let before = limiter.remaining().await;
    assert_eq!(before.remaining, 5);
    assert_eq!(before.in_flight, 0);
    assert!(before.reset_at.is_none());

    limiter.try_acquire().await.unwrap();

    let after = limiter.remaining().await;
    assert_eq!(after.remaining, 4);
    assert_eq!(after.in_flight, 1);
    assert!(after.reset_at.is_some());
}

#[tokio::test]
async fn test_broadcaster_subscribe_publish_unsubscribe() {
    let broadcaster = StatusBroadcaster::new();
    let seen = Arc::new(AtomicUsize::new(0));

    let seen_clone = Arc::clone(&seen);
    let id = broadcaster.subscribe(move |_event| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(broadcaster.unsubscribe(id));
    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(!broadcaster.unsubscribe(id));
}

#[tokio::test]
async fn test_broadcaster_snapshot_excludes_subscriber_added_mid_publish() {
    let broadcaster = Arc::new(StatusBroadcaster::new());
    let late_count = Arc::new(AtomicUsize::new(0));
    let registered = Arc::new(AtomicBool::new(false));

    let broadcaster_clone = Arc::clone(&broadcaster);
    let late_count_clone = Arc::clone(&late_count);
    let registered_clone = Arc::clone(&registered);
    broadcaster.subscribe(move |_event| {
        if !registered_clone.swap(true, Ordering::SeqCst) {
            let late_count_inner = Arc::clone(&late_count_clone);
            broadcaster_clone.subscribe(move |_event| {
                late_count_inner.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    // The subscriber registered during this publish must not receive it
    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));
    assert_eq!(late_count.load(Ordering::SeqCst), 0);

    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));
    assert_eq!(late_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_broadcaster_isolates_panicking_subscriber() {
    let broadcaster = StatusBroadcaster::new();
    let healthy_calls = Arc::new(AtomicUsize::new(0));

    broadcaster.subscribe(|_event| {
        panic!("subscriber blew up");
    });
    let healthy_clone = Arc::clone(&healthy_calls);
    broadcaster.subscribe(move |_event| {
        healthy_clone.fetch_add(1, Ordering::SeqCst);
    });

    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));

    assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    assert_eq!(broadcaster.subscriber_count(), 2);
}

#[tokio::test]
async fn test_broadcaster_latest_tracks_status_changed_only() {
    let broadcaster = StatusBroadcaster::new();

    let mut degraded = ServiceStatus::default();
    degraded.service_status = ServiceHealth::Degraded;
    degraded.consecutive_failures = 2;
    broadcaster.publish(&ServiceEvent::StatusChanged(degraded));

    broadcaster.publish(&ServiceEvent::HealthTransition {
        from: ServiceHealth::Degraded,
        to: ServiceHealth::Unavailable,
        at: chrono::Utc::now(),
    });

    let latest = broadcaster.latest();
    assert_eq!(latest.service_status, ServiceHealth::Degraded);
    assert_eq!(latest.consecutive_failures, 2);
}

#[tokio::test]
async fn test_logging_subscriber_registers_and_survives_events() {
    let broadcaster = StatusBroadcaster::new();
    let id = LoggingSubscriber::register(&broadcaster);
    assert_eq!(broadcaster.subscriber_count(), 1);

    broadcaster.publish(&ServiceEvent::StatusChanged(ServiceStatus::default()));
    broadcaster.publish(&ServiceEvent::FallbackChanged {
        engaged: true,
        manual: false,
    });

    assert!(broadcaster.unsubscribe(id));
}

#[tokio::test]
async fn test_fallback_auto_engages_only_from_none() {
    let fallback = FallbackController::new();

    assert!(fallback.engage_auto().await);
    assert!(!fallback.engage_auto().await);
    assert_eq!(fallback.engagement().await, Engagement::Auto);
}

#[tokio::test]
async fn test_fallback_manual_wins_over_auto() {
    let fallback = FallbackController::new();

    fallback.engage_manual().await;
    assert!(!fallback.engage_auto().await);

    // Recovery clears automatic engagement only
    assert!(!fallback.disengage_auto().await);
    assert_eq!(fallback.engagement().await, Engagement::Manual);

    assert!(fallback.disengage().await);
    assert_eq!(fallback.engagement().await, Engagement::None);
}

#[tokio::test]
async fn test_fallback_disengage_auto_clears_auto() {
    let fallback = FallbackController::new();

    fallback.engage_auto().await;
    assert!(fallback.disengage_auto().await);
    assert!(!fallback.is_engaged().await);
}

#[tokio::test]
async fn test_health_cascade_degraded_then_unavailable() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    monitor.record_failure(&network_error()).await;
    assert_eq!(monitor.health().await, ServiceHealth::Healthy);

    monitor.record_failure(&network_error()).await;
    assert_eq!(monitor.health().await, ServiceHealth::Degraded);

    monitor.record_failure(&network_error()).await;
    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);
    assert_eq!(fallback.engagement().await, Engagement::Auto);
}

#[tokio::test]
async fn test_health_fallback_engaged_exactly_once() {
    let mock = Arc::new(MockCompletionProvider::new());
    mock.set_default_failure(Some(ProviderError::Network("down".to_string())));
    let (monitor, _fallback, broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    let engagements = Arc::new(AtomicUsize::new(0));
    let engagements_clone = Arc::clone(&engagements);
    broadcaster.subscribe(move |event| {
        if let ServiceEvent::FallbackChanged { engaged: true, .. } = event {
            engagements_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    for _ in 0..5 {
        monitor.record_failure(&network_error()).await;
    }

    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);
    assert_eq!(engagements.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_success_resets_failures() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    monitor.record_failure(&network_error()).await;
    monitor.record_failure(&network_error()).await;
    assert_eq!(monitor.health().await, ServiceHealth::Degraded);
    assert_eq!(monitor.consecutive_failures().await, 2);

    monitor.record_success().await;

    assert_eq!(monitor.health().await, ServiceHealth::Healthy);
    assert_eq!(monitor.consecutive_failures().await, 0);
    assert!(!fallback.is_engaged().await);
}

#[tokio::test]
async fn test_health_critical_error_opens_circuit_in_one_step() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    let critical = ServiceError::Api {
        message: "authentication rejected".to_string(),
        critical: true,
    };
    monitor.record_failure(&critical).await;

    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);
    assert!(fallback.is_engaged().await);
}

#[tokio::test]
async fn test_health_ignores_rate_limits_and_cancellations() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, _fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    let rate_limited = crate::task::TaskOutcome {
        task_id: uuid::Uuid::new_v4(),
        result: Err(ServiceError::RateLimited {
            retry_after: Duration::from_secs(30),
        }),
        duration: Duration::ZERO,
    };
    monitor.record_outcome(&rate_limited).await;

    let cancelled = crate::task::TaskOutcome {
        task_id: uuid::Uuid::new_v4(),
        result: Err(ServiceError::Cancelled),
        duration: Duration::ZERO,
    };
    monitor.record_outcome(&cancelled).await;

    assert_eq!(monitor.health().await, ServiceHealth::Healthy);
    assert_eq!(monitor.consecutive_failures().await, 0);
}

#[tokio::test]
async fn test_health_probe_now_recovers() {
    let mock = Arc::new(MockCompletionProvider::new());
    mock.enqueue_probe(Ok(()));
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    for _ in 0..3 {
        monitor.record_failure(&network_error()).await;
    }
    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);
    assert!(fallback.is_engaged().await);

    monitor.probe_now().await.unwrap();

    assert_eq!(monitor.health().await, ServiceHealth::Healthy);
    assert!(!fallback.is_engaged().await);
}

#[tokio::test]
async fn test_health_failed_probe_keeps_circuit_open() {
    let mock = Arc::new(MockCompletionProvider::new());
    mock.set_default_failure(Some(ProviderError::Network("still down".to_string())));
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    for _ in 0..3 {
        monitor.record_failure(&network_error()).await;
    }

    assert!(monitor.probe_now().await.is_err());
    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);
    assert!(fallback.is_engaged().await);
}

#[tokio::test(start_paused = true)]
async fn test_health_probe_loop_recovers_after_backoff() {
    let mock = Arc::new(MockCompletionProvider::new());
    // First two scheduled probes fail, the third brings the service back
    mock.enqueue_probe(Err(ProviderError::Network("down".to_string())));
    mock.enqueue_probe(Err(ProviderError::Network("down".to_string())));
    mock.enqueue_probe(Ok(()));
    let (monitor, fallback, _broadcaster) =
        monitor_with_mock(HealthConfig::default(), Arc::clone(&mock));

    for _ in 0..3 {
        monitor.record_failure(&network_error()).await;
    }
    assert_eq!(monitor.health().await, ServiceHealth::Unavailable);

    // The paused clock fast-forwards through the backoff sleeps
    tokio::time::timeout(Duration::from_secs(3600), async {
        while monitor.health().await != ServiceHealth::Healthy {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("probe loop never recovered");

    assert!(mock.probe_count() >= 3);
    assert!(!fallback.is_engaged().await);
}

#[tokio::test]
async fn test_health_manual_fallback_survives_recovery() {
    let mock = Arc::new(MockCompletionProvider::new());
    mock.enqueue_probe(Ok(()));
    let (monitor, fallback, _broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    fallback.engage_manual().await;
    for _ in 0..3 {
        monitor.record_failure(&network_error()).await;
    }

    monitor.probe_now().await.unwrap();

    assert_eq!(monitor.health().await, ServiceHealth::Healthy);
    assert_eq!(fallback.engagement().await, Engagement::Manual);
}

#[tokio::test]
async fn test_health_status_snapshot_carries_pool_stats() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, _fallback, broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    let stats = Arc::new(StdMutex::new(QueueStatus::default()));
    monitor.register_pool(PoolKind::Ai, Arc::clone(&stats));

    {
        let mut cell = stats.lock().unwrap();
        cell.pending = 4;
        cell.completed = 9;
    }
    monitor.publish_status().await;

    let latest = broadcaster.latest();
    let ai_queue = latest.queue_status.get(&PoolKind::Ai).unwrap();
    assert_eq!(ai_queue.pending, 4);
    assert_eq!(ai_queue.completed, 9);
    assert!(latest.is_available);
}

#[tokio::test]
async fn test_health_unavailable_status_not_available() {
    let mock = Arc::new(MockCompletionProvider::new());
    let (monitor, _fallback, broadcaster) = monitor_with_mock(HealthConfig::default(), mock);

    for _ in 0..3 {
        monitor.record_failure(&network_error()).await;
    }

    let latest = broadcaster.latest();
    assert_eq!(latest.service_status, ServiceHealth::Unavailable);
    assert!(!latest.is_available);
    assert!(latest.is_fallback_mode);
    assert_eq!(latest.consecutive_failures, 3);
    assert!(latest.last_health_check.is_some());
}
