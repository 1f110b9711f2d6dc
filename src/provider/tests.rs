use super::*;
use crate::provider::http::parse_retry_after;
use crate::service::ServiceError;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use std::sync::Arc;
use std::time::Duration;
use test_tag::tag;

// NOTE: Tests tagged with #[tag(live)] require a reachable completion endpoint and
// an API key in OPENAI_API_KEY. These tests are automatically excluded from CI via
// the pattern `--skip "::live::test"`
// To run live endpoint tests locally: cargo test -- --include live::test

#[tokio::test]
async fn test_mock_scripted_replies_in_order() {
    let mock = MockCompletionProvider::new();
    mock.enqueue_reply("first answer");
    mock.enqueue_failure(ProviderError::Timeout {
        elapsed: Duration::from_secs(1),
    });
    mock.enqueue_reply("second answer");

    let request = |prompt: &str| CompletionRequest {
        prompt: prompt.to_string(),
        ..CompletionRequest::default()
    };

    let first = mock.complete(request("one")).await.unwrap();
    assert_eq!(first.content, "first answer");

    let second = mock.complete(request("two")).await;
    assert!(matches!(second, Err(ProviderError::Timeout { .. })));

    let third = mock.complete(request("three")).await.unwrap();
    assert_eq!(third.content, "second answer");

    assert_eq!(mock.call_count(), 3);
    assert_eq!(mock.prompts(), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_mock_default_behavior_flips_with_default_failure() {
    let mock = MockCompletionProvider::new();

    let ok = mock.complete(CompletionRequest::default()).await.unwrap();
    assert_eq!(ok.content, "mock completion");
    assert_eq!(ok.model, "mock-model");

    mock.set_default_failure(Some(ProviderError::Network("cable cut".to_string())));
    let failed = mock.complete(CompletionRequest::default()).await;
    assert!(matches!(failed, Err(ProviderError::Network(_))));

    mock.set_default_failure(None);
    assert!(mock.complete(CompletionRequest::default()).await.is_ok());
}

#[tokio::test]
async fn test_mock_probe_scripting() {
    let mock = MockCompletionProvider::new();
    mock.enqueue_probe(Err(ProviderError::Network("down".to_string())));

    assert!(mock.probe().await.is_err());
    // Script exhausted, unscripted probes succeed
    assert!(mock.probe().await.is_ok());
    assert_eq!(mock.probe_count(), 2);

    mock.set_default_failure(Some(ProviderError::Network("down again".to_string())));
    assert!(mock.probe().await.is_err());
}

#[tokio::test]
async fn test_mock_usage_scales_with_text_length() {
    let mock = MockCompletionProvider::new();
    let request = CompletionRequest {
        prompt: "x".repeat(40),
        ..CompletionRequest::default()
    };

    let response = mock.complete(request).await.unwrap();
    assert_eq!(response.usage.input_tokens, 10);
    assert_eq!(
        response.usage.output_tokens,
        (response.content.len() / 4) as u64
    );
    assert_eq!(
        response.usage.total_tokens,
        response.usage.input_tokens + response.usage.output_tokens
    );
}

#[tokio::test]
async fn test_mock_tracks_concurrent_high_water_mark() {
    let mock = Arc::new(MockCompletionProvider::new().with_delay(Duration::from_millis(100)));

    let a = mock.complete(CompletionRequest::default());
    let b = mock.complete(CompletionRequest::default());
    let c = mock.complete(CompletionRequest::default());
    let (a, b, c) = tokio::join!(a, b, c);
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(mock.max_concurrent_calls(), 3);
}

#[test]
fn test_shared_provider_replace_swaps_instance() {
    let first = Arc::new(MockCompletionProvider::new());
    let shared = SharedProvider::new(Arc::clone(&first) as Arc<dyn CompletionProvider>);
    assert_eq!(shared.get().provider_name(), "mock");

    let handle_before = shared.get();
    let second = HttpCompletionProvider::new(ProviderConfig::default()).unwrap();
    shared.replace(Arc::new(second));

    assert_eq!(shared.get().provider_name(), "openai-http");
    // Handles taken before the swap keep the old instance
    assert_eq!(handle_before.provider_name(), "mock");
}

#[test]
fn test_parse_retry_after_prefers_header() {
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

    let parsed = parse_retry_after(&headers, "try again in 99s");
    assert_eq!(parsed, Some(Duration::from_secs(7)));
}

#[test]
fn test_parse_retry_after_reads_body_phrase() {
    let headers = HeaderMap::new();

    let parsed = parse_retry_after(&headers, "Rate limit reached. Please try again in 2.5s.");
    assert_eq!(parsed, Some(Duration::from_secs_f64(2.5)));

    let case_insensitive = parse_retry_after(&headers, "Try Again In 30 s");
    assert_eq!(case_insensitive, Some(Duration::from_secs(30)));
}

#[test]
fn test_parse_retry_after_absent() {
    let headers = HeaderMap::new();
    assert_eq!(parse_retry_after(&headers, "no hint here"), None);

    let mut garbage = HeaderMap::new();
    garbage.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
    assert_eq!(parse_retry_after(&garbage, ""), None);
}

#[test]
fn test_http_provider_rejects_invalid_base_url() {
    let config = ProviderConfig {
        base_url: "not a url".to_string(),
        ..ProviderConfig::default()
    };

    match HttpCompletionProvider::new(config) {
        Err(ProviderError::Api { critical, .. }) => assert!(critical),
        other => panic!("Expected critical API error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_provider_errors_map_to_service_errors() {
    let defaulted = ServiceError::from(ProviderError::RateLimited { retry_after: None });
    assert!(matches!(
        defaulted,
        ServiceError::RateLimited {
            retry_after
        } if retry_after == Duration::from_secs(60)
    ));

    let hinted = ServiceError::from(ProviderError::RateLimited {
        retry_after: Some(Duration::from_secs(5)),
    });
    assert!(matches!(
        hinted,
        ServiceError::RateLimited { retry_after } if retry_after == Duration::from_secs(5)
    ));

    let malformed = ServiceError::from(ProviderError::Malformed("bad json".to_string()));
    match malformed {
        ServiceError::Api { message, critical } => {
            assert!(!critical);
            assert!(message.contains("malformed response"));
        }
        other => panic!("Expected API error, got {:?}", other),
    }

    let critical = ServiceError::from(ProviderError::Api {
        message: "authentication rejected".to_string(),
        critical: true,
    });
    assert!(critical.is_critical());
    assert!(critical.is_service_fault());

    let timeout = ServiceError::from(ProviderError::Timeout {
        elapsed: Duration::from_secs(30),
    });
    assert!(timeout.is_service_fault());
    assert!(!timeout.is_critical());
}

#[tokio::test]
#[tag(live)]
async fn test_live_probe_reaches_endpoint() {
    let config = ProviderConfig {
        api_key: std::env::var("OPENAI_API_KEY").ok(),
        ..ProviderConfig::default()
    };
    let provider = HttpCompletionProvider::new(config).unwrap();
    provider.probe().await.unwrap();
}

#[tokio::test]
#[tag(live)]
async fn test_live_completion_round_trip() {
    let config = ProviderConfig {
        api_key: std::env::var("OPENAI_API_KEY").ok(),
        ..ProviderConfig::default()
    };
    let provider = HttpCompletionProvider::new(config).unwrap();

    let request = CompletionRequest {
        prompt: "Reply with the single word: pong".to_string(),
        max_tokens: Some(16),
        ..CompletionRequest::default()
    };
    let response = provider.complete(request).await.unwrap();
    assert!(!response.content.is_empty());
    assert!(!response.model.is_empty());
}
