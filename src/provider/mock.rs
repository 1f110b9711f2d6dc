use crate::provider::provider::CompletionProvider;
use crate::provider::types::{
    CompletionRequest, CompletionResponse, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Scripted in-process provider for tests and offline demos.
///
/// Replies are consumed front-to-back; when the script runs dry the mock falls
/// back to the configured default behavior (success unless a default failure
/// was set). Call counters and the concurrent-call high-water mark let tests
/// assert how the pools actually drove the provider.
pub struct MockCompletionProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    probe_results: Mutex<VecDeque<Result<(), ProviderError>>>,
    default_failure: Mutex<Option<ProviderError>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
    calls: AtomicUsize,
    probe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            probe_results: Mutex::new(VecDeque::new()),
            default_failure: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every completion call take this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a successful reply with the given content
    pub fn enqueue_reply(&self, content: &str) {
        self.lock_replies().push_back(Ok(content.to_string()));
    }

    /// Queue a failed completion
    pub fn enqueue_failure(&self, error: ProviderError) {
        self.lock_replies().push_back(Err(error));
    }

    /// Queue a probe result; unscripted probes succeed
    pub fn enqueue_probe(&self, result: Result<(), ProviderError>) {
        self.probe_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// Fail every unscripted completion and probe with this error
    pub fn set_default_failure(&self, error: Option<ProviderError>) {
        *self
            .default_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Number of completion calls observed
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of probe calls observed
    pub fn probe_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Highest number of completion calls that were ever in flight at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompts of all completion calls, in dispatch order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_replies(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ProviderError>>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        if let Some(scripted) = self.lock_replies().pop_front() {
            return scripted;
        }
        let default_failure = self
            .default_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match default_failure {
            Some(error) => Err(error),
            None => Ok("mock completion".to_string()),
        }
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt.clone());

        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.next_reply();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        reply.map(|content| {
            let input_tokens = (request.prompt.len() / 4) as u64;
            let output_tokens = (content.len() / 4) as u64;
            CompletionResponse {
                request_id: request.id,
                content,
                model: "mock-model".to_string(),
                usage: TokenUsage {
                    input_tokens,
                    output_tokens,
                    total_tokens: input_tokens + output_tokens,
                },
            }
        })
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self
            .probe_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return scripted;
        }
        let default_failure = self
            .default_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match default_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
