use crate::provider::provider::CompletionProvider;
use crate::provider::types::{
    CompletionRequest, CompletionResponse, ProviderConfig, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for OpenAI-compatible completion endpoints.
///
/// Speaks `POST {base_url}/chat/completions` for work and
/// `GET {base_url}/models` for availability probes.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    base_url: Url,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl HttpCompletionProvider {
    /// Build a provider from configuration; a missing `api_key` falls back
    /// to the `OPENAI_API_KEY` environment variable.
    pub fn new(mut config: ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            ProviderError::Api {
                message: format!("invalid base URL '{}': {}", config.base_url, e),
                critical: true,
            }
        })?;

        if config.api_key.is_none() {
            config.api_key = std::env::var(crate::env::API_KEY_ENV).ok();
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::Api {
                    message: format!("base URL '{}' cannot carry a path", self.base_url),
                    critical: true,
                })?;
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn classify_transport(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                elapsed: self.config.request_timeout,
            }
        } else {
            ProviderError::Network(error.to_string())
        }
    }

    fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after: parse_retry_after(headers, body),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Api {
                message: format!("authentication rejected ({}): {}", status, truncate(body)),
                critical: true,
            },
            _ => ProviderError::Api {
                message: format!("request failed ({}): {}", status, truncate(body)),
                critical: false,
            },
        }
    }

    fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage<'_>> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }

        let mut content = request.prompt.clone();
        if !request.context.is_empty() {
            let mut entries: Vec<_> = request.context.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            content.push_str("\n\n");
            for (key, value) in entries {
                content.push_str(key);
                content.push_str(": ");
                content.push_str(value);
                content.push('\n');
            }
        }
        messages.push(ChatMessage {
            role: "user",
            content,
        });
        messages
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = self.endpoint("chat/completions")?;
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: Self::build_messages(&request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!("Sending completion request {} to {}", request.id, url);
        let response = self
            .apply_auth(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport(e))?;

        if !status.is_success() {
            let body_text = String::from_utf8_lossy(&bytes);
            return Err(Self::classify_status(status, &headers, &body_text));
        }

        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("response carried no choices".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            request_id: request.id,
            content,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            usage,
        })
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let url = self.endpoint("models")?;
        debug!("Probing completion endpoint at {}", url);

        let response = self
            .apply_auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(Self::classify_status(status, &headers, &body))
    }

    fn provider_name(&self) -> &'static str {
        "openai-http"
    }
}

/// Extract a retry hint from the `Retry-After` header, falling back to a
/// "try again in Ns" phrase some gateways put in the error body.
pub fn parse_retry_after(headers: &HeaderMap, body: &str) -> Option<Duration> {
    if let Some(value) = headers.get(RETRY_AFTER)
        && let Ok(text) = value.to_str()
        && let Ok(seconds) = text.trim().parse::<u64>()
    {
        return Some(Duration::from_secs(seconds));
    }

    static RETRY_PHRASE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RETRY_PHRASE
        .get_or_init(|| Regex::new(r"(?i)try again in\s+(\d+(?:\.\d+)?)\s*s").ok())
        .as_ref()?;
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX {
        let head: String = trimmed.chars().take(MAX).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
