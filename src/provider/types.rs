use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Generic completion request handed to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub id: Uuid,
    pub prompt: String,
    pub system: Option<String>,
    pub context: HashMap<String, String>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f32>,
}

/// Completion returned by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub request_id: Uuid,
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Connection settings for the outbound completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

/// Errors raised at the provider boundary, classified from the wire
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {message}")]
    Api { message: String, critical: bool },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: String::new(),
            system: None,
            context: HashMap::new(),
            max_tokens: None,
            temperature: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl From<ProviderError> for crate::service::types::ServiceError {
    fn from(error: ProviderError) -> Self {
        use crate::service::types::ServiceError;
        match error {
            ProviderError::RateLimited { retry_after } => ServiceError::RateLimited {
                retry_after: retry_after.unwrap_or(Duration::from_secs(60)),
            },
            ProviderError::Timeout { elapsed } => ServiceError::Timeout { elapsed },
            ProviderError::Network(message) => ServiceError::Network { message },
            ProviderError::Api { message, critical } => ServiceError::Api { message, critical },
            ProviderError::Malformed(message) => ServiceError::Api {
                message: format!("malformed response: {}", message),
                critical: false,
            },
        }
    }
}
