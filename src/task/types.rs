use crate::provider::types::CompletionResponse;
use crate::service::types::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// A unit of work routed through a worker pool.
///
/// Tasks are owned by the pending queue from submission until dispatch and are
/// consumed when the outcome is delivered.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub prompt: String,
    pub context: TaskContext,
    pub priority: TaskPriority,
    pub deadline: Duration,
    pub created_at: DateTime<Utc>,
}

/// Kinds of assistance work, each mapped to exactly one worker pool
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    CodeGeneration,
    Review,
    Documentation,
    RegexGeneration,
    Optimization,
    Debugging,
    Architecture,
    Explanation,
    Custom(String),
}

/// Worker pool identity
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PoolKind {
    Regex,
    Ai,
    Analysis,
}

/// Task priority levels with numeric values for queue ordering
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Critical = 10,
    High = 8,
    Normal = 5,
    Low = 3,
    Background = 1,
}

/// Structured request context, validated at the service boundary
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TaskContext {
    /// No additional context beyond the prompt
    None,
    /// Source code the request refers to
    Code {
        language: Option<String>,
        source: String,
    },
    /// A regular expression pattern under discussion
    Pattern {
        pattern: String,
        flavor: Option<String>,
        sample: Option<String>,
    },
    /// A document body (for documentation and review tasks)
    Document {
        title: Option<String>,
        body: String,
    },
    /// Free-form key/value context
    Custom(HashMap<String, String>),
}

/// Result of executing a single task, delivered once to the submitting caller
#[derive(Debug)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub result: Result<CompletionResponse, ServiceError>,
    pub duration: Duration,
}

/// Per-pool queue counters.
///
/// `completed + failed` only ever grows; `pending` and `processing` are gauges
/// updated atomically with queue transitions.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub completed: u64,
    pub failed: u64,
    pub active_requests: usize,
}

impl Task {
    /// Create a new task with a fresh id and creation timestamp
    pub fn new(kind: TaskKind, prompt: impl Into<String>, deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            prompt: prompt.into(),
            context: TaskContext::None,
            priority: TaskPriority::Normal,
            deadline,
            created_at: Utc::now(),
        }
    }

    /// Attach request context
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Set queue priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Get task age since creation
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

impl TaskKind {
    /// The worker pool this kind of work is dispatched to
    pub fn pool(&self) -> PoolKind {
        match self {
            TaskKind::RegexGeneration | TaskKind::Optimization => PoolKind::Regex,
            TaskKind::Review
            | TaskKind::Debugging
            | TaskKind::Architecture
            | TaskKind::Explanation => PoolKind::Analysis,
            TaskKind::CodeGeneration | TaskKind::Documentation | TaskKind::Custom(_) => {
                PoolKind::Ai
            }
        }
    }

    /// Short label used in logs and wire metadata
    pub fn label(&self) -> &str {
        match self {
            TaskKind::CodeGeneration => "code_generation",
            TaskKind::Review => "review",
            TaskKind::Documentation => "documentation",
            TaskKind::RegexGeneration => "regex_generation",
            TaskKind::Optimization => "optimization",
            TaskKind::Debugging => "debugging",
            TaskKind::Architecture => "architecture",
            TaskKind::Explanation => "explanation",
            TaskKind::Custom(name) => name,
        }
    }
}

impl PoolKind {
    pub const ALL: [PoolKind; 3] = [PoolKind::Regex, PoolKind::Ai, PoolKind::Analysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Regex => "regex",
            PoolKind::Ai => "ai",
            PoolKind::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskPriority {
    /// Get numeric value for queue tier ordering
    pub fn value(&self) -> u8 {
        self.clone() as u8
    }
}

impl TaskContext {
    /// Check that the context carries the content its variant promises.
    ///
    /// Returns a human-readable description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TaskContext::None => Ok(()),
            TaskContext::Code { source, .. } => {
                if source.trim().is_empty() {
                    Err("code context requires non-empty source".to_string())
                } else {
                    Ok(())
                }
            }
            TaskContext::Pattern { pattern, .. } => {
                if pattern.trim().is_empty() {
                    Err("pattern context requires a non-empty pattern".to_string())
                } else {
                    Ok(())
                }
            }
            TaskContext::Document { body, .. } => {
                if body.trim().is_empty() {
                    Err("document context requires a non-empty body".to_string())
                } else {
                    Ok(())
                }
            }
            TaskContext::Custom(entries) => {
                if entries.keys().any(|k| k.trim().is_empty()) {
                    Err("custom context keys must be non-empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Check if the context carries no content
    pub fn is_empty(&self) -> bool {
        match self {
            TaskContext::None => true,
            TaskContext::Custom(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Flatten into key/value pairs for the provider wire request
    pub fn to_wire(&self) -> HashMap<String, String> {
        let mut wire = HashMap::new();
        match self {
            TaskContext::None => {}
            TaskContext::Code { language, source } => {
                if let Some(language) = language {
                    wire.insert("language".to_string(), language.clone());
                }
                wire.insert("source".to_string(), source.clone());
            }
            TaskContext::Pattern {
                pattern,
                flavor,
                sample,
            } => {
                wire.insert("pattern".to_string(), pattern.clone());
                if let Some(flavor) = flavor {
                    wire.insert("flavor".to_string(), flavor.clone());
                }
                if let Some(sample) = sample {
                    wire.insert("sample".to_string(), sample.clone());
                }
            }
            TaskContext::Document { title, body } => {
                if let Some(title) = title {
                    wire.insert("title".to_string(), title.clone());
                }
                wire.insert("body".to_string(), body.clone());
            }
            TaskContext::Custom(entries) => {
                wire.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        wire
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        TaskContext::None
    }
}
