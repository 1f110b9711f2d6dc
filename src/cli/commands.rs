//! Subcommand handlers for the diagnostic binary

use crate::config::{ConfigDiscovery, ServiceConfig};
use crate::provider::{CompletionProvider, HttpCompletionProvider};
use crate::service::{AssistRequest, AssistantService};
use crate::task::{TaskKind, TaskPriority};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

pub async fn run_status(config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let service = AssistantService::new(config)
        .await
        .context("Failed to start service")?;

    // Probe first so the snapshot reflects the live service, not defaults
    let probe = service.retry_now().await;
    let status = service.get_status();
    let limits = service.rate_limits().await;

    println!("📊 Service Status:");
    println!("  Health: {}", status.service_status);
    println!(
        "  Available: {}",
        if status.is_available { "yes" } else { "no" }
    );
    println!(
        "  Fallback mode: {}",
        if status.is_fallback_mode {
            "engaged"
        } else {
            "off"
        }
    );
    println!("  Consecutive failures: {}", status.consecutive_failures);
    match probe {
        Ok(()) => println!("  Probe: ✅ service reachable"),
        Err(error) => println!("  Probe: ❌ {}", error),
    }
    println!(
        "  Rate budget: {} requests remaining, {} in flight",
        limits.remaining, limits.in_flight
    );
    for (kind, queue) in &status.queue_status {
        println!(
            "  {} pool: {} pending, {} processing, {} completed, {} failed",
            kind, queue.pending, queue.processing, queue.completed, queue.failed
        );
    }

    service.shutdown().await;
    Ok(())
}

pub async fn run_probe(config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let provider = HttpCompletionProvider::new(config.provider.clone())
        .context("Failed to build HTTP provider")?;

    println!("Probing {} ...", config.provider.base_url);
    match provider.probe().await {
        Ok(()) => {
            println!("✅ Service reachable");
            Ok(())
        }
        Err(error) => Err(anyhow::anyhow!("Probe failed: {}", error)),
    }
}

pub async fn run_send(
    prompt: String,
    kind: String,
    priority: String,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let kind = parse_kind(&kind);
    let priority = parse_priority(&priority)?;
    let config = load_config(config_override)?;

    let service = AssistantService::new(config)
        .await
        .context("Failed to start service")?;
    info!("Submitting {} request", kind.label());

    let result = service
        .send_request(AssistRequest::new(kind, prompt).with_priority(priority))
        .await;

    match &result {
        Ok(response) => {
            println!("{}", response.content);
            println!();
            println!(
                "✅ Task {} answered by {} in {:?} ({} tokens)",
                response.task_id, response.model, response.duration, response.usage.total_tokens
            );
        }
        Err(error) => {
            println!("❌ Request failed: {}", error);
        }
    }

    service.shutdown().await;
    result.map(|_| ()).map_err(Into::into)
}

pub fn run_init_config() -> Result<()> {
    let path = ConfigDiscovery::create_default_user_config()?;
    println!("Configuration file ready at {:?}", path);
    println!("Set your API key under [provider] before first use.");
    Ok(())
}

pub fn run_show_config() {
    ConfigDiscovery::show_discovery_info();
}

fn load_config(config_override: Option<PathBuf>) -> Result<ServiceConfig> {
    match config_override {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            ServiceConfig::from_toml_file(path)
        }
        None => ConfigDiscovery::discover_config(),
    }
}

fn parse_kind(value: &str) -> TaskKind {
    match value.to_lowercase().as_str() {
        "code" | "codegen" => TaskKind::CodeGeneration,
        "review" => TaskKind::Review,
        "docs" | "documentation" => TaskKind::Documentation,
        "regex" => TaskKind::RegexGeneration,
        "optimize" | "optimization" => TaskKind::Optimization,
        "debug" | "debugging" => TaskKind::Debugging,
        "architecture" => TaskKind::Architecture,
        "explain" | "explanation" => TaskKind::Explanation,
        other => TaskKind::Custom(other.to_string()),
    }
}

fn parse_priority(value: &str) -> Result<TaskPriority> {
    match value.to_lowercase().as_str() {
        "critical" => Ok(TaskPriority::Critical),
        "high" => Ok(TaskPriority::High),
        "normal" => Ok(TaskPriority::Normal),
        "low" => Ok(TaskPriority::Low),
        "background" => Ok(TaskPriority::Background),
        other => Err(anyhow::anyhow!(
            "Unknown priority '{}' (expected critical, high, normal, low, or background)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_known_labels() {
        assert_eq!(parse_kind("code"), TaskKind::CodeGeneration);
        assert_eq!(parse_kind("REVIEW"), TaskKind::Review);
        assert_eq!(parse_kind("docs"), TaskKind::Documentation);
        assert_eq!(parse_kind("regex"), TaskKind::RegexGeneration);
        assert_eq!(parse_kind("optimize"), TaskKind::Optimization);
        assert_eq!(parse_kind("debug"), TaskKind::Debugging);
        assert_eq!(parse_kind("architecture"), TaskKind::Architecture);
        assert_eq!(parse_kind("explain"), TaskKind::Explanation);
    }

    #[test]
    fn test_parse_kind_custom_fallthrough() {
        assert_eq!(
            parse_kind("translation"),
            TaskKind::Custom("translation".to_string())
        );
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("critical").unwrap(), TaskPriority::Critical);
        assert_eq!(parse_priority("Normal").unwrap(), TaskPriority::Normal);
        assert_eq!(
            parse_priority("background").unwrap(),
            TaskPriority::Background
        );
        assert!(parse_priority("urgent").is_err());
    }
}
