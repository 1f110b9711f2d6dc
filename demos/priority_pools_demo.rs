use aegis::{
    AssistRequest, AssistantService, CompletionProvider, MockCompletionProvider, PoolKind,
    ServiceConfig, TaskContext, TaskKind, TaskPriority,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Show the three worker pools, priority dispatch, and the per-pool
    // statistics that arrive with every status snapshot.

    let mock = Arc::new(MockCompletionProvider::new().with_delay(Duration::from_millis(100)));
    let mut config = ServiceConfig::default();
    config.pools.ai.workers = 2;
    let service =
        AssistantService::with_provider(config, Arc::clone(&mock) as Arc<dyn CompletionProvider>)
            .await;

    println!("Submitting a mixed batch across all three pools...");
    let requests = vec![
        AssistRequest::new(TaskKind::RegexGeneration, "match ISO-8601 dates"),
        AssistRequest::new(TaskKind::Review, "review the parser module")
            .with_context(TaskContext::Code {
                language: Some("rust".to_string()),
                source: "fn parse(input: &str) -> Option<u32> { input.parse().ok() }".to_string(),
            }),
        AssistRequest::new(TaskKind::CodeGeneration, "urgent hotfix")
            .with_priority(TaskPriority::Critical),
        AssistRequest::new(TaskKind::Documentation, "document the config format"),
        AssistRequest::new(TaskKind::Debugging, "why does this panic?")
            .with_priority(TaskPriority::High),
        AssistRequest::new(TaskKind::CodeGeneration, "cleanup pass")
            .with_priority(TaskPriority::Background),
    ];

    let results =
        futures::future::join_all(requests.into_iter().map(|r| service.send_request(r))).await;
    for result in &results {
        match result {
            Ok(response) => println!("  ✅ {} in {:?}", response.task_id, response.duration),
            Err(error) => println!("  ❌ {}", error),
        }
    }

    println!("\nDispatch order observed by the provider:");
    for prompt in mock.prompts() {
        println!("  - {}", prompt);
    }
    println!("Peak concurrent provider calls: {}", mock.max_concurrent_calls());

    println!("\nPer-pool statistics:");
    let status = service.get_status();
    for kind in PoolKind::ALL {
        if let Some(queue) = status.queue_status.get(&kind) {
            println!(
                "  {} pool: {} completed, {} failed",
                kind, queue.completed, queue.failed
            );
        }
    }

    let limits = service.rate_limits().await;
    println!(
        "\nRate budget: {} requests left this minute, {} in flight",
        limits.remaining, limits.in_flight
    );

    service.shutdown().await;
    Ok(())
}
