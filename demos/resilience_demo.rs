use aegis::{
    AssistRequest, AssistantService, CompletionProvider, MockCompletionProvider, ProviderError,
    ServiceConfig, ServiceEvent, TaskKind,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Walk the circuit breaker through an outage and a recovery, entirely
    // offline against the scripted mock provider.

    let mock = Arc::new(MockCompletionProvider::new());
    let service = AssistantService::with_provider(
        ServiceConfig::default(),
        Arc::clone(&mock) as Arc<dyn CompletionProvider>,
    )
    .await;

    // Print every health transition and fallback change as it happens
    service.subscribe_status(|event| match event {
        ServiceEvent::HealthTransition { from, to, .. } => {
            println!("  [event] health: {} -> {}", from, to);
        }
        ServiceEvent::FallbackChanged { engaged, manual } => {
            println!("  [event] fallback engaged={} manual={}", engaged, manual);
        }
        ServiceEvent::StatusChanged(_) => {}
    });

    println!("Step 1: a healthy request");
    mock.enqueue_reply("fn reverse(list: &mut Vec<i32>) { list.reverse(); }");
    let response = service
        .send_request(AssistRequest::new(
            TaskKind::CodeGeneration,
            "Write a function that reverses a vector",
        ))
        .await?;
    println!("  Response from {}: {}", response.model, response.content);

    println!("\nStep 2: the service starts failing");
    mock.set_default_failure(Some(ProviderError::Network("connection reset".to_string())));
    for attempt in 1..=3 {
        let result = service
            .send_request(AssistRequest::new(
                TaskKind::CodeGeneration,
                format!("attempt {}", attempt),
            ))
            .await;
        println!("  Attempt {}: {:?}", attempt, result.err().map(|e| e.code()));
    }

    let status = service.get_status();
    println!(
        "\nCircuit is now open: status={}, available={}, fallback={}",
        status.service_status, status.is_available, status.is_fallback_mode
    );

    println!("\nStep 3: requests fail fast while the circuit is open");
    let gated = service
        .send_request(AssistRequest::new(TaskKind::CodeGeneration, "anything"))
        .await;
    println!("  Gated without a network call: {:?}", gated.err().map(|e| e.code()));

    println!("\nStep 4: the service comes back, probe it immediately");
    mock.set_default_failure(None);
    service.retry_now().await?;

    let status = service.get_status();
    println!(
        "Recovered: status={}, available={}",
        status.service_status, status.is_available
    );

    mock.enqueue_reply("All systems nominal.");
    let response = service
        .send_request(AssistRequest::new(TaskKind::CodeGeneration, "status report"))
        .await?;
    println!("  Response: {}", response.content);

    service.shutdown().await;
    Ok(())
}
