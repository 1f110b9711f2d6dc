use aegis::cli::{Args, Commands, commands};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("aegis=info")
        .init();

    info!("Starting aegis");

    let args = Args::parse();
    match args.command {
        Commands::Status { config } => commands::run_status(config).await,
        Commands::Probe { config } => commands::run_probe(config).await,
        Commands::Send {
            prompt,
            kind,
            priority,
            config,
        } => commands::run_send(prompt, kind, priority, config).await,
        Commands::InitConfig => commands::run_init_config(),
        Commands::ShowConfig => {
            commands::run_show_config();
            Ok(())
        }
    }
}
