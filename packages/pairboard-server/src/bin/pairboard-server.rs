//! Binary entry point: loads configuration, connects to the backend, and
//! serves the relay until `Ctrl-C`.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pairboard_server::backend::RedisBackend;
use pairboard_server::config::ServerConfig;
use pairboard_server::message_handler::MessageHandler;
use pairboard_server::registry::ChannelRegistry;
use pairboard_server::NetworkModule;
use tracing::info;

#[derive(Parser)]
#[command(name = "pairboard-server")]
#[command(version)]
#[command(about = "Realtime collaboration relay for shared code-editing sessions")]
struct Cli {
    /// Path to a TOML configuration file. When omitted, configuration is
    /// read from the environment variables named in the README.
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides `RUST_LOG`.
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay server (the default when no subcommand is given).
    Server,
    /// Load and print the resolved configuration without starting anything.
    ValidateConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = match &cli.config {
        Some(path) => ServerConfig::from_toml_file(path).with_context(|| format!("loading config from {path}"))?,
        None => ServerConfig::from_env().context("loading config from environment")?,
    };

    match cli.command.unwrap_or(Command::Server) {
        Command::ValidateConfig => {
            println!("configuration is valid");
            println!("  bind: {}:{}", config.host, config.port);
            println!("  redis: {}:{}", config.redis_host, config.redis_port);
            println!("  auth_api_base: {}", config.auth_api_base);
            Ok(())
        }
        Command::Server => run_server(config).await,
    }
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("connecting to backend at {}:{}", config.redis_host, config.redis_port);
    let backend = Arc::new(
        RedisBackend::connect(&config.redis_url())
            .await
            .context("connecting to backend")?,
    );

    let handler = MessageHandler::new(backend.clone());
    let registry = ChannelRegistry::new(
        backend,
        handler,
        config.tmp_codespace_expire_update,
        config.codespace_expire_update,
        config.connection.clone(),
    );

    let mut module = NetworkModule::new(config, registry);
    let port = module.start().await.context("binding listener")?;
    info!(port, "pairboard-server listening");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await
}

fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = log_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
