use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use relay_core::config::{AppConfig, LoadOptions};
use relay_server::bootstrap::{self, Application};
use relay_server::ingress::{self, IngressState};
use relay_webex::conversation::ConversationStore;
use tracing::{debug, info};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "relay-server", about = "Webex command bot")]
struct Args {
    /// Path to a relay.toml file. Defaults to ./relay.toml or ./config/relay.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use relay_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        require_file: args.config.is_some(),
        config_path: args.config,
        load_dotenv: true,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    bootstrap::register_webhooks(&app).await;
    spawn_purge(app.conversations.clone());

    let Application { config, conversations, runner, hydrator, .. } = app;
    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = ingress::router(
        IngressState {
            hydrator,
            runner: runner.clone(),
            conversations,
            service: config.webex.bot_name.clone(),
            started_at: Instant::now(),
        },
        &config.server.webhook_path,
    );

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        webhook_path = %config.server.webhook_path,
        "relay-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "relay-server stopping"
    );
    runner.shutdown();

    Ok(())
}

fn spawn_purge(conversations: Arc<ConversationStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = conversations.purge_expired();
            if purged > 0 {
                debug!(
                    event_name = "system.conversations.purged",
                    correlation_id = "maintenance",
                    purged,
                    "expired chains removed"
                );
            }
        }
    });
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}
