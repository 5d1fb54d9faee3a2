use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatgate::completion::{CompletionService, CompletionSettings};
use chatgate::config::Config;
use chatgate::llm::ProviderRegistry;
use chatgate::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "chatgate", version)]
#[command(about = "Chat completion gateway for OpenAI and Ollama")]
struct Args {
    /// Path to the YAML config file. Defaults apply when it does not exist.
    #[arg(long, short, default_value = "chatgate.yaml")]
    config: PathBuf,

    /// Address to bind, overrides API_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides API_PORT
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(&args.config)
        .await
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.apply_env()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let config = config.validated()?;

    let registry = ProviderRegistry::from_config(&config.providers)?;
    info!(
        default_provider = %config.providers.default_provider,
        default_model = %config.providers.default_model,
        "Providers ready"
    );

    let completions = CompletionService::new(registry, CompletionSettings::from_config(&config));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::build_app(AppState {
        completions,
        config: Arc::new(config),
    });

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
