use anyhow::{Context, Result};
use clap::Parser;
use deepchat::{
    capability::CapabilityRegistry,
    config::{Config, Credentials},
    gateway::ModelGateway,
    orchestrator::Orchestrator,
    persistence::{InMemoryTranscripts, JsonFileTranscripts, TranscriptSink},
    progress::TracingProgress,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod request;
mod routes;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind the service to
    #[arg(long, env = "DEEPCHAT_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,
    /// Path to a TOML config file
    #[arg(long, env = "DEEPCHAT_CONFIG")]
    config: Option<PathBuf>,
    /// Directory for JSON transcripts; overrides `storage.dir`
    #[arg(long, env = "DEEPCHAT_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("deepchat=info,deepchat_service=info,tower_http=info")
    });
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = args.storage_dir {
        config.storage.dir = Some(dir);
    }
    let creds = Credentials::from_env();

    let gateway = ModelGateway::from_config(&config.models, &creds);
    if !gateway.is_configured() {
        warn!("no model API key set; chat requests will fail until one is configured");
    }
    let registry = CapabilityRegistry::from_config(&config, &creds, Arc::new(TracingProgress));
    let sink: Arc<dyn TranscriptSink> = match &config.storage.dir {
        Some(dir) => Arc::new(JsonFileTranscripts::new(dir.clone())),
        None => {
            let sink = InMemoryTranscripts::with_capacity(config.storage.memory_sessions);
            warn!(
                capacity = sink.capacity(),
                "no storage dir set; transcripts are kept in memory and lost on restart"
            );
            Arc::new(sink)
        }
    };

    info!(
        addr = %args.addr,
        config = ?args.config,
        storage = ?config.storage.dir,
        vision = gateway.has_vision(),
        "starting service"
    );

    let state = routes::AppState {
        orchestrator: Arc::new(Orchestrator::new(
            gateway,
            registry,
            sink,
            config.prompt.clone(),
        )),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
