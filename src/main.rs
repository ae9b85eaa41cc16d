use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use switchboard_core::checkpoint::Checkpointer;
use switchboard_engine::{default_registry, MemoryCheckpointer};
use switchboard_llm::{OpenAiChatModel, OpenAiConfig};
use switchboard_server::{serve, AppState, ServerConfig};
use switchboard_settings::{load_settings, DatabaseType, Settings};
use switchboard_store::{CheckpointRepo, Database};
use switchboard_telemetry::{init_logging, FeedbackRecorder, LangfuseClient, LangfuseConfig, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Agent service over HTTP and SSE")]
struct Cli {
    /// Settings file (JSON). Falls back to $SWITCHBOARD_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,
    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref()).context("failed to load settings")?;
    init_logging(LoggingConfig::for_mode(settings.is_dev())).context("failed to init logging")?;
    info!(mode = %settings.mode, "starting switchboard");

    let checkpointer = open_checkpointer(&settings)?;
    let model = Arc::new(OpenAiChatModel::new(OpenAiConfig {
        api_key: settings.model.api_key.clone(),
        base_url: settings.model.base_url.clone(),
        default_model: settings.model.default_model.clone(),
    }));
    if !model.is_configured() {
        tracing::warn!("no model API key configured; agent runs will fail");
    }
    let registry = default_registry(model, checkpointer)?;

    let feedback = FeedbackRecorder::new(settings.langfuse_credentials().map(|c| {
        LangfuseClient::new(LangfuseConfig {
            public_key: c.public_key,
            secret_key: c.secret_key,
            host: c.host,
        })
    }));

    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let state = AppState::new(registry, feedback, settings.server.auth_secret.clone());
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    serve(config, state, shutdown).await?;
    Ok(())
}

fn open_checkpointer(settings: &Settings) -> anyhow::Result<Arc<dyn Checkpointer>> {
    Ok(match settings.database.kind {
        DatabaseType::Memory => {
            info!("using in-memory checkpoints");
            Arc::new(MemoryCheckpointer::new())
        }
        // Postgres is rejected by settings validation.
        DatabaseType::Sqlite | DatabaseType::Postgres => {
            let path = Path::new(&settings.database.sqlite_path);
            let db = Database::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Arc::new(CheckpointRepo::new(db))
        }
    })
}

async fn shutdown_on_ctrl_c(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
        return;
    }
    info!("shutting down");
    token.cancel();
}
