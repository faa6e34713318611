use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use passerelle::core::config::Config;
use passerelle::server::{build_router, AppState};

#[derive(Parser)]
#[command(name = "passerelle")]
#[command(about = "Session-aware streaming relay between chat frontends and LLM backends")]
#[command(long_about = "Passerelle relays chat requests to a local NDJSON inference server or an \
OpenAI-style completion service, normalizing either stream into one SSE \
delta format and replaying each session's transcript as context.\n\n\
Configuration is read from a TOML file (see --config), overlaid with \
PASSERELLE_* environment variables. The backend credential is read from \
the environment variable named by `api_key_env` (default OPENAI_API_KEY).")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured value
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("passerelle=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides()?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let state = AppState::from_config(&config);
    let router = build_router(state);

    let listener = TcpListener::bind(&config.listen).await?;
    info!(
        addr = %config.listen,
        backend = config.backend.as_str(),
        model = config.model(),
        "relay listening"
    );
    axum::serve(listener, router).await?;
    Ok(())
}
