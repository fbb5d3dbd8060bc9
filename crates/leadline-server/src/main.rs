//! Leadline server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `LEADLINE_*` environment variables, opens the SQLite store, and serves the
//! JSON API under `/api`.

mod settings;
mod upstream;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use leadline_api::{ApiState, api_router};
use leadline_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
  settings::{ServerConfig, expand_tilde},
  upstream::{HttpDrafter, HttpValuator},
};

#[derive(Parser)]
#[command(author, version, about = "Leadline CRM and alert server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let store_path = expand_tilde(&cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let client = upstream::client(Duration::from_secs(cfg.request_timeout_secs))
    .context("failed to build HTTP client")?;

  let mut state = ApiState::new(Arc::new(store));
  match &cfg.valuation_url {
    Some(url) => {
      state = state.with_valuator(Arc::new(HttpValuator::new(client.clone(), url)));
    }
    None => tracing::warn!("no valuation_url configured; valuations will be stale"),
  }
  match &cfg.drafting_url {
    Some(url) => {
      state = state.with_drafter(Arc::new(HttpDrafter::new(client.clone(), url)));
    }
    None => tracing::warn!("no drafting_url configured; /api/draft will return 503"),
  }

  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
