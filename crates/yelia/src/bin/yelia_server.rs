//! YELIA REST Server
//!
//! HTTP JSON API for the YELIA programming tutor: answers, quizzes,
//! recommendations, speech and per-user progress.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use yelia::server::startup::start_server;
use yelia::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
  let config = ServerConfig::parse();

  // RUST_LOG wins over both presets
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if config.verbose {
      EnvFilter::new("debug,sqlx=info,hyper=info")
    } else {
      EnvFilter::new("yelia=info,tower_http=info,sqlx=warn,warn")
    }
  });

  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  info!("Starting YELIA REST Server v{}", env!("CARGO_PKG_VERSION"));
  info!("Binding to address: {}", config.bind_addr());

  start_server(config).await?;

  Ok(())
}
