//! REST server startup and configuration

use anyhow::Result;
use axum::serve;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::llm::{ChatCompletion, GroqClient, RetryingClient};
use crate::server::{routing::create_router, session::SessionSigner, state::AppState};
use crate::store::{MemoryStore, PgStore, Store};
use crate::topics::{TopicCatalog, TopicHandle};
use crate::tts::GoogleTranslateTts;

async fn connect_store(config: &ServerConfig) -> Arc<dyn Store> {
  let url = config.database_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
  let Some(url) = url else {
    warn!("DATABASE_URL is not set; progress and conversations are kept in memory");
    return Arc::new(MemoryStore::new());
  };

  match PgStore::connect(url, config.db_pool_size).await {
    Ok(store) => {
      info!("Connected to PostgreSQL (pool size {})", config.db_pool_size);
      Arc::new(store)
    }
    Err(e) => {
      error!("Could not initialise the database, falling back to the in-memory store: {e}");
      Arc::new(MemoryStore::new())
    }
  }
}

fn session_signer(config: &ServerConfig) -> Result<SessionSigner> {
  match config.secret_key.as_deref().filter(|k| !k.trim().is_empty()) {
    Some(secret) => SessionSigner::new(secret.as_bytes()),
    None => {
      warn!("SECRET_KEY is not set; using a random key, sessions will not survive a restart");
      SessionSigner::ephemeral()
    }
  }
}

/// Load topics, connect the store and build the outbound clients
pub async fn build_state(config: ServerConfig) -> Result<AppState> {
  let catalog = TopicCatalog::load_lenient(&config.topics_path, &config.prerequisites_path);
  if catalog.is_empty() {
    error!("No topics loaded from {}", config.topics_path.display());
  }
  let topics =
    TopicHandle::new(catalog, config.topics_path.clone(), config.prerequisites_path.clone());

  let store = connect_store(&config).await;

  let groq = GroqClient::from_config(&config)?;
  if !groq.is_configured() {
    warn!("GROQ_API_KEY is not set; answers outside the catalog will use the fallback reply");
  }
  let llm: Arc<dyn ChatCompletion> = Arc::new(RetryingClient::new(groq, config.retry_policy()));
  let tts = Arc::new(GoogleTranslateTts::from_config(&config)?);
  let sessions = session_signer(&config)?;

  Ok(AppState::new(config, topics, store, llm, tts, sessions))
}

/// Start the REST server and run until Ctrl-C
pub async fn start_server(config: ServerConfig) -> Result<()> {
  let addr = config.bind_addr();
  let reload_secs = config.topics_reload_secs;
  let state = build_state(config).await?;

  if reload_secs > 0 {
    info!("Reloading topics every {reload_secs}s");
    state.topics.spawn_reload_task(Duration::from_secs(reload_secs));
  }

  let app = create_router(state).layer(
    ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()),
  );

  let listener = TcpListener::bind(addr).await?;
  info!("Server listening on {addr}");

  serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| {
      error!("Server error: {e}");
      anyhow::anyhow!("Server error: {e}")
    })?;

  info!("Server shutdown gracefully");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("Failed to listen for shutdown signal: {e}");
    std::future::pending::<()>().await;
  }
  info!("Shutdown signal received");
}
