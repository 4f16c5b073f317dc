//! Shared application state

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::llm::ChatCompletion;
use crate::server::ratelimit::RateLimiter;
use crate::server::session::SessionSigner;
use crate::store::Store;
use crate::topics::TopicHandle;
use crate::tts::{Synthesizer, TtsCache};

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<ServerConfig>,
  pub topics: TopicHandle,
  pub store: Arc<dyn Store>,
  pub llm: Arc<dyn ChatCompletion>,
  pub tts: Arc<dyn Synthesizer>,
  pub tts_cache: Arc<TtsCache>,
  pub limiter: Arc<RateLimiter>,
  pub sessions: Arc<SessionSigner>,
}

impl AppState {
  pub fn new(
    config: ServerConfig,
    topics: TopicHandle,
    store: Arc<dyn Store>,
    llm: Arc<dyn ChatCompletion>,
    tts: Arc<dyn Synthesizer>,
    sessions: SessionSigner,
  ) -> Self {
    let tts_cache = Arc::new(TtsCache::new(config.tts_cache_capacity, config.tts_cache_ttl()));
    let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));
    Self {
      config: Arc::new(config),
      topics,
      store,
      llm,
      tts,
      tts_cache,
      limiter,
      sessions: Arc::new(sessions),
    }
  }
}
