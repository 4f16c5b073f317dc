//! Server configuration
//!
//! Every setting can be given as a command-line flag or through the matching
//! environment variable, so container deployments only need `env`.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::RetryPolicy;

/// Largest recommendation history we ever keep per user
pub const MAX_RECOMMENDATION_WINDOW: usize = 5;

#[derive(Parser, Debug, Clone)]
#[command(name = "yelia_server")]
#[command(about = "YELIA tutor REST API server")]
#[command(version)]
pub struct ServerConfig {
  /// Interface to bind
  #[arg(long, env = "HOST", default_value = "0.0.0.0")]
  pub host: IpAddr,

  /// Port to listen on
  #[arg(long, env = "PORT", default_value_t = 5000)]
  pub port: u16,

  /// PostgreSQL connection string; the in-memory store is used when unset
  #[arg(long, env = "DATABASE_URL")]
  pub database_url: Option<String>,

  /// Maximum pooled database connections
  #[arg(long, env = "DB_POOL_SIZE", default_value_t = 5)]
  pub db_pool_size: u32,

  /// Groq API key
  #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
  pub groq_api_key: Option<String>,

  /// Groq chat completions endpoint
  #[arg(
    long,
    env = "GROQ_API_URL",
    default_value = "https://api.groq.com/openai/v1/chat/completions"
  )]
  pub groq_api_url: String,

  /// Model used for every completion
  #[arg(long, env = "GROQ_MODEL", default_value = "llama3-70b-8192")]
  pub groq_model: String,

  /// Per-request timeout for LLM calls
  #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 30)]
  pub llm_timeout_secs: u64,

  /// Total attempts for a retryable LLM failure
  #[arg(long, env = "LLM_RETRY_ATTEMPTS", default_value_t = 3)]
  pub llm_retry_attempts: u32,

  /// Fixed wait between LLM attempts
  #[arg(long, env = "LLM_RETRY_DELAY_MS", default_value_t = 5000)]
  pub llm_retry_delay_ms: u64,

  /// Key used to sign session cookies
  #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
  pub secret_key: Option<String>,

  /// Topic catalog file
  #[arg(long, env = "TOPICS_PATH", default_value = "temas.json")]
  pub topics_path: PathBuf,

  /// Prerequisite map file
  #[arg(long, env = "PREREQUISITES_PATH", default_value = "prerequisitos.json")]
  pub prerequisites_path: PathBuf,

  /// Reload the topic files every N seconds (0 disables)
  #[arg(long, env = "TOPICS_RELOAD_SECS", default_value_t = 0)]
  pub topics_reload_secs: u64,

  /// Points awarded for a correct quiz answer
  #[arg(long, env = "QUIZ_POINTS", default_value_t = 10, value_parser = clap::value_parser!(i32).range(0..))]
  pub quiz_points: i32,

  /// How many recent recommendations to avoid repeating
  #[arg(long, env = "RECOMMENDATION_WINDOW", default_value_t = 3)]
  pub recommendation_window: usize,

  /// Minimum TF-IDF cosine score to answer from the catalog
  #[arg(long, env = "TFIDF_MIN_SCORE", default_value_t = 0.35)]
  pub tfidf_min_score: f32,

  /// Speech language
  #[arg(long, env = "TTS_LANG", default_value = "es")]
  pub tts_lang: String,

  /// Google top-level domain used for the speech accent
  #[arg(long, env = "TTS_TLD", default_value = "com.mx")]
  pub tts_tld: String,

  /// Cached audio clips
  #[arg(long, env = "TTS_CACHE_CAPACITY", default_value_t = 64)]
  pub tts_cache_capacity: usize,

  /// Lifetime of a cached audio clip
  #[arg(long, env = "TTS_CACHE_TTL_SECS", default_value_t = 3600)]
  pub tts_cache_ttl_secs: u64,

  /// Requests per minute allowed on each rate-limited route
  #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 20)]
  pub rate_limit_per_minute: u32,

  /// Enable verbose logging
  #[arg(short, long)]
  pub verbose: bool,
}

impl ServerConfig {
  pub fn bind_addr(&self) -> SocketAddr {
    SocketAddr::new(self.host, self.port)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.llm_retry_attempts, Duration::from_millis(self.llm_retry_delay_ms))
  }

  pub fn llm_timeout(&self) -> Duration {
    Duration::from_secs(self.llm_timeout_secs)
  }

  /// Recommendation window clamped to 1..=5
  pub fn recommendation_window(&self) -> usize {
    self.recommendation_window.clamp(1, MAX_RECOMMENDATION_WINDOW)
  }

  pub fn tts_cache_ttl(&self) -> Duration {
    Duration::from_secs(self.tts_cache_ttl_secs)
  }

  /// Configuration for in-process tests: no database, no API key, no waiting.
  pub fn for_tests() -> Self {
    Self {
      host: IpAddr::from([127, 0, 0, 1]),
      port: 0,
      database_url: None,
      db_pool_size: 1,
      groq_api_key: None,
      groq_api_url: "http://127.0.0.1:9/unused".to_string(),
      groq_model: "test-model".to_string(),
      llm_timeout_secs: 1,
      llm_retry_attempts: 1,
      llm_retry_delay_ms: 0,
      secret_key: Some("test-secret".to_string()),
      topics_path: PathBuf::from("temas.json"),
      prerequisites_path: PathBuf::from("prerequisitos.json"),
      topics_reload_secs: 0,
      quiz_points: 10,
      recommendation_window: 3,
      tfidf_min_score: 0.35,
      tts_lang: "es".to_string(),
      tts_tld: "com.mx".to_string(),
      tts_cache_capacity: 8,
      tts_cache_ttl_secs: 60,
      rate_limit_per_minute: 100,
      verbose: false,
    }
  }
}
