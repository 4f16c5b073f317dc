//! Text-to-speech
//!
//! Answers are cleaned up for speech, then synthesized through the Google
//! Translate TTS endpoint (the protocol gTTS speaks) in chunks of at most
//! 100 characters. Results are cached by prepared text.

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header::USER_AGENT, Client};
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::sanitize::sanitize;

pub const MAX_TTS_CHARS: usize = 1000;
pub const MAX_CHUNK_CHARS: usize = 100;
const TTS_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
  [
    (r"\bPOO\b", "programación orientada a objetos"),
    (r"\bp\. ?ej\.", "por ejemplo"),
    (r"\betc\.", "etcétera"),
    (r"\bAPI\b", "A P I"),
    (r"\bJVM\b", "jota uve eme"),
    (r"\bSQL\b", "ese cu ele"),
    (r"\bHTTP\b", "hache te te pe"),
  ]
  .into_iter()
  .filter_map(|(pattern, spoken)| Regex::new(pattern).ok().map(|re| (re, spoken)))
  .collect()
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TtsError {
  #[error("El texto está vacío")]
  EmptyText,

  #[error("El texto contiene caracteres no válidos")]
  InvalidCharacters,

  #[error("Network error talking to the TTS service: {0}")]
  Network(String),

  #[error("TTS service returned HTTP {status}")]
  Upstream { status: u16 },
}

fn is_speakable(c: char) -> bool {
  if c.is_whitespace() {
    return true;
  }
  !(c.is_control()
    || matches!(c, '\u{200B}'..='\u{200F}' | '\u{2060}'..='\u{206F}' | '\u{E000}'..='\u{F8FF}' | '\u{FFF0}'..='\u{FFFF}'))
}

/// Turn an answer into text suitable for speech
pub fn prepare_text(raw: &str) -> Result<String, TtsError> {
  let text = sanitize(raw, MAX_TTS_CHARS);
  if text.is_empty() {
    return Err(TtsError::EmptyText);
  }
  if !text.chars().all(is_speakable) {
    return Err(TtsError::InvalidCharacters);
  }

  let mut spoken: String = text.chars().filter(|c| !matches!(c, '*' | '_' | '#' | '`')).collect();
  for (re, replacement) in ABBREVIATIONS.iter() {
    spoken = re.replace_all(&spoken, *replacement).into_owned();
  }

  let spoken = spoken.split_whitespace().collect::<Vec<_>>().join(" ");
  if spoken.is_empty() {
    Err(TtsError::EmptyText)
  } else {
    Ok(spoken)
  }
}

/// Split text into chunks of at most `max_chars`, breaking on whitespace
/// where possible
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
  let max_chars = max_chars.max(1);
  let mut chunks = Vec::new();
  let mut current = String::new();
  let mut current_len = 0;

  for word in text.split_whitespace() {
    let word_len = word.chars().count();

    if word_len > max_chars {
      if !current.is_empty() {
        chunks.push(std::mem::take(&mut current));
        current_len = 0;
      }
      let chars: Vec<char> = word.chars().collect();
      for piece in chars.chunks(max_chars) {
        chunks.push(piece.iter().collect());
      }
      continue;
    }

    let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
    if needed > max_chars {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }
    if !current.is_empty() {
      current.push(' ');
      current_len += 1;
    }
    current.push_str(word);
    current_len += word_len;
  }

  if !current.is_empty() {
    chunks.push(current);
  }
  chunks
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
  /// Return MP3 audio for already-prepared text
  async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError>;
}

/// gTTS-compatible client for the Google Translate TTS endpoint
pub struct GoogleTranslateTts {
  client: Client,
  endpoint: String,
  lang: String,
}

impl GoogleTranslateTts {
  pub fn new(lang: impl Into<String>, tld: &str) -> Result<Self> {
    let client = Client::builder().timeout(TTS_TIMEOUT).build()?;
    Ok(Self {
      client,
      endpoint: format!("https://translate.google.{tld}/translate_tts"),
      lang: lang.into(),
    })
  }

  pub fn from_config(config: &ServerConfig) -> Result<Self> {
    Self::new(config.tts_lang.clone(), &config.tts_tld)
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> Result<Vec<u8>, TtsError> {
    let params = [
      ("ie", "UTF-8".to_string()),
      ("client", "tw-ob".to_string()),
      ("tl", self.lang.clone()),
      ("q", chunk.to_string()),
      ("total", total.to_string()),
      ("idx", idx.to_string()),
      ("textlen", chunk.chars().count().to_string()),
    ];

    let response = self
      .client
      .get(&self.endpoint)
      .header(USER_AGENT, BROWSER_AGENT)
      .query(&params)
      .send()
      .await
      .map_err(|e| TtsError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(TtsError::Upstream { status: status.as_u16() });
    }

    let bytes = response.bytes().await.map_err(|e| TtsError::Network(e.to_string()))?;
    Ok(bytes.to_vec())
  }
}

#[async_trait]
impl Synthesizer for GoogleTranslateTts {
  async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
    let chunks = chunk_text(text, MAX_CHUNK_CHARS);
    if chunks.is_empty() {
      return Err(TtsError::EmptyText);
    }

    debug!("Synthesizing {} chunk(s) in '{}'", chunks.len(), self.lang);
    let mut audio = Vec::new();
    for (idx, chunk) in chunks.iter().enumerate() {
      audio.extend(self.fetch_chunk(chunk, idx, chunks.len()).await?);
    }
    info!("Synthesized {} bytes of audio", audio.len());
    Ok(audio)
  }
}

/// LRU cache of synthesized audio with a time-to-live
pub struct TtsCache {
  entries: Mutex<LruCache<String, (Instant, Vec<u8>)>>,
  ttl: Duration,
}

impl TtsCache {
  pub fn new(capacity: usize, ttl: Duration) -> Self {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
  }

  pub async fn get(&self, text: &str) -> Option<Vec<u8>> {
    let mut entries = self.entries.lock().await;
    let expired = match entries.get(text) {
      Some((stored_at, audio)) if stored_at.elapsed() < self.ttl => return Some(audio.clone()),
      Some(_) => true,
      None => false,
    };
    if expired {
      entries.pop(text);
    }
    None
  }

  pub async fn insert(&self, text: String, audio: Vec<u8>) {
    self.entries.lock().await.put(text, (Instant::now(), audio));
  }

  pub async fn len(&self) -> usize {
    self.entries.lock().await.len()
  }
}
