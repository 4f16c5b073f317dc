//! Topic catalog
//!
//! Course content is read from two JSON files:
//!
//! - `temas.json`: `{unit: {topic: {"definición", "ventajas"?, "ejemplo"?, "palabras_clave"?}}}`
//! - `prerequisitos.json`: `{unit: {topic: [names]}}` or the flat `{topic: [names]}`
//!
//! A loaded catalog is immutable. Handlers take an `Arc<TopicCatalog>` snapshot
//! from the shared [`TopicHandle`], which may be swapped by the reload task.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::search::{SearchHit, TfIdfIndex};

#[derive(Error, Debug)]
pub enum TopicError {
  #[error("Failed to read {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },

  #[error("Invalid topic data in {origin}: {message}")]
  Parse { origin: String, message: String },
}

impl TopicError {
  fn parse(origin: impl Into<String>, message: impl ToString) -> Self {
    Self::Parse { origin: origin.into(), message: message.to_string() }
  }
}

/// One unit of course content
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
  pub name: String,
  pub unit: String,
  pub definition: String,
  pub advantages: Vec<String>,
  pub example: Option<String>,
  pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TopicBody {
  #[serde(rename = "definición", alias = "definicion")]
  definition: String,
  #[serde(rename = "ventajas", default)]
  advantages: Vec<String>,
  #[serde(rename = "ejemplo", default)]
  example: Option<String>,
  #[serde(rename = "palabras_clave", default)]
  keywords: Vec<String>,
}

/// Immutable snapshot of topics, prerequisites and the search index
#[derive(Debug, Clone, Default)]
pub struct TopicCatalog {
  topics: Vec<Topic>,
  by_name: HashMap<String, usize>,
  prerequisites: HashMap<String, Vec<String>>,
  keyword_patterns: Vec<(usize, Regex)>,
  index: TfIdfIndex,
}

impl TopicCatalog {
  /// Build a catalog from already-parsed JSON documents
  pub fn from_json(topics: &Value, prerequisites: &Value) -> Result<Self, TopicError> {
    let topics = parse_topics(topics)?;
    let prerequisites = parse_prerequisites(prerequisites)?;
    Ok(Self::new(topics, prerequisites))
  }

  /// Load both files, failing on the first unreadable or malformed one
  pub fn load(topics_path: &Path, prerequisites_path: &Path) -> Result<Self, TopicError> {
    let topics = parse_topics(&read_json(topics_path)?)?;
    let prerequisites = parse_prerequisites(&read_json(prerequisites_path)?)?;
    Ok(Self::new(topics, prerequisites))
  }

  /// Load both files, substituting an empty part for whichever one fails
  pub fn load_lenient(topics_path: &Path, prerequisites_path: &Path) -> Self {
    let topics = read_json(topics_path).and_then(|v| parse_topics(&v)).unwrap_or_else(|e| {
      error!("Error loading topics: {e}");
      Vec::new()
    });
    let prerequisites =
      read_json(prerequisites_path).and_then(|v| parse_prerequisites(&v)).unwrap_or_else(|e| {
        error!("Error loading prerequisites: {e}");
        HashMap::new()
      });

    let catalog = Self::new(topics, prerequisites);
    info!(
      "Loaded {} topics ({} with prerequisites)",
      catalog.len(),
      catalog.prerequisites.len()
    );
    catalog
  }

  fn new(topics: Vec<Topic>, prerequisites: HashMap<String, Vec<String>>) -> Self {
    let mut by_name = HashMap::new();
    let mut unique = Vec::with_capacity(topics.len());
    for topic in topics {
      // progress rows store learned topics comma-joined
      if topic.name.contains(',') {
        warn!("Topic '{}' ignored: names cannot contain commas", topic.name);
        continue;
      }
      let key = topic.name.to_lowercase();
      if by_name.contains_key(&key) {
        warn!("Duplicate topic '{}' ignored", topic.name);
        continue;
      }
      by_name.insert(key, unique.len());
      unique.push(topic);
    }

    let keyword_patterns = unique
      .iter()
      .enumerate()
      .flat_map(|(idx, topic)| {
        topic.keywords.iter().filter(|k| !k.trim().is_empty()).filter_map(move |keyword| {
          RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword.trim())))
            .case_insensitive(true)
            .build()
            .ok()
            .map(|re| (idx, re))
        })
      })
      .collect();

    let index = TfIdfIndex::build(
      unique.iter().map(|t| (t.name.clone(), format!("{} {}", t.name, t.definition))),
    );

    let prerequisites =
      prerequisites.into_iter().map(|(name, reqs)| (name.to_lowercase(), reqs)).collect();

    Self { topics: unique, by_name, prerequisites, keyword_patterns, index }
  }

  pub fn len(&self) -> usize {
    self.topics.len()
  }

  pub fn is_empty(&self) -> bool {
    self.topics.is_empty()
  }

  pub fn topics(&self) -> &[Topic] {
    &self.topics
  }

  /// Topic names in file order
  pub fn topic_names(&self) -> Vec<String> {
    self.topics.iter().map(|t| t.name.clone()).collect()
  }

  /// Case-insensitive lookup by name
  pub fn get(&self, name: &str) -> Option<&Topic> {
    self.by_name.get(&name.trim().to_lowercase()).map(|&idx| &self.topics[idx])
  }

  pub fn unit_of(&self, name: &str) -> Option<&str> {
    self.get(name).map(|t| t.unit.as_str())
  }

  pub fn prerequisites(&self, name: &str) -> &[String] {
    self.prerequisites.get(&name.trim().to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Whether every prerequisite of `name` is in `learned` (case-insensitive)
  pub fn prerequisites_met(&self, name: &str, learned: &[String]) -> bool {
    let learned: HashSet<String> = learned.iter().map(|t| t.to_lowercase()).collect();
    self.prerequisites(name).iter().all(|p| learned.contains(&p.to_lowercase()))
  }

  /// The whole prerequisite map, keyed by the catalog's spelling of each topic
  pub fn prerequisite_map(&self) -> Map<String, Value> {
    self
      .topics
      .iter()
      .filter_map(|t| {
        let reqs = self.prerequisites(&t.name);
        (!reqs.is_empty()).then(|| (t.name.clone(), Value::from(reqs.to_vec())))
      })
      .collect()
  }

  /// Find the topic a question is about.
  ///
  /// A topic name contained in the question wins (longest name first); after
  /// that, explicit keywords are matched as whole words.
  pub fn find_by_keyword(&self, question: &str) -> Option<&Topic> {
    let question_lower = question.to_lowercase();

    let by_name = self
      .topics
      .iter()
      .filter(|t| !t.name.is_empty() && question_lower.contains(&t.name.to_lowercase()))
      .max_by_key(|t| t.name.chars().count());
    if by_name.is_some() {
      return by_name;
    }

    self
      .keyword_patterns
      .iter()
      .find(|(_, re)| re.is_match(question))
      .map(|(idx, _)| &self.topics[*idx])
  }

  /// Nearest topic by TF-IDF similarity
  pub fn search(&self, question: &str, min_score: f32) -> Option<(&Topic, f32)> {
    let SearchHit { key, score } = self.index.best_match(question, min_score)?;
    self.get(&key).map(|topic| (topic, score))
  }
}

fn read_json(path: &Path) -> Result<Value, TopicError> {
  let content = std::fs::read_to_string(path)
    .map_err(|source| TopicError::Io { path: path.to_path_buf(), source })?;
  serde_json::from_str(&content).map_err(|e| TopicError::parse(path.display().to_string(), e))
}

fn parse_topics(value: &Value) -> Result<Vec<Topic>, TopicError> {
  let units = value.as_object().ok_or_else(|| TopicError::parse("temas", "expected an object"))?;

  let mut topics = Vec::new();
  for (unit, entries) in units {
    let entries = entries
      .as_object()
      .ok_or_else(|| TopicError::parse(format!("temas/{unit}"), "expected an object"))?;
    for (name, body) in entries {
      let body: TopicBody = serde_json::from_value(body.clone())
        .map_err(|e| TopicError::parse(format!("temas/{unit}/{name}"), e))?;
      topics.push(Topic {
        name: name.clone(),
        unit: unit.clone(),
        definition: body.definition,
        advantages: body.advantages,
        example: body.example.filter(|e| !e.trim().is_empty()),
        keywords: body.keywords,
      });
    }
  }
  Ok(topics)
}

fn parse_prerequisites(value: &Value) -> Result<HashMap<String, Vec<String>>, TopicError> {
  let root = value
    .as_object()
    .ok_or_else(|| TopicError::parse("prerequisitos", "expected an object"))?;

  let mut map = HashMap::new();
  for (key, entry) in root {
    match entry {
      Value::Array(_) => {
        map.insert(key.clone(), string_list(entry, key)?);
      }
      Value::Object(topics) => {
        for (topic, reqs) in topics {
          map.insert(topic.clone(), string_list(reqs, topic)?);
        }
      }
      _ => return Err(TopicError::parse(format!("prerequisitos/{key}"), "expected list or object")),
    }
  }
  Ok(map)
}

fn string_list(value: &Value, origin: &str) -> Result<Vec<String>, TopicError> {
  serde_json::from_value(value.clone())
    .map_err(|e| TopicError::parse(format!("prerequisitos/{origin}"), e))
}

/// Shared, swappable handle to the current catalog
#[derive(Clone)]
pub struct TopicHandle {
  current: Arc<RwLock<Arc<TopicCatalog>>>,
  topics_path: PathBuf,
  prerequisites_path: PathBuf,
}

impl TopicHandle {
  pub fn new(catalog: TopicCatalog, topics_path: PathBuf, prerequisites_path: PathBuf) -> Self {
    Self {
      current: Arc::new(RwLock::new(Arc::new(catalog))),
      topics_path,
      prerequisites_path,
    }
  }

  /// Handle over a fixed catalog that never reloads from disk
  pub fn fixed(catalog: TopicCatalog) -> Self {
    Self::new(catalog, PathBuf::new(), PathBuf::new())
  }

  pub async fn snapshot(&self) -> Arc<TopicCatalog> {
    self.current.read().await.clone()
  }

  /// Re-read both files; on failure the previous catalog stays in place
  pub async fn reload(&self) -> Result<usize, TopicError> {
    let catalog = TopicCatalog::load(&self.topics_path, &self.prerequisites_path)?;
    let count = catalog.len();
    *self.current.write().await = Arc::new(catalog);
    Ok(count)
  }

  pub fn spawn_reload_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
    let handle = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        match handle.reload().await {
          Ok(count) => info!("Reloaded topic catalog ({count} topics)"),
          Err(e) => warn!("Topic reload failed, keeping previous catalog: {e}"),
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn sample_topics() -> Value {
    json!({
      "Unidad 1": {
        "Clases": {
          "definición": "Una clase es una plantilla para crear objetos.",
          "ventajas": ["Reutilización"],
          "ejemplo": "class Perro {}"
        },
        "Herencia": {
          "definición": "La herencia permite que una clase derive de otra.",
          "palabras_clave": ["extends", "subclase"]
        }
      },
      "Unidad 2": {
        "Herencia múltiple": {
          "definición": "Una clase con varias superclases directas.",
          "ejemplo": ""
        }
      }
    })
  }

  fn sample_prerequisites() -> Value {
    json!({ "Unidad 1": { "Herencia": ["Clases"] }, "Unidad 2": { "Herencia múltiple": ["Herencia"] } })
  }

  fn catalog() -> TopicCatalog {
    TopicCatalog::from_json(&sample_topics(), &sample_prerequisites()).unwrap()
  }

  #[test]
  fn test_topic_names_keep_file_order() {
    assert_eq!(catalog().topic_names(), vec!["Clases", "Herencia", "Herencia múltiple"]);
  }

  #[test]
  fn test_get_is_case_insensitive() {
    let catalog = catalog();
    let topic = catalog.get("  herencia ").unwrap();
    assert_eq!(topic.name, "Herencia");
    assert_eq!(catalog.unit_of("CLASES"), Some("Unidad 1"));
    assert!(catalog.get("Interfaces").is_none());
  }

  #[test]
  fn test_empty_example_is_dropped() {
    assert!(catalog().get("Herencia múltiple").unwrap().example.is_none());
  }

  #[test]
  fn test_names_with_commas_are_skipped() {
    let topics = json!({
      "Unidad 1": {
        "Clases, objetos": { "definición": "Plantillas e instancias." },
        "Clases": { "definición": "Una clase es una plantilla para crear objetos." }
      }
    });
    let catalog = TopicCatalog::from_json(&topics, &json!({})).unwrap();
    assert_eq!(catalog.topic_names(), vec!["Clases"]);
    assert!(catalog.get("Clases, objetos").is_none());
  }

  #[test]
  fn test_find_by_keyword_prefers_longest_name() {
    let catalog = catalog();
    let found = catalog.find_by_keyword("¿Java soporta herencia múltiple?").unwrap();
    assert_eq!(found.name, "Herencia múltiple");
  }

  #[test]
  fn test_find_by_keyword_uses_whole_word_keywords() {
    let catalog = catalog();
    assert_eq!(catalog.find_by_keyword("¿para qué sirve EXTENDS?").unwrap().name, "Herencia");
    assert!(catalog.find_by_keyword("extendsion").is_none());
    assert!(catalog.find_by_keyword("hilos y procesos").is_none());
  }

  #[test]
  fn test_prerequisites_nested_and_flat() {
    let catalog = catalog();
    assert_eq!(catalog.prerequisites("herencia"), &["Clases".to_string()]);
    assert!(catalog.prerequisites("Clases").is_empty());

    let flat = TopicCatalog::from_json(&sample_topics(), &json!({ "Herencia": ["Clases"] })).unwrap();
    assert_eq!(flat.prerequisites("Herencia"), &["Clases".to_string()]);
  }

  #[test]
  fn test_prerequisites_met() {
    let catalog = catalog();
    assert!(catalog.prerequisites_met("Clases", &[]));
    assert!(!catalog.prerequisites_met("Herencia", &[]));
    assert!(catalog.prerequisites_met("Herencia", &["clases".to_string()]));
  }

  #[test]
  fn test_prerequisite_map_lists_only_topics_with_requirements() {
    let map = catalog().prerequisite_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map["Herencia"], json!(["Clases"]));
  }

  #[test]
  fn test_invalid_topic_body_is_rejected() {
    let bad = json!({ "Unidad": { "Clases": { "ventajas": [] } } });
    assert!(matches!(
      TopicCatalog::from_json(&bad, &json!({})),
      Err(TopicError::Parse { .. })
    ));
  }

  #[test]
  fn test_search_finds_topic_by_definition_words() {
    let catalog = catalog();
    let (topic, score) = catalog.search("plantilla para crear objetos", 0.1).unwrap();
    assert_eq!(topic.name, "Clases");
    assert!(score > 0.1);
  }

  #[test]
  fn test_load_lenient_tolerates_missing_files() {
    let dir = TempDir::new().unwrap();
    let catalog = TopicCatalog::load_lenient(&dir.path().join("nope.json"), &dir.path().join("no.json"));
    assert!(catalog.is_empty());
  }

  #[tokio::test]
  async fn test_reload_keeps_previous_catalog_on_error() {
    let dir = TempDir::new().unwrap();
    let topics_path = dir.path().join("temas.json");
    let prereq_path = dir.path().join("prerequisitos.json");
    std::fs::write(&topics_path, sample_topics().to_string()).unwrap();
    std::fs::write(&prereq_path, "{}").unwrap();

    let handle = TopicHandle::new(
      TopicCatalog::load(&topics_path, &prereq_path).unwrap(),
      topics_path.clone(),
      prereq_path,
    );
    assert_eq!(handle.snapshot().await.len(), 3);

    std::fs::write(&topics_path, "{ not json").unwrap();
    assert!(handle.reload().await.is_err());
    assert_eq!(handle.snapshot().await.len(), 3);

    std::fs::write(&topics_path, json!({ "U": { "Hilos": { "definición": "x" } } }).to_string())
      .unwrap();
    assert_eq!(handle.reload().await.unwrap(), 1);
    assert_eq!(handle.snapshot().await.topic_names(), vec!["Hilos"]);
  }
}
