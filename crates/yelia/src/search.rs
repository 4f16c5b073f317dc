//! Lightweight lexical search over the topic catalog
//!
//! TF-IDF weighting with smoothed idf and L2-normalised vectors, ranked by
//! cosine similarity. The catalog is small (tens of topics), so vectors are
//! kept dense.

use std::collections::HashMap;

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    0.0
  } else {
    dot_product / (magnitude_a * magnitude_b)
  }
}

/// Split text into lowercase word tokens of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
  text
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|token| token.chars().count() >= 2)
    .map(str::to_string)
    .collect()
}

/// A scored search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
  pub key: String,
  pub score: f32,
}

/// TF-IDF index over a fixed set of documents
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
  keys: Vec<String>,
  vocabulary: HashMap<String, usize>,
  idf: Vec<f32>,
  vectors: Vec<Vec<f32>>,
}

impl TfIdfIndex {
  /// Build an index from `(key, text)` documents
  pub fn build<I, K, T>(documents: I) -> Self
  where
    I: IntoIterator<Item = (K, T)>,
    K: Into<String>,
    T: AsRef<str>,
  {
    let mut keys = Vec::new();
    let mut tokenized = Vec::new();
    let mut vocabulary: HashMap<String, usize> = HashMap::new();

    for (key, text) in documents {
      let tokens = tokenize(text.as_ref());
      for token in &tokens {
        let next_id = vocabulary.len();
        vocabulary.entry(token.clone()).or_insert(next_id);
      }
      keys.push(key.into());
      tokenized.push(tokens);
    }

    let mut document_frequency = vec![0usize; vocabulary.len()];
    for tokens in &tokenized {
      let mut seen = vec![false; vocabulary.len()];
      for token in tokens {
        let id = vocabulary[token];
        if !seen[id] {
          seen[id] = true;
          document_frequency[id] += 1;
        }
      }
    }

    let n = tokenized.len() as f32;
    let idf: Vec<f32> =
      document_frequency.iter().map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0).collect();

    let vectors = tokenized
      .iter()
      .map(|tokens| weigh(tokens.iter().filter_map(|t| vocabulary.get(t).copied()), &idf))
      .collect();

    Self { keys, vocabulary, idf, vectors }
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  /// Return up to `k` documents with a positive score, best first
  pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
    if self.is_empty() || k == 0 {
      return Vec::new();
    }

    let query_vector = weigh(
      tokenize(query).iter().filter_map(|t| self.vocabulary.get(t).copied()),
      &self.idf,
    );

    let mut hits: Vec<SearchHit> = self
      .vectors
      .iter()
      .zip(&self.keys)
      .map(|(vector, key)| SearchHit {
        key: key.clone(),
        score: cosine_similarity(&query_vector, vector),
      })
      .filter(|hit| hit.score > 0.0)
      .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
  }

  /// Best hit at or above `min_score`
  pub fn best_match(&self, query: &str, min_score: f32) -> Option<SearchHit> {
    self.search(query, 1).into_iter().find(|hit| hit.score >= min_score)
  }
}

/// Raw term counts times idf, L2-normalised
fn weigh(term_ids: impl Iterator<Item = usize>, idf: &[f32]) -> Vec<f32> {
  let mut vector = vec![0.0f32; idf.len()];
  for id in term_ids {
    vector[id] += 1.0;
  }
  for (weight, idf) in vector.iter_mut().zip(idf) {
    *weight *= idf;
  }

  let norm = vector.iter().map(|w| w * w).sum::<f32>().sqrt();
  if norm > 0.0 {
    vector.iter_mut().for_each(|w| *w /= norm);
  }
  vector
}

/// Coarse intent of a free-text message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
  Greeting,
  Definition,
  Example,
  Quiz,
  ChangeLevel,
}

/// Keyword intent classifier; anything unrecognised is a definition request
pub fn classify_intent(text: &str) -> Intent {
  let text = text.to_lowercase();
  let has_any = |words: &[&str]| words.iter().any(|w| text.contains(w));

  if has_any(&["hola", "saludo", "buenos dias", "buenos días"]) {
    Intent::Greeting
  } else if has_any(&["ejemplo"]) {
    Intent::Example
  } else if has_any(&["definicion", "definición", "que es", "qué es", "explica"]) {
    Intent::Definition
  } else if has_any(&["quiz", "prueba", "examen"]) {
    Intent::Quiz
  } else if has_any(&["cambiar nivel", "nivel"]) {
    Intent::ChangeLevel
  } else {
    Intent::Definition
  }
}
