//! Answer resolution
//!
//! A question is answered by the first step that produces something:
//! canned greeting replies, the topic catalog (keyword match, then TF-IDF),
//! and finally the LLM with a level-specific prompt.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::llm::{ChatCompletion, ChatRequest};
use crate::search::{classify_intent, Intent};
use crate::topics::{Topic, TopicCatalog};

/// Reply used whenever the LLM cannot produce an answer
pub const APOLOGY: &str = "Lo siento, no pude procesar tu pregunta. Intenta de nuevo.";

/// History pairs included in prompts
pub const MAX_HISTORY: usize = 5;

const HELLO_REPLY: &str =
  "¡Hola! Estoy listo para ayudarte con Programación Avanzada. ¿Qué tema quieres explorar?";
const THANKS_REPLY: &str = "¡De nada! Sigue aprendiendo, estoy aquí para apoyarte.";
const GOODBYE_REPLY: &str = "¡Hasta pronto! Espero verte de nuevo para seguir aprendiendo.";

static GREETINGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
  [
    (r"^(hola|buen[oa]s? d[ií]as|buenas tardes|buenas noches)( yelia)?$", HELLO_REPLY),
    (r"^(muchas )?gracias( yelia)?$", THANKS_REPLY),
    (r"^(adi[oó]s|chao|hasta luego)( yelia)?$", GOODBYE_REPLY),
  ]
  .into_iter()
  .filter_map(|(pattern, reply)| Regex::new(pattern).ok().map(|re| (re, reply)))
  .collect()
});

static CLOSING_QUESTION: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[¿?]Deseas saber más\?").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*").expect("valid regex"));

/// How much detail an answer carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExplanationLevel {
  #[default]
  #[serde(rename = "basica")]
  Basic,
  #[serde(rename = "ejemplos")]
  Examples,
  #[serde(rename = "avanzada")]
  Advanced,
}

impl ExplanationLevel {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_lowercase().as_str() {
      "basica" | "básica" | "basic" => Some(Self::Basic),
      "ejemplos" | "examples" => Some(Self::Examples),
      "avanzada" | "advanced" => Some(Self::Advanced),
      _ => None,
    }
  }

  /// Parse a request value, falling back to `Basic` for anything unknown
  pub fn parse_or_default(value: Option<&str>) -> Self {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
      None => Self::Basic,
      Some(v) => Self::parse(v).unwrap_or_else(|| {
        warn!("Invalid explanation level '{v}', using 'basica'");
        Self::Basic
      }),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basica",
      Self::Examples => "ejemplos",
      Self::Advanced => "avanzada",
    }
  }

  fn instructions(&self) -> &'static str {
    match self {
      Self::Basic => "Explicación simple y breve, sin tecnicismos profundos, sin ejemplos de código ni ventajas.",
      Self::Examples => "Explicación clara con un ejemplo práctico en Java relevante al concepto, en un bloque de código con comentarios explicativos.",
      Self::Advanced => "Explicación técnica y detallada: definición, ventajas, análisis teórico y un ejemplo en Java.",
    }
  }
}

/// One previous question/answer pair sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  #[serde(rename = "pregunta", default)]
  pub question: String,
  #[serde(rename = "respuesta", default)]
  pub answer: String,
}

/// Which step produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
  Greeting,
  Catalog,
  Search,
  Llm,
  Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
  pub answer: String,
  pub source: AnswerSource,
  pub topic: Option<String>,
}

impl Resolution {
  fn new(answer: impl Into<String>, source: AnswerSource, topic: Option<String>) -> Self {
    Self { answer: answer.into(), source, topic }
  }
}

/// Canned reply for greetings and courtesy phrases
pub fn greeting_reply(question: &str) -> Option<&'static str> {
  let stripped: String = question
    .to_lowercase()
    .chars()
    .map(|c| if "¡!¿?.,".contains(c) { ' ' } else { c })
    .collect();
  let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

  GREETINGS.iter().find(|(re, _)| re.is_match(&normalized)).map(|(_, reply)| *reply)
}

/// Render a catalog topic at the requested level
pub fn format_topic(topic: &Topic, level: ExplanationLevel) -> String {
  let mut answer = topic.definition.trim().to_string();

  if level == ExplanationLevel::Advanced && !topic.advantages.is_empty() {
    answer.push_str("\n\n**Ventajas**:\n");
    let bullets: Vec<String> = topic.advantages.iter().map(|a| format!("- {a}")).collect();
    answer.push_str(&bullets.join("\n"));
  }

  if level != ExplanationLevel::Basic {
    if let Some(example) = &topic.example {
      answer.push_str(&format!("\n\n**Ejemplo**:\n```java\n{}\n```", example.trim_end()));
    }
  }

  answer
}

/// Strip example, advantage and prerequisite sections from a basic-level answer
pub fn clean_basic_answer(text: &str) -> String {
  let mut cleaned = text.to_string();

  for header in ["Ejemplo:", "Ventajas:", "Prerequisitos recomendados:"] {
    while let Some(start) = cleaned.find(header) {
      let end = cleaned[start..].find("\n##").map(|offset| start + offset + 1).unwrap_or(cleaned.len());
      cleaned.replace_range(start..end, "");
    }
  }

  let cleaned = CLOSING_QUESTION.replace_all(&cleaned, "");
  let cleaned = BLANK_LINES.replace_all(&cleaned, "\n");
  cleaned.trim().to_string()
}

fn history_context(history: &[HistoryEntry]) -> String {
  if history.is_empty() {
    return String::new();
  }
  let start = history.len().saturating_sub(MAX_HISTORY);
  let lines: Vec<String> = history[start..]
    .iter()
    .map(|h| format!("- Pregunta: {}\n  Respuesta: {}", h.question, h.answer))
    .collect();
  format!("\nHistorial reciente:\n{}", lines.join("\n"))
}

fn build_prompt(catalog: &TopicCatalog, history: &[HistoryEntry], level: ExplanationLevel) -> String {
  format!(
    "Eres YELIA, un tutor de Programación Avanzada para estudiantes de Ingeniería en Telemática. \
     Responde en español de manera clara, precisa y específica al concepto preguntado, \
     evitando definiciones genéricas. \
     Nivel de explicación: '{}'. {} \
     Temas del curso: {}.{}\n\
     Devuelve solo el texto de la respuesta en formato Markdown, sin envolverlo en JSON.",
    level.as_str(),
    level.instructions(),
    catalog.topic_names().join(", "),
    history_context(history),
  )
}

/// Resolves free-text questions against the catalog and the LLM
pub struct AnswerResolver<'a> {
  catalog: &'a TopicCatalog,
  llm: &'a dyn ChatCompletion,
  min_search_score: f32,
}

impl<'a> AnswerResolver<'a> {
  pub fn new(catalog: &'a TopicCatalog, llm: &'a dyn ChatCompletion, min_search_score: f32) -> Self {
    Self { catalog, llm, min_search_score }
  }

  pub async fn resolve(
    &self,
    question: &str,
    history: &[HistoryEntry],
    level: ExplanationLevel,
  ) -> Resolution {
    if let Some(reply) = greeting_reply(question) {
      return Resolution::new(reply, AnswerSource::Greeting, None);
    }

    let level = if level == ExplanationLevel::Basic && classify_intent(question) == Intent::Example {
      ExplanationLevel::Examples
    } else {
      level
    };

    if let Some(topic) = self.catalog.find_by_keyword(question) {
      debug!("Question matched topic '{}' by keyword", topic.name);
      return Resolution::new(format_topic(topic, level), AnswerSource::Catalog, Some(topic.name.clone()));
    }

    if let Some((topic, score)) = self.catalog.search(question, self.min_search_score) {
      debug!("Question matched topic '{}' by TF-IDF (score {score:.3})", topic.name);
      return Resolution::new(format_topic(topic, level), AnswerSource::Search, Some(topic.name.clone()));
    }

    let request = ChatRequest::new(build_prompt(self.catalog, history, level), question)
      .max_tokens(1000)
      .temperature(0.5);

    match self.llm.complete(&request).await {
      Ok(reply) => {
        let answer = if level == ExplanationLevel::Basic { clean_basic_answer(&reply) } else { reply.trim().to_string() };
        if answer.is_empty() {
          warn!("LLM answer was empty after cleanup");
          Resolution::new(APOLOGY, AnswerSource::Fallback, None)
        } else {
          Resolution::new(answer, AnswerSource::Llm, None)
        }
      }
      Err(e) => {
        error!("Error processing question with the LLM: {e}");
        Resolution::new(APOLOGY, AnswerSource::Fallback, None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::llm::{LlmError, MockChatCompletion};
  use serde_json::json;

  fn catalog() -> TopicCatalog {
    TopicCatalog::from_json(
      &json!({
        "Unidad 1": {
          "Encapsulamiento": {
            "definición": "Ocultar el estado interno de un objeto tras una interfaz pública.",
            "ventajas": ["Menor acoplamiento", "Invariantes protegidas"],
            "ejemplo": "private int saldo;"
          }
        }
      }),
      &json!({}),
    )
    .unwrap()
  }

  #[test]
  fn test_greetings_match_normalized_input() {
    assert_eq!(greeting_reply("¡Hola!"), Some(HELLO_REPLY));
    assert_eq!(greeting_reply("  buenos   días "), Some(HELLO_REPLY));
    assert_eq!(greeting_reply("Muchas gracias."), Some(THANKS_REPLY));
    assert_eq!(greeting_reply("adios"), Some(GOODBYE_REPLY));
    assert_eq!(greeting_reply("hola, ¿qué es la herencia?"), None);
  }

  #[test]
  fn test_level_parsing() {
    assert_eq!(ExplanationLevel::parse("Avanzada"), Some(ExplanationLevel::Advanced));
    assert_eq!(ExplanationLevel::parse("básica"), Some(ExplanationLevel::Basic));
    assert_eq!(ExplanationLevel::parse("experto"), None);
    assert_eq!(ExplanationLevel::parse_or_default(Some("experto")), ExplanationLevel::Basic);
    assert_eq!(ExplanationLevel::parse_or_default(None), ExplanationLevel::Basic);
    assert_eq!(ExplanationLevel::Examples.as_str(), "ejemplos");
  }

  #[test]
  fn test_format_topic_by_level() {
    let catalog = catalog();
    let topic = catalog.get("Encapsulamiento").unwrap();

    let basic = format_topic(topic, ExplanationLevel::Basic);
    assert!(!basic.contains("Ejemplo"));

    let examples = format_topic(topic, ExplanationLevel::Examples);
    assert!(examples.contains("```java\nprivate int saldo;\n```"));
    assert!(!examples.contains("Ventajas"));

    let advanced = format_topic(topic, ExplanationLevel::Advanced);
    assert!(advanced.contains("**Ventajas**:\n- Menor acoplamiento\n- Invariantes protegidas"));
    assert!(advanced.contains("**Ejemplo**"));
  }

  #[test]
  fn test_clean_basic_answer_strips_sections() {
    let raw = "La herencia reutiliza código.\n\nEjemplo: class A extends B {}\n## Resumen\nBreve.\n\nVentajas: menos código\n¿Deseas saber más?";
    let cleaned = clean_basic_answer(raw);
    assert_eq!(cleaned, "La herencia reutiliza código.\n## Resumen\nBreve.");
  }

  #[tokio::test]
  async fn test_greeting_never_calls_llm() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(0);

    let resolver = AnswerResolver::new(&catalog, &llm, 0.35);
    let resolution = resolver.resolve("Hola", &[], ExplanationLevel::Basic).await;
    assert_eq!(resolution.source, AnswerSource::Greeting);
    assert_eq!(resolution.answer, HELLO_REPLY);
  }

  #[tokio::test]
  async fn test_catalog_match_skips_llm_and_honours_example_intent() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(0);

    let resolver = AnswerResolver::new(&catalog, &llm, 0.35);
    let resolution =
      resolver.resolve("dame un ejemplo de encapsulamiento", &[], ExplanationLevel::Basic).await;
    assert_eq!(resolution.source, AnswerSource::Catalog);
    assert_eq!(resolution.topic.as_deref(), Some("Encapsulamiento"));
    assert!(resolution.answer.contains("```java"));

    let resolution =
      resolver.resolve("explica con un ejemplo el encapsulamiento", &[], ExplanationLevel::Basic).await;
    assert!(resolution.answer.contains("```java"));
  }

  #[tokio::test]
  async fn test_search_step_answers_from_definition_words() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(0);

    let resolver = AnswerResolver::new(&catalog, &llm, 0.2);
    let resolution =
      resolver.resolve("¿cómo ocultar el estado interno?", &[], ExplanationLevel::Basic).await;
    assert_eq!(resolution.source, AnswerSource::Search);
  }

  #[tokio::test]
  async fn test_llm_answer_is_cleaned_for_basic_level() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm
      .expect_complete()
      .withf(|req| req.system_prompt().contains("'basica'") && req.max_tokens == 1000)
      .times(1)
      .returning(|_| Ok("Un hilo es un flujo de ejecución.\n\nEjemplo: Thread t;".to_string()));

    let resolver = AnswerResolver::new(&catalog, &llm, 0.35);
    let resolution = resolver.resolve("¿qué es un hilo?", &[], ExplanationLevel::Basic).await;
    assert_eq!(resolution.source, AnswerSource::Llm);
    assert_eq!(resolution.answer, "Un hilo es un flujo de ejecución.");
  }

  #[tokio::test]
  async fn test_llm_failure_degrades_to_apology() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(1).returning(|_| Err(LlmError::Unavailable { status: 503 }));

    let resolver = AnswerResolver::new(&catalog, &llm, 0.35);
    let resolution = resolver.resolve("¿qué es un hilo?", &[], ExplanationLevel::Advanced).await;
    assert_eq!(resolution.source, AnswerSource::Fallback);
    assert_eq!(resolution.answer, APOLOGY);
  }

  #[test]
  fn test_history_context_keeps_last_five() {
    let history: Vec<HistoryEntry> = (0..7)
      .map(|i| HistoryEntry { question: format!("p{i}"), answer: format!("r{i}") })
      .collect();
    let context = history_context(&history);
    assert!(!context.contains("p1\n"));
    assert!(context.contains("- Pregunta: p2\n  Respuesta: r2"));
    assert!(context.contains("p6"));
  }
}
