//! Next-topic recommendation
//!
//! The LLM proposes a topic, but the pick is constrained to the eligible set
//! (not learned, not recently recommended) and to topics whose prerequisites
//! the user has already learned whenever such a topic exists.

use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::llm::{extract_json_object, ChatCompletion, ChatRequest};
use crate::resolver::{HistoryEntry, MAX_HISTORY};
use crate::topics::TopicCatalog;

/// Recommendation history entries kept per user
pub const MAX_RECOMMENDATION_HISTORY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
  pub topic: String,
  pub text: String,
  /// Updated recommendation history, oldest first
  pub history: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendationReply {
  recommendation: String,
}

fn lowercase_set(names: &[String]) -> HashSet<String> {
  names.iter().map(|n| n.trim().to_lowercase()).collect()
}

/// Topics the user may be offered, following the window rules
pub fn eligible_topics(
  catalog: &TopicCatalog,
  learned: &[String],
  recommended: &[String],
  window: usize,
) -> Vec<String> {
  let learned = lowercase_set(learned);
  let all = catalog.topic_names();

  let mut not_learned: Vec<String> =
    all.iter().filter(|t| !learned.contains(&t.to_lowercase())).cloned().collect();
  if not_learned.is_empty() {
    not_learned = all;
  }

  let start = recommended.len().saturating_sub(window);
  let recent = lowercase_set(&recommended[start..]);
  let eligible: Vec<String> =
    not_learned.iter().filter(|t| !recent.contains(&t.to_lowercase())).cloned().collect();

  if eligible.is_empty() {
    not_learned
  } else {
    eligible
  }
}

fn recommendation_prompt(
  catalog: &TopicCatalog,
  learned: &[String],
  eligible: &[String],
  history: &[HistoryEntry],
) -> String {
  let start = history.len().saturating_sub(MAX_HISTORY);
  let context: Vec<String> = history[start..]
    .iter()
    .map(|h| format!("- Pregunta: {}\n  Respuesta: {}", h.question, h.answer))
    .collect();
  let prerequisites = serde_json::Value::Object(catalog.prerequisite_map());

  format!(
    "Eres un tutor de Programación Avanzada para estudiantes de Ingeniería en Telemática. \
     Tu tarea es recomendar UN SOLO tema de Programación Avanzada basado en el historial de \
     interacciones y los temas ya aprendidos. Elige un tema de los disponibles que no haya sido \
     aprendido, considerando el contexto del historial y los prerequisitos. Devuelve un objeto \
     JSON con una clave 'recommendation' que contenga el nombre de UN SOLO tema (por ejemplo, \
     {{\"recommendation\": \"Polimorfismo\"}}). NO incluyas explicaciones adicionales fuera del JSON.\n\
     Historial reciente:\n{}\nTemas aprendidos: {}\nTemas disponibles: {}\nPrerequisitos: {}",
    context.join("\n"),
    learned.join(","),
    eligible.join(","),
    prerequisites,
  )
}

fn parse_pick(reply: &str, eligible: &[String]) -> Option<String> {
  let json = extract_json_object(reply)?;
  let parsed: RecommendationReply = serde_json::from_str(json).ok()?;
  let wanted = parsed.recommendation.trim().to_lowercase();
  eligible.iter().find(|t| t.to_lowercase() == wanted).cloned()
}

/// Pick the next topic for a user.
///
/// Returns `None` only when the catalog is empty.
pub async fn recommend(
  llm: &dyn ChatCompletion,
  catalog: &TopicCatalog,
  learned: &[String],
  recommended: &[String],
  history: &[HistoryEntry],
  window: usize,
) -> Option<Recommendation> {
  if catalog.is_empty() {
    return None;
  }

  let eligible = eligible_topics(catalog, learned, recommended, window);
  let request = ChatRequest::new(
    recommendation_prompt(catalog, learned, &eligible, history),
    "Recomienda un tema.",
  )
  .max_tokens(50)
  .temperature(0.7);

  let llm_pick = match llm.complete(&request).await {
    Ok(reply) => {
      let pick = parse_pick(&reply, &eligible);
      if pick.is_none() {
        warn!("LLM recommendation '{}' is not an eligible topic", reply.trim());
      }
      pick
    }
    Err(e) => {
      warn!("Error getting recommendation from the LLM: {e}");
      None
    }
  };

  let mut rng = rand::rng();
  let mut pick = match llm_pick {
    Some(pick) => pick,
    None => eligible.choose(&mut rng)?.clone(),
  };

  if !catalog.prerequisites_met(&pick, learned) {
    let ready: Vec<&String> =
      eligible.iter().filter(|t| catalog.prerequisites_met(t, learned)).collect();
    match ready.choose(&mut rng) {
      Some(alternative) => {
        debug!("'{pick}' has unmet prerequisites, recommending '{alternative}' instead");
        pick = (*alternative).clone();
      }
      None => debug!("No eligible topic has its prerequisites met, keeping '{pick}'"),
    }
  }

  let mut updated = recommended.to_vec();
  updated.push(pick.clone());
  if updated.len() > MAX_RECOMMENDATION_HISTORY {
    updated.drain(..updated.len() - MAX_RECOMMENDATION_HISTORY);
  }

  info!("Recommending topic '{pick}'");
  Some(Recommendation { text: format!("Te recomiendo estudiar: {pick}"), topic: pick, history: updated })
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
          "Clases": { "definición": "Plantillas de objetos." },
          "Herencia": { "definición": "Reutilizar clases." },
          "Polimorfismo": { "definición": "Mismo mensaje, distinto comportamiento." }
        },
        "Unidad 2": {
          "Hilos": { "definición": "Ejecución concurrente." }
        }
      }),
      &json!({
        "Unidad 1": { "Herencia": ["Clases"], "Polimorfismo": ["Herencia"] },
        "Unidad 2": { "Hilos": ["Clases"] }
      }),
    )
    .unwrap()
  }

  fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  fn llm_replying(reply: &'static str) -> MockChatCompletion {
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(1).returning(move |_| Ok(reply.to_string()));
    llm
  }

  #[test]
  fn test_eligible_excludes_learned_and_window() {
    let catalog = catalog();
    let eligible = eligible_topics(&catalog, &names(&["Clases"]), &names(&["Hilos", "Herencia"]), 1);
    assert_eq!(eligible, names(&["Herencia", "Polimorfismo"]));

    let eligible = eligible_topics(&catalog, &names(&["Clases"]), &names(&["Hilos", "Herencia"]), 3);
    assert_eq!(eligible, names(&["Polimorfismo"]));
  }

  #[test]
  fn test_eligible_falls_back_when_everything_is_excluded() {
    let catalog = catalog();
    let all = names(&["Clases", "Herencia", "Polimorfismo", "Hilos"]);
    assert_eq!(eligible_topics(&catalog, &all, &[], 3), all);
    assert_eq!(
      eligible_topics(&catalog, &names(&["Clases", "Herencia", "Hilos"]), &names(&["Polimorfismo"]), 3),
      names(&["Polimorfismo"])
    );
  }

  #[tokio::test]
  async fn test_llm_pick_is_accepted_case_insensitively() {
    let catalog = catalog();
    let llm = llm_replying(r#"{"recommendation": "herencia"}"#);
    let rec = recommend(&llm, &catalog, &names(&["Clases"]), &[], &[], 3).await.unwrap();
    assert_eq!(rec.topic, "Herencia");
    assert_eq!(rec.text, "Te recomiendo estudiar: Herencia");
    assert_eq!(rec.history, names(&["Herencia"]));
  }

  #[tokio::test]
  async fn test_recent_topics_are_never_repeated() {
    let catalog = catalog();
    let learned = names(&["Clases"]);
    let recent = names(&["Hilos", "Herencia"]);
    for _ in 0..20 {
      let llm = llm_replying(r#"{"recommendation": "Hilos"}"#);
      let rec = recommend(&llm, &catalog, &learned, &recent, &[], 3).await.unwrap();
      assert_eq!(rec.topic, "Polimorfismo");
    }
  }

  #[tokio::test]
  async fn test_unmet_prerequisites_trigger_repick() {
    let catalog = catalog();
    for _ in 0..20 {
      let llm = llm_replying(r#"{"recommendation": "Polimorfismo"}"#);
      let rec = recommend(&llm, &catalog, &names(&["Clases"]), &[], &[], 3).await.unwrap();
      assert!(rec.topic == "Herencia" || rec.topic == "Hilos", "got {}", rec.topic);
    }
  }

  #[tokio::test]
  async fn test_llm_failure_picks_randomly_from_eligible() {
    let catalog = catalog();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().returning(|_| Err(LlmError::Timeout));
    let rec = recommend(&llm, &catalog, &[], &[], &[], 3).await.unwrap();
    assert_eq!(rec.topic, "Clases");
  }

  #[tokio::test]
  async fn test_history_keeps_last_five() {
    let catalog = catalog();
    let llm = llm_replying(r#"{"recommendation": "Clases"}"#);
    let previous = names(&["Hilos", "Herencia", "Hilos", "Polimorfismo", "Herencia"]);
    let rec = recommend(&llm, &catalog, &[], &previous, &[], 1).await.unwrap();
    assert_eq!(rec.history, names(&["Herencia", "Hilos", "Polimorfismo", "Herencia", "Clases"]));
  }

  #[tokio::test]
  async fn test_empty_catalog_has_no_recommendation() {
    let catalog = TopicCatalog::from_json(&json!({}), &json!({})).unwrap();
    let mut llm = MockChatCompletion::new();
    llm.expect_complete().times(0);
    assert!(recommend(&llm, &catalog, &[], &[], &[], 3).await.is_none());
  }
}
