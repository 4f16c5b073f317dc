//! Quiz generation and grading

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::llm::{extract_json_object, ChatCompletion, ChatRequest};
use crate::topics::TopicCatalog;

const FALLBACK_LEVEL: &str = "basico";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuizError {
  #[error("Tipo de quiz inválido: {0}")]
  InvalidKind(String),

  #[error("Tema desconocido: {0}")]
  UnknownTopic(String),

  #[error("No hay temas disponibles")]
  EmptyCatalog,

  #[error("Formato de quiz inválido: {0}")]
  Invalid(String),
}

impl QuizError {
  fn invalid(message: impl Into<String>) -> Self {
    QuizError::Invalid(message.into())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuizKind {
  #[default]
  #[serde(rename = "opciones")]
  MultipleChoice,
  #[serde(rename = "verdadero_falso")]
  TrueFalse,
}

impl QuizKind {
  pub fn parse(value: &str) -> Result<Self, QuizError> {
    match value.trim() {
      "" | "opciones" => Ok(Self::MultipleChoice),
      "verdadero_falso" => Ok(Self::TrueFalse),
      other => Err(QuizError::InvalidKind(other.to_string())),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MultipleChoice => "opciones",
      Self::TrueFalse => "verdadero_falso",
    }
  }

  pub fn option_count(&self) -> usize {
    match self {
      Self::MultipleChoice => 4,
      Self::TrueFalse => 2,
    }
  }
}

/// A single quiz question as exchanged with the LLM and the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
  #[serde(rename = "pregunta")]
  pub question: String,
  #[serde(rename = "opciones")]
  pub options: Vec<String>,
  #[serde(rename = "respuesta_correcta")]
  pub correct_answer: String,
  #[serde(rename = "tema")]
  pub topic: String,
  #[serde(rename = "nivel")]
  pub level: String,
}

impl Quiz {
  /// Deterministic quiz used whenever the LLM output is unusable
  pub fn fallback(kind: QuizKind, topic: &str) -> Self {
    let (question, options, correct) = match kind {
      QuizKind::MultipleChoice => (
        format!("¿Qué es {topic} en Programación Avanzada?"),
        vec!["Ocultar datos", "Herencia", "Polimorfismo", "Abstracción"],
        "Ocultar datos",
      ),
      QuizKind::TrueFalse => (
        format!("{topic} permite ocultar datos en Programación Avanzada."),
        vec!["Verdadero", "Falso"],
        "Verdadero",
      ),
    };

    Self {
      question,
      options: options.into_iter().map(String::from).collect(),
      correct_answer: correct.to_string(),
      topic: topic.to_string(),
      level: FALLBACK_LEVEL.to_string(),
    }
  }

  pub fn validate(&self, kind: QuizKind) -> Result<(), QuizError> {
    if self.question.trim().is_empty() {
      return Err(QuizError::invalid("la pregunta está vacía"));
    }
    if self.options.len() != kind.option_count() {
      return Err(QuizError::Invalid(format!(
        "se esperaban {} opciones para '{}', se recibieron {}",
        kind.option_count(),
        kind.as_str(),
        self.options.len()
      )));
    }
    if self.options.iter().any(|o| o.trim().is_empty()) {
      return Err(QuizError::invalid("hay opciones vacías"));
    }
    if kind == QuizKind::MultipleChoice {
      let unique: HashSet<&str> = self.options.iter().map(String::as_str).collect();
      if unique.len() != self.options.len() {
        return Err(QuizError::invalid("las opciones no son únicas"));
      }
    }
    if !self.options.contains(&self.correct_answer) {
      return Err(QuizError::Invalid(format!(
        "la respuesta correcta '{}' no está entre las opciones",
        self.correct_answer
      )));
    }
    Ok(())
  }
}

/// Resolve the quiz topic from an optional request value
pub fn choose_topic(catalog: &TopicCatalog, requested: Option<&str>) -> Result<String, QuizError> {
  if catalog.is_empty() {
    return Err(QuizError::EmptyCatalog);
  }

  match requested.map(str::trim).filter(|t| !t.is_empty()) {
    Some(name) => catalog
      .get(name)
      .map(|topic| topic.name.clone())
      .ok_or_else(|| QuizError::UnknownTopic(name.to_string())),
    None => catalog
      .topics()
      .choose(&mut rand::rng())
      .map(|topic| topic.name.clone())
      .ok_or(QuizError::EmptyCatalog),
  }
}

fn quiz_prompt(kind: QuizKind, topic: &str, level: &str) -> String {
  format!(
    "Genera una sola pregunta de quiz de tipo {kind} sobre el tema '{topic}' en Programación Avanzada. \
     Devuelve un JSON válido con las siguientes claves: \
     'pregunta' (texto de la pregunta, máximo 200 caracteres), \
     'opciones' (lista de opciones, cada una máximo 100 caracteres), \
     'respuesta_correcta' (texto exacto de una de las opciones), \
     'tema' (el tema, máximo 50 caracteres), \
     'nivel' (siempre '{level}'). \
     Para tipo 'opciones', incluye exactamente 4 opciones únicas. \
     Para tipo 'verdadero_falso', incluye exactamente 2 opciones ('Verdadero', 'Falso'). \
     Asegúrate de que 'respuesta_correcta' coincide exactamente con una de las opciones en 'opciones'. \
     Ejemplo de formato: \
     {{\"pregunta\": \"¿Qué es la encapsulación en POO?\", \
     \"opciones\": [\"Ocultar datos\", \"Herencia\", \"Polimorfismo\", \"Abstracción\"], \
     \"respuesta_correcta\": \"Ocultar datos\", \"tema\": \"POO\", \"nivel\": \"basico\"}}",
    kind = kind.as_str(),
  )
}

fn parse_quiz(reply: &str, kind: QuizKind) -> Result<Quiz, QuizError> {
  let json = extract_json_object(reply).ok_or_else(|| QuizError::invalid("la respuesta no contiene JSON"))?;
  let quiz: Quiz = serde_json::from_str(json).map_err(|e| QuizError::Invalid(e.to_string()))?;
  quiz.validate(kind)?;
  Ok(quiz)
}

/// Ask the LLM for a quiz, substituting the fallback when anything is off
pub async fn generate(llm: &dyn ChatCompletion, kind: QuizKind, topic: &str, level: &str) -> Quiz {
  let level = if level.trim().is_empty() { FALLBACK_LEVEL } else { level.trim() };
  let request = ChatRequest::new(
    quiz_prompt(kind, topic, level),
    "Genera la pregunta del quiz en formato JSON válido.",
  )
  .max_tokens(300)
  .temperature(0.7);

  let quiz = match llm.complete(&request).await {
    Ok(reply) => parse_quiz(&reply, kind).map_err(|e| {
      error!("Invalid quiz format for '{topic}': {e}");
    }),
    Err(e) => {
      error!("Error generating quiz for '{topic}': {e}");
      Err(())
    }
  };

  match quiz {
    Ok(mut quiz) => {
      quiz.topic = topic.to_string();
      if quiz.level.trim().is_empty() {
        quiz.level = level.to_string();
      }
      info!("Generated {} quiz for topic '{topic}'", kind.as_str());
      quiz
    }
    Err(()) => {
      warn!("Using fallback {} quiz for topic '{topic}'", kind.as_str());
      Quiz::fallback(kind, topic)
    }
  }
}

/// Trim, collapse internal whitespace and lowercase
pub fn normalize_answer(answer: &str) -> String {
  answer.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
  pub correct: bool,
  pub points: i32,
}

pub fn grade(answer: &str, correct_answer: &str, points: i32) -> Grade {
  let correct = normalize_answer(answer) == normalize_answer(correct_answer);
  Grade { correct, points: if correct { points } else { 0 } }
}

pub fn fallback_feedback(grade: &Grade, correct_answer: &str, topic: &str) -> String {
  let verdict = if grade.correct {
    format!("✅ ¡Correcto! Has ganado {} puntos.", grade.points)
  } else {
    format!("❌ Incorrecto. La respuesta correcta era: {correct_answer}. No has ganado puntos.")
  };
  format!("{verdict} Tema: {topic}. ¿Deseas saber más?")
}

/// Short LLM explanation of a graded answer
pub async fn feedback(
  llm: &dyn ChatCompletion,
  question: &str,
  answer: &str,
  correct_answer: &str,
  topic: &str,
  grade: &Grade,
) -> String {
  let prompt = format!(
    "Eres un tutor de Programación Avanzada para estudiantes de Ingeniería en Telemática. \
     El usuario respondió a la pregunta '{question}' con la respuesta '{answer}'. \
     La respuesta correcta es '{correct_answer}'. El tema es '{topic}'. \
     Proporciona una retroalimentación clara, educativa y concisa en español (máximo 200 palabras). \
     Si la respuesta es correcta, explica brevemente por qué es correcta. \
     Si es incorrecta, explica por qué la respuesta del usuario es incorrecta y por qué la respuesta correcta es la adecuada. \
     Termina con '¿Deseas saber más?'"
  );
  let request = ChatRequest::new(prompt, "Proporciona la retroalimentación.").max_tokens(300).temperature(0.7);

  match llm.complete(&request).await {
    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
    Ok(_) => fallback_feedback(grade, correct_answer, topic),
    Err(e) => {
      error!("Error getting quiz feedback from the LLM: {e}");
      fallback_feedback(grade, correct_answer, topic)
    }
  }
}
