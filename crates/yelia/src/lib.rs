//! YELIA - Programming Course Tutor
//!
//! Answers course questions from a static topic catalog or through the Groq
//! chat-completion API, generates and grades quizzes, recommends the next
//! topic to study and keeps per-user progress and conversations in PostgreSQL.

pub mod config;
pub mod llm;
pub mod quiz;
pub mod recommend;
pub mod resolver;
pub mod sanitize;
pub mod search;
pub mod server;
pub mod store;
pub mod topics;
pub mod tts;

pub use config::ServerConfig;
pub use resolver::ExplanationLevel;
pub use topics::{TopicCatalog, TopicHandle};
