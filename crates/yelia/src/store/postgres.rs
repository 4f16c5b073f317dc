//! PostgreSQL store backed by an sqlx connection pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::info;

use super::{
  join_list, split_list, Avatar, Conversation, InteractionRecord, Message, MessageRole,
  NewMessage, Progress, QuizRecord, Store, StoreError, DEFAULT_AVATAR,
};

#[derive(Debug, FromRow)]
struct ProgressRow {
  usuario: String,
  puntos: i32,
  temas_aprendidos: String,
  avatar_id: String,
  temas_recomendados: String,
}

impl From<ProgressRow> for Progress {
  fn from(row: ProgressRow) -> Self {
    Self {
      user: row.usuario,
      points: row.puntos,
      learned: split_list(&row.temas_aprendidos),
      avatar_id: row.avatar_id,
      recommended: split_list(&row.temas_recomendados),
    }
  }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
  id: i32,
  usuario: String,
  nombre: String,
  created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
  fn from(row: ConversationRow) -> Self {
    Self { id: row.id, user: row.usuario, name: row.nombre, created_at: row.created_at }
  }
}

#[derive(Debug, FromRow)]
struct MessageRow {
  id: i32,
  conv_id: i32,
  role: String,
  content: String,
  tema: Option<String>,
  created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
  type Error = StoreError;

  fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
    let role = MessageRole::parse(&row.role)
      .ok_or_else(|| StoreError::Corrupt(format!("unknown message role '{}'", row.role)))?;
    Ok(Self {
      id: row.id,
      conv_id: row.conv_id,
      role,
      content: row.content,
      topic: row.tema,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, FromRow)]
struct AvatarRow {
  avatar_id: String,
  nombre: String,
  url: String,
  animation_url: String,
}

const PROGRESS_COLUMNS: &str = "usuario, COALESCE(puntos, 0) AS puntos, \
  COALESCE(temas_aprendidos, '') AS temas_aprendidos, \
  COALESCE(avatar_id, 'default') AS avatar_id, \
  COALESCE(temas_recomendados, '') AS temas_recomendados";

pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  /// Connect and bring the schema up to date
  pub async fn connect(url: &str, pool_size: u32) -> Result<Self, StoreError> {
    let pool = PgPoolOptions::new()
      .max_connections(pool_size.max(1))
      .acquire_timeout(Duration::from_secs(10))
      .connect(url)
      .await?;

    let store = Self { pool };
    store.migrate().await?;
    Ok(store)
  }

  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    info!("Database schema is up to date");
    Ok(())
  }
}

#[async_trait]
impl Store for PgStore {
  fn backend(&self) -> &'static str {
    "postgres"
  }

  async fn health(&self) -> Result<(), StoreError> {
    sqlx::query("SELECT 1").execute(&self.pool).await?;
    Ok(())
  }

  async fn load_progress(&self, user: &str) -> Result<Progress, StoreError> {
    let row: Option<ProgressRow> =
      sqlx::query_as(&format!("SELECT {PROGRESS_COLUMNS} FROM progreso WHERE usuario = $1"))
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

    Ok(row.map(Progress::from).unwrap_or_else(|| Progress::new(user)))
  }

  async fn save_progress(&self, progress: &Progress) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO progreso (usuario, puntos, temas_aprendidos, avatar_id, temas_recomendados)
      VALUES ($1, $2, $3, $4, $5)
      ON CONFLICT (usuario) DO UPDATE SET
        puntos = EXCLUDED.puntos,
        temas_aprendidos = EXCLUDED.temas_aprendidos,
        avatar_id = EXCLUDED.avatar_id,
        temas_recomendados = EXCLUDED.temas_recomendados
      "#,
    )
    .bind(&progress.user)
    .bind(progress.points)
    .bind(join_list(&progress.learned))
    .bind(&progress.avatar_id)
    .bind(join_list(&progress.recommended))
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn set_avatar(&self, user: &str, avatar_id: &str) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO progreso (usuario, avatar_id) VALUES ($1, $2)
      ON CONFLICT (usuario) DO UPDATE SET avatar_id = EXCLUDED.avatar_id
      "#,
    )
    .bind(user)
    .bind(avatar_id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn log_interaction(&self, record: &InteractionRecord) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO logs (usuario, pregunta, respuesta, nivel_explicacion, avatar_id) \
       VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&record.user)
    .bind(&record.question)
    .bind(&record.answer)
    .bind(&record.level)
    .bind(record.avatar_id.as_deref().unwrap_or(DEFAULT_AVATAR))
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn log_quiz(&self, record: &QuizRecord) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO quiz_logs (usuario, pregunta, respuesta, es_correcta, puntos, tema) \
       VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&record.user)
    .bind(&record.question)
    .bind(&record.answer)
    .bind(record.correct)
    .bind(record.points)
    .bind(&record.topic)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn create_conversation(&self, user: &str, name: &str) -> Result<Conversation, StoreError> {
    let row: ConversationRow = sqlx::query_as(
      "INSERT INTO conversations (usuario, nombre) VALUES ($1, $2) \
       RETURNING id, usuario, nombre, created_at",
    )
    .bind(user)
    .bind(name)
    .fetch_one(&self.pool)
    .await?;
    Ok(row.into())
  }

  async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, StoreError> {
    let rows: Vec<ConversationRow> = sqlx::query_as(
      "SELECT id, usuario, nombre, created_at FROM conversations \
       WHERE usuario = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Conversation::from).collect())
  }

  async fn get_conversation(&self, user: &str, id: i32) -> Result<Option<Conversation>, StoreError> {
    let row: Option<ConversationRow> = sqlx::query_as(
      "SELECT id, usuario, nombre, created_at FROM conversations WHERE id = $1 AND usuario = $2",
    )
    .bind(id)
    .bind(user)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(Conversation::from))
  }

  async fn rename_conversation(&self, user: &str, id: i32, name: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE conversations SET nombre = $1 WHERE id = $2 AND usuario = $3")
      .bind(name)
      .bind(id)
      .bind(user)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn delete_conversation(&self, user: &str, id: i32) -> Result<bool, StoreError> {
    // Messages go with it through ON DELETE CASCADE
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND usuario = $2")
      .bind(id)
      .bind(user)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn append_message(&self, conv_id: i32, message: &NewMessage) -> Result<Message, StoreError> {
    let row: MessageRow = sqlx::query_as(
      "INSERT INTO messages (conv_id, role, content, tema) VALUES ($1, $2, $3, $4) \
       RETURNING id, conv_id, role, content, tema, created_at",
    )
    .bind(conv_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(message.topic.as_deref())
    .fetch_one(&self.pool)
    .await?;
    row.try_into()
  }

  async fn list_messages(&self, conv_id: i32) -> Result<Vec<Message>, StoreError> {
    let rows: Vec<MessageRow> = sqlx::query_as(
      "SELECT id, conv_id, role, content, tema, created_at FROM messages \
       WHERE conv_id = $1 ORDER BY id",
    )
    .bind(conv_id)
    .fetch_all(&self.pool)
    .await?;
    rows.into_iter().map(Message::try_from).collect()
  }

  async fn list_avatars(&self) -> Result<Vec<Avatar>, StoreError> {
    let rows: Vec<AvatarRow> = sqlx::query_as(
      "SELECT avatar_id, COALESCE(nombre, '') AS nombre, COALESCE(url, '') AS url, \
       COALESCE(animation_url, '') AS animation_url FROM avatars ORDER BY avatar_id",
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(|row| Avatar {
          avatar_id: row.avatar_id,
          nombre: row.nombre,
          url: row.url,
          animation_url: row.animation_url,
        })
        .collect(),
    )
  }
}
