//! Conversations and their append-only transcripts

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::profile::{read_json, write_json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
  pub id: String,
  pub owner_id: String,
  pub title: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
  pub role: Role,
  pub content: serde_json::Value,
  pub timestamp: DateTime<Utc>,
}

impl Message {
  pub fn user(text: &str) -> Self {
    Self { role: Role::User, content: serde_json::Value::String(text.to_string()), timestamp: Utc::now() }
  }

  pub fn assistant(content: serde_json::Value) -> Self {
    Self { role: Role::Assistant, content, timestamp: Utc::now() }
  }
}

/// Transcript store; appends for one conversation may arrive concurrently
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
  /// Start a conversation whose title is also its first user message
  async fn create(&self, owner_id: &str, title: &str) -> Result<Conversation>;

  /// The conversation, if it exists and belongs to `owner_id`
  async fn find(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>>;

  async fn messages(&self, id: &str) -> Result<Vec<Message>>;

  /// Append messages; fails if the conversation does not exist
  async fn append(&self, id: &str, messages: Vec<Message>) -> Result<()>;

  /// Owner's conversations, most recently updated first
  async fn history(&self, owner_id: &str) -> Result<Vec<Conversation>>;
}

/// File-backed transcripts: `<id>/conversation.json` plus `<id>/messages.jsonl`
pub struct FileConversationStore {
  root: PathBuf,
  append_lock: Mutex<()>,
}

impl FileConversationStore {
  pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
    let root = root.as_ref().join("conversations");
    std::fs::create_dir_all(&root)
      .with_context(|| format!("Failed to create conversation directory {}", root.display()))?;
    Ok(Self { root, append_lock: Mutex::new(()) })
  }

  fn dir(&self, id: &str) -> PathBuf {
    self.root.join(super::profile::file_key(id))
  }

  fn header_path(&self, id: &str) -> PathBuf {
    self.dir(id).join("conversation.json")
  }

  fn messages_path(&self, id: &str) -> PathBuf {
    self.dir(id).join("messages.jsonl")
  }

  async fn write_messages(&self, id: &str, messages: &[Message]) -> Result<()> {
    let mut buffer = Vec::new();
    for message in messages {
      serde_json::to_writer(&mut buffer, message)?;
      buffer.push(b'\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.messages_path(id))
      .await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(())
  }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
  async fn create(&self, owner_id: &str, title: &str) -> Result<Conversation> {
    let now = Utc::now();
    let conversation = Conversation {
      id: Uuid::new_v4().to_string(),
      owner_id: owner_id.to_string(),
      title: title.to_string(),
      created_at: now,
      updated_at: now,
    };

    tokio::fs::create_dir_all(self.dir(&conversation.id)).await?;
    write_json(&self.header_path(&conversation.id), &conversation).await?;

    let _guard = self.append_lock.lock().await;
    self.write_messages(&conversation.id, &[Message::user(title)]).await?;
    Ok(conversation)
  }

  async fn find(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>> {
    let conversation = read_json::<Conversation>(&self.header_path(id)).await?;
    Ok(conversation.filter(|c| c.owner_id == owner_id))
  }

  async fn messages(&self, id: &str) -> Result<Vec<Message>> {
    let raw = match tokio::fs::read_to_string(self.messages_path(id)).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    raw
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| serde_json::from_str(line).context("Corrupt transcript line"))
      .collect()
  }

  async fn append(&self, id: &str, messages: Vec<Message>) -> Result<()> {
    let _guard = self.append_lock.lock().await;

    let mut conversation = read_json::<Conversation>(&self.header_path(id))
      .await?
      .ok_or_else(|| anyhow!("Conversation {id} does not exist"))?;

    self.write_messages(id, &messages).await?;

    conversation.updated_at = Utc::now();
    write_json(&self.header_path(id), &conversation).await
  }

  async fn history(&self, owner_id: &str) -> Result<Vec<Conversation>> {
    let mut conversations = Vec::new();
    let mut entries = tokio::fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      if !entry.file_type().await?.is_dir() {
        continue;
      }
      let header = entry.path().join("conversation.json");
      if let Some(conversation) = read_json::<Conversation>(&header).await? {
        if conversation.owner_id == owner_id {
          conversations.push(conversation);
        }
      }
    }
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(conversations)
  }
}
