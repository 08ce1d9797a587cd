//! Shared doubles and harness for the roster integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bentley::daemon_logs::DaemonLogs;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use roster::config::{RosterConfig, VectorBackend};
use roster::error::EmbeddingError;
use roster::server::models::conversation::{Conversation, ConversationStore, FileConversationStore, Message};
use roster::server::models::identity::Identity;
use roster::server::models::profile::{FileProfileStore, Profile, ProfileStatus, ProfileStore};
use roster::server::services::embeddings::EmbeddingClient;
use roster::server::services::explanations::{ExplanationRequest, ExplanationService};
use roster::server::services::memory_vectors::MemoryVectorDatabase;
use roster::server::services::result_sink::{SinkStats, SinkWorker};
use roster::server::startup::{AppState, Collaborators};

pub const ORG: &str = "org-1";
pub const OTHER_ORG: &str = "org-2";
pub const CALLER: &str = "caller";
pub const DIMENSION: usize = 64;

pub fn caller() -> Identity {
  Identity::new(CALLER, ORG)
}

pub fn profile(id: &str, name: &str, description: &str) -> Profile {
  Profile {
    id: id.to_string(),
    organization_id: ORG.to_string(),
    name: name.to_string(),
    email: format!("{id}@example.com"),
    status: ProfileStatus::Active,
    description: description.to_string(),
    team: None,
    level: None,
    location: None,
  }
}

pub fn in_team(mut profile: Profile, team: &str) -> Profile {
  profile.team = Some(team.to_string());
  profile
}

// Embedder

/// Hashes lowercase words into buckets so that texts sharing words score higher
#[derive(Default)]
pub struct BagOfWordsEmbedder {
  pub fail_all: AtomicBool,
  /// Reject calls carrying more than one text
  pub fail_batches: AtomicBool,
  /// Reject any call containing a text with this word
  poison: Mutex<Option<String>>,
  pub calls: AtomicUsize,
  pub batch_sizes: Mutex<Vec<usize>>,
}

impl BagOfWordsEmbedder {
  pub fn poison(&self, word: &str) {
    *self.poison.lock().unwrap() = Some(word.to_lowercase());
  }

  pub fn vector_for(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
      vector[bucket(&word.to_lowercase())] += 1.0;
    }
    vector
  }
}

fn bucket(word: &str) -> usize {
  // FNV-1a
  let mut hash: u64 = 0xcbf29ce484222325;
  for byte in word.bytes() {
    hash ^= byte as u64;
    hash = hash.wrapping_mul(0x100000001b3);
  }
  (hash % DIMENSION as u64) as usize
}

#[async_trait]
impl EmbeddingClient for BagOfWordsEmbedder {
  fn dimension(&self) -> usize {
    DIMENSION
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.batch_sizes.lock().unwrap().push(texts.len());

    if self.fail_all.load(Ordering::SeqCst) {
      return Err(EmbeddingError::Transport("connection refused".to_string()));
    }
    if texts.len() > 1 && self.fail_batches.load(Ordering::SeqCst) {
      return Err(EmbeddingError::Status { status: 413, body: "batch too large".to_string() });
    }
    if let Some(word) = self.poison.lock().unwrap().as_deref() {
      if texts.iter().any(|t| t.to_lowercase().contains(word)) {
        return Err(EmbeddingError::Malformed(format!("refusing text containing {word:?}")));
      }
    }

    Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
  }
}

// Explainer

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainerMode {
  /// Answer "<name> matches <query>"
  Echo,
  Fail,
  /// Never answer
  Hang,
}

pub struct ScriptedExplainer {
  mode: ExplainerMode,
  delays: HashMap<String, Duration>,
  pub started: AtomicUsize,
  pub completed: AtomicUsize,
}

impl ScriptedExplainer {
  pub fn new(mode: ExplainerMode) -> Self {
    Self { mode, delays: HashMap::new(), started: AtomicUsize::new(0), completed: AtomicUsize::new(0) }
  }

  /// Delay the answer for one profile
  pub fn with_delay(mut self, profile_id: &str, delay: Duration) -> Self {
    self.delays.insert(profile_id.to_string(), delay);
    self
  }

  pub fn explanation_for(name: &str, query: &str) -> String {
    format!("{name} matches {query}")
  }
}

#[async_trait]
impl ExplanationService for ScriptedExplainer {
  async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<String> {
    self.started.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delays.get(&request.profile.id) {
      tokio::time::sleep(*delay).await;
    }

    let outcome = match self.mode {
      ExplainerMode::Echo => Ok(Self::explanation_for(&request.profile.name, request.query)),
      ExplainerMode::Fail => Err(anyhow!("model unavailable")),
      ExplainerMode::Hang => {
        std::future::pending::<()>().await;
        unreachable!()
      }
    };
    self.completed.fetch_add(1, Ordering::SeqCst);
    outcome
  }
}

// Conversation store

/// File-backed store that counts appends and can fail or hold them
pub struct CountingConversationStore {
  inner: FileConversationStore,
  pub appends_started: AtomicUsize,
  pub appends: AtomicUsize,
  pub fail_appends: AtomicBool,
  gate: Option<Semaphore>,
}

impl CountingConversationStore {
  pub fn new(root: &Path) -> Result<Self> {
    Ok(Self {
      inner: FileConversationStore::new(root)?,
      appends_started: AtomicUsize::new(0),
      appends: AtomicUsize::new(0),
      fail_appends: AtomicBool::new(false),
      gate: None,
    })
  }

  /// Appends wait for [`release`](Self::release) before writing
  pub fn gated(root: &Path) -> Result<Self> {
    Ok(Self { gate: Some(Semaphore::new(0)), ..Self::new(root)? })
  }

  pub fn release(&self, appends: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(appends);
    }
  }
}

#[async_trait]
impl ConversationStore for CountingConversationStore {
  async fn create(&self, owner_id: &str, title: &str) -> Result<Conversation> {
    self.inner.create(owner_id, title).await
  }

  async fn find(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>> {
    self.inner.find(id, owner_id).await
  }

  async fn messages(&self, id: &str) -> Result<Vec<Message>> {
    self.inner.messages(id).await
  }

  async fn append(&self, id: &str, messages: Vec<Message>) -> Result<()> {
    self.appends_started.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.gate {
      gate.acquire().await?.forget();
    }
    if self.fail_appends.load(Ordering::SeqCst) {
      return Err(anyhow!("disk full"));
    }
    self.inner.append(id, messages).await?;
    self.appends.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn history(&self, owner_id: &str) -> Result<Vec<Conversation>> {
    self.inner.history(owner_id).await
  }
}

// Harness

pub struct Harness {
  pub dir: TempDir,
  pub state: AppState,
  worker: SinkWorker,
  pub embedder: Arc<BagOfWordsEmbedder>,
  pub vectors: Arc<MemoryVectorDatabase>,
  pub explainer: Arc<ScriptedExplainer>,
  pub conversations: Arc<CountingConversationStore>,
  pub profiles: Arc<FileProfileStore>,
}

impl Harness {
  pub async fn new() -> Result<Self> {
    Self::build(ScriptedExplainer::new(ExplainerMode::Echo), |_| {}).await
  }

  pub async fn with_explainer(explainer: ScriptedExplainer) -> Result<Self> {
    Self::build(explainer, |_| {}).await
  }

  /// Assemble an application over temporary stores and bootstrap the index
  pub async fn build(explainer: ScriptedExplainer, configure: impl FnOnce(&mut RosterConfig)) -> Result<Self> {
    let dir = TempDir::new()?;
    let mut config = RosterConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.vector.backend = VectorBackend::Memory;
    config.embedder.dimension = DIMENSION;
    configure(&mut config);

    let embedder = Arc::new(BagOfWordsEmbedder::default());
    let vectors = Arc::new(MemoryVectorDatabase::new());
    let explainer = Arc::new(explainer);
    let conversations = Arc::new(CountingConversationStore::new(dir.path())?);
    let profiles = Arc::new(FileProfileStore::new(dir.path())?);
    let logger = DaemonLogs::new_with_silent(config.logs_path(), true)?;

    let (state, worker) = AppState::assemble(
      config,
      logger,
      Collaborators {
        profiles: profiles.clone(),
        conversations: conversations.clone(),
        embedder: embedder.clone(),
        vectors: vectors.clone(),
        explainer: explainer.clone(),
      },
    );
    state.index.bootstrap().await?;

    Ok(Self { dir, state, worker, embedder, vectors, explainer, conversations, profiles })
  }

  /// Store and index each profile
  pub async fn seed(&self, profiles: &[Profile]) -> Result<()> {
    for profile in profiles {
      self.profiles.save_profile(profile).await?;
      self.state.index.index_profile(profile).await?;
    }
    Ok(())
  }

  pub async fn chat(&self, owner_id: &str) -> Result<String> {
    Ok(self.conversations.create(owner_id, "Who can help?").await?.id)
  }

  /// Wait until `count` explanation calls have finished
  pub async fn explanations_settled(&self, count: usize) {
    for _ in 0..200 {
      if self.explainer.completed.load(Ordering::SeqCst) >= count {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("only {} explanations completed", self.explainer.completed.load(Ordering::SeqCst));
  }

  /// Drop the application and wait for queued transcript writes.
  /// The data directory is handed back so stores stay readable.
  pub async fn finish(self) -> (SinkStats, TempDir) {
    let Self { dir, state, worker, .. } = self;
    drop(state);
    (worker.join().await, dir)
  }
}
