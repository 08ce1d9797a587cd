//! Search orchestration: parse, embed, search, hydrate, enrich, stream
//!
//! Everything up to and including hydration happens before a stream is
//! returned, so any failure there becomes a single error response. Enrichment
//! runs as one detached task per candidate; results are yielded in completion
//! order and handed to the result sink as they are yielded. Dropping the
//! stream stops delivery without cancelling explanation calls in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::{SearchError, SearchStage};
use crate::server::models::conversation::ConversationStore;
use crate::server::models::identity::Identity;
use crate::server::models::profile::{Organization, Profile, ProfileStore};
use crate::server::models::search::{EnrichedResult, ScoredCandidate, SearchFilterSet, SearchRequest};
use crate::server::services::explanations::{ExplanationRequest, ExplanationService, FALLBACK_EXPLANATION};
use crate::server::services::profile_index::ProfileIndexManager;
use crate::server::services::result_sink::ResultSink;
use crate::server::services::vector_database::VectorFilter;

/// Deadlines owned by the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct SearchTimeouts {
  pub embedding: Duration,
  pub search: Duration,
  pub explanation: Duration,
}

impl Default for SearchTimeouts {
  fn default() -> Self {
    Self {
      embedding: Duration::from_secs(10),
      search: Duration::from_secs(10),
      explanation: Duration::from_secs(180),
    }
  }
}

pub struct SearchOrchestrator {
  index: Arc<ProfileIndexManager>,
  profiles: Arc<dyn ProfileStore>,
  conversations: Arc<dyn ConversationStore>,
  explainer: Arc<dyn ExplanationService>,
  sink: ResultSink,
  timeouts: SearchTimeouts,
}

impl SearchOrchestrator {
  pub fn new(
    index: Arc<ProfileIndexManager>,
    profiles: Arc<dyn ProfileStore>,
    conversations: Arc<dyn ConversationStore>,
    explainer: Arc<dyn ExplanationService>,
    sink: ResultSink,
    timeouts: SearchTimeouts,
  ) -> Self {
    Self { index, profiles, conversations, explainer, sink, timeouts }
  }

  /// Run a request up to the point where results start streaming
  pub async fn search(&self, identity: &Identity, request: SearchRequest) -> Result<ResultStream, SearchError> {
    let SearchRequest { filters, conversation_id } = request;

    // Parsing
    let conversation = self
      .conversations
      .find(&conversation_id, &identity.user_id)
      .await
      .map_err(|e| SearchError::backend(SearchStage::Parsing, format!("{e:#}")))?;
    if conversation.is_none() {
      return Err(SearchError::ConversationNotFound(conversation_id));
    }

    // Embedding
    let vector = with_deadline(SearchStage::Embedding, self.timeouts.embedding, self.index.embed_query(filters.query()))
      .await?;

    // Searching
    let candidates = self.find_candidates(identity, &filters, &vector).await?;

    // Hydrating
    let (hydrated, organization) = self.hydrate(identity, candidates).await?;
    bentley::verbose!(
      "Search in conversation {conversation_id} hydrated {} candidates for {:?}",
      hydrated.len(),
      filters.query()
    );

    // Enriching
    Ok(self.enrich(filters.query(), organization, hydrated, conversation_id))
  }

  async fn find_candidates(
    &self,
    identity: &Identity,
    filters: &SearchFilterSet,
    vector: &[f32],
  ) -> Result<Vec<ScoredCandidate>, SearchError> {
    let filter = VectorFilter {
      organization_id: Some(identity.organization_id.clone()),
      teams: filters.teams().to_vec(),
      levels: filters.levels().to_vec(),
      locations: filters.locations().to_vec(),
    };

    // One extra so that dropping the caller still leaves `limit` candidates
    let mut candidates = with_deadline(
      SearchStage::Searching,
      self.timeouts.search,
      self.index.find_candidates(vector, &filter, filters.limit() + 1),
    )
    .await?;

    candidates.retain(|c| c.profile_id != identity.user_id);
    candidates.truncate(filters.limit());
    Ok(candidates)
  }

  async fn hydrate(
    &self,
    identity: &Identity,
    candidates: Vec<ScoredCandidate>,
  ) -> Result<(Vec<(f32, Profile)>, Organization), SearchError> {
    let ids: Vec<String> = candidates.iter().map(|c| c.profile_id.clone()).collect();
    let found = if ids.is_empty() {
      Vec::new()
    } else {
      self
        .profiles
        .get_profiles_by_ids(&ids)
        .await
        .map_err(|e| SearchError::backend(SearchStage::Hydrating, format!("{e:#}")))?
    };

    // Keep engine order; unresolved or no-longer-live ids are dropped
    let hydrated = candidates
      .into_iter()
      .filter_map(|candidate| {
        found
          .iter()
          .find(|p| p.id == candidate.profile_id && p.is_live())
          .map(|profile| (candidate.score, profile.clone()))
      })
      .collect();

    let organization = match self.profiles.get_organization(&identity.organization_id).await {
      Ok(Some(org)) => org,
      Ok(None) => Organization::empty(&identity.organization_id),
      Err(e) => {
        bentley::warn!("Failed to load organization {}: {e:#}", identity.organization_id);
        Organization::empty(&identity.organization_id)
      }
    };

    Ok((hydrated, organization))
  }

  fn enrich(
    &self,
    query: &str,
    organization: Organization,
    hydrated: Vec<(f32, Profile)>,
    conversation_id: String,
  ) -> ResultStream {
    let expected = hydrated.len();
    let (sender, receiver) = mpsc::channel(expected.max(1));
    let query: Arc<str> = Arc::from(query);
    let organization = Arc::new(organization);

    for (score, profile) in hydrated {
      let sender = sender.clone();
      let explainer = self.explainer.clone();
      let query = query.clone();
      let organization = organization.clone();
      let timeout = self.timeouts.explanation;

      // Detached: a dropped stream must not cancel calls already in flight
      tokio::spawn(async move {
        let request = ExplanationRequest { query: &query, organization: &organization, profile: &profile };
        let explanation = match tokio::time::timeout(timeout, explainer.explain(&request)).await {
          Ok(Ok(text)) => text,
          Ok(Err(e)) => {
            bentley::warn!("Explanation for profile {} failed: {e:#}", profile.id);
            FALLBACK_EXPLANATION.to_string()
          }
          Err(_) => {
            bentley::warn!("Explanation for profile {} timed out after {timeout:?}", profile.id);
            FALLBACK_EXPLANATION.to_string()
          }
        };

        // The receiver is gone once the caller disconnects
        let _ = sender.send(EnrichedResult { score, profile, explanation }).await;
      });
    }

    ResultStream { receiver, sink: self.sink.clone(), conversation_id, expected, delivered: 0, closed: false }
  }
}

async fn with_deadline<T, E, F>(stage: SearchStage, deadline: Duration, call: F) -> Result<T, SearchError>
where
  F: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  match tokio::time::timeout(deadline, call).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(SearchError::backend(stage, e)),
    Err(_) => Err(SearchError::backend(stage, format!("timed out after {deadline:?}"))),
  }
}

/// Enriched results in completion order; each yielded result is submitted to the sink
pub struct ResultStream {
  receiver: mpsc::Receiver<EnrichedResult>,
  sink: ResultSink,
  conversation_id: String,
  expected: usize,
  delivered: usize,
  closed: bool,
}

impl ResultStream {
  /// Number of results the stream will yield if consumed to the end
  pub fn expected(&self) -> usize {
    self.expected
  }

  pub fn delivered(&self) -> usize {
    self.delivered
  }

  pub fn conversation_id(&self) -> &str {
    &self.conversation_id
  }

  /// `Enriching` until the first result arrives, `Closed` once every result has been yielded
  pub fn stage(&self) -> SearchStage {
    if self.closed {
      SearchStage::Closed
    } else if self.delivered == 0 {
      SearchStage::Enriching
    } else {
      SearchStage::Streaming
    }
  }
}

impl Drop for ResultStream {
  fn drop(&mut self) {
    if !self.closed {
      bentley::verbose!(
        "Caller left conversation {} while {}, {} of {} results delivered",
        self.conversation_id,
        self.stage(),
        self.delivered,
        self.expected
      );
    }
  }
}

impl Stream for ResultStream {
  type Item = EnrichedResult;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    match this.receiver.poll_recv(cx) {
      Poll::Ready(Some(result)) => {
        this.delivered += 1;
        this.sink.submit(&this.conversation_id, result.clone());
        Poll::Ready(Some(result))
      }
      Poll::Ready(None) => {
        if !this.closed {
          this.closed = true;
          bentley::verbose!(
            "Search in conversation {} closed after {} results",
            this.conversation_id,
            this.delivered
          );
        }
        Poll::Ready(None)
      }
      Poll::Pending => Poll::Pending,
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let remaining = self.expected.saturating_sub(self.delivered);
    (0, Some(remaining))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::VectorDbError;
  use crate::server::models::conversation::{Conversation, MockConversationStore};
  use crate::server::models::profile::MockProfileStore;
  use crate::server::services::embeddings::MockEmbeddingClient;
  use crate::server::services::vector_database::MockVectorDatabase;
  use async_trait::async_trait;
  use chrono::Utc;

  struct SilentExplainer;

  #[async_trait]
  impl ExplanationService for SilentExplainer {
    async fn explain(&self, _request: &ExplanationRequest<'_>) -> anyhow::Result<String> {
      Ok(String::new())
    }
  }

  fn conversations_owning(id: &'static str) -> MockConversationStore {
    let mut store = MockConversationStore::new();
    store.expect_find().returning(move |conversation_id, owner| {
      Ok((conversation_id == id).then(|| Conversation {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: "hello".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
      }))
    });
    store
  }

  fn embedder() -> MockEmbeddingClient {
    let mut embedder = MockEmbeddingClient::new();
    embedder.expect_dimension().return_const(2usize);
    embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
    embedder
  }

  async fn orchestrator(
    vectors: MockVectorDatabase,
    profiles: MockProfileStore,
    conversations: MockConversationStore,
  ) -> SearchOrchestrator {
    let profiles: Arc<dyn ProfileStore> = Arc::new(profiles);
    let conversations: Arc<dyn ConversationStore> = Arc::new(conversations);
    let index = Arc::new(ProfileIndexManager::new(Arc::new(embedder()), Arc::new(vectors), profiles.clone(), 10));
    index.bootstrap().await.unwrap();
    let (sink, _worker) = ResultSink::spawn(conversations.clone(), 4);
    SearchOrchestrator::new(index, profiles, conversations, Arc::new(SilentExplainer), sink, SearchTimeouts::default())
  }

  fn ready_vectors() -> MockVectorDatabase {
    let mut vectors = MockVectorDatabase::new();
    vectors.expect_ensure_collection().returning(|_| Ok(()));
    vectors
  }

  fn request(chat: &str) -> SearchRequest {
    SearchRequest::from_query(&format!("q=rust&chatId={chat}&limit=2")).unwrap()
  }

  fn stage_of(err: SearchError) -> SearchStage {
    match err {
      SearchError::BackendUnavailable { stage, .. } => stage,
      other => panic!("expected an unavailable backend, got {other}"),
    }
  }

  #[tokio::test]
  async fn transcript_store_failure_is_reported_while_parsing() {
    let mut conversations = MockConversationStore::new();
    conversations.expect_find().returning(|_, _| Err(anyhow::anyhow!("permission denied")));
    let search = orchestrator(ready_vectors(), MockProfileStore::new(), conversations).await;

    let err = search.search(&Identity::new("me", "org"), request("c1")).await.err().unwrap();
    assert_eq!(stage_of(err), SearchStage::Parsing);
  }

  #[tokio::test]
  async fn vector_engine_failure_is_reported_while_searching() {
    let mut vectors = ready_vectors();
    vectors.expect_search().returning(|_, _, _| Err(VectorDbError::Unavailable("gone".into())));
    let search = orchestrator(vectors, MockProfileStore::new(), conversations_owning("c1")).await;

    let err = search.search(&Identity::new("me", "org"), request("c1")).await.err().unwrap();
    assert_eq!(stage_of(err), SearchStage::Searching);
  }

  #[tokio::test]
  async fn search_is_scoped_and_over_fetches_by_one() {
    let mut vectors = ready_vectors();
    vectors
      .expect_search()
      .withf(|_, filter, limit| filter.organization_id.as_deref() == Some("org") && *limit == 3)
      .times(1)
      .returning(|_, _, _| Ok(Vec::new()));
    let mut profiles = MockProfileStore::new();
    profiles.expect_get_profiles_by_ids().times(0);
    profiles.expect_get_organization().returning(|_| Ok(None));
    let search = orchestrator(vectors, profiles, conversations_owning("c1")).await;

    let stream = search.search(&Identity::new("me", "org"), request("c1")).await.unwrap();
    assert_eq!(stream.expected(), 0);
  }

  #[tokio::test]
  async fn primary_store_failure_is_reported_while_hydrating() {
    let mut vectors = ready_vectors();
    vectors
      .expect_search()
      .returning(|_, _, _| Ok(vec![ScoredCandidate { profile_id: "p1".into(), score: 0.9 }]));
    let mut profiles = MockProfileStore::new();
    profiles.expect_get_profiles_by_ids().returning(|_| Err(anyhow::anyhow!("timeout")));
    let search = orchestrator(vectors, profiles, conversations_owning("c1")).await;

    let err = search.search(&Identity::new("me", "org"), request("c1")).await.err().unwrap();
    assert_eq!(stage_of(err), SearchStage::Hydrating);
  }

  #[tokio::test]
  async fn unknown_conversations_stop_the_request_before_embedding() {
    let search = orchestrator(ready_vectors(), MockProfileStore::new(), conversations_owning("c1")).await;

    let err = search.search(&Identity::new("me", "org"), request("other")).await.err().unwrap();
    assert!(matches!(err, SearchError::ConversationNotFound(id) if id == "other"));
  }
}
