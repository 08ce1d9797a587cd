//! Asynchronous transcript persistence for streamed results
//!
//! `submit` hands a result to a bounded queue and returns immediately; one
//! worker task drains the queue into the conversation store. A full queue, a
//! closed queue, or a failed write is logged and the result discarded. Writes
//! are not retried.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::server::models::conversation::{ConversationStore, Message};
use crate::server::models::search::EnrichedResult;

struct Job {
  conversation_id: String,
  result: EnrichedResult,
}

#[derive(Default)]
struct Counters {
  submitted: AtomicUsize,
  persisted: AtomicUsize,
  failed: AtomicUsize,
  dropped: AtomicUsize,
}

/// Final tally reported once the worker has drained its queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
  pub submitted: usize,
  pub persisted: usize,
  pub failed: usize,
  pub dropped: usize,
}

impl Counters {
  fn snapshot(&self) -> SinkStats {
    SinkStats {
      submitted: self.submitted.load(Ordering::Relaxed),
      persisted: self.persisted.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
    }
  }
}

/// Cloneable submission handle
#[derive(Clone)]
pub struct ResultSink {
  sender: mpsc::Sender<Job>,
  counters: Arc<Counters>,
}

/// Handle to the draining task
pub struct SinkWorker {
  handle: JoinHandle<()>,
  counters: Arc<Counters>,
}

impl ResultSink {
  /// Start the worker; it runs until every `ResultSink` clone is dropped
  pub fn spawn(store: Arc<dyn ConversationStore>, capacity: usize) -> (Self, SinkWorker) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    let handle = tokio::spawn(drain(store, receiver, counters.clone()));
    (Self { sender, counters: counters.clone() }, SinkWorker { handle, counters })
  }

  /// Queue a result for persistence without waiting; returns whether it was queued
  pub fn submit(&self, conversation_id: &str, result: EnrichedResult) -> bool {
    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
    let job = Job { conversation_id: conversation_id.to_string(), result };

    match self.sender.try_send(job) {
      Ok(()) => true,
      Err(TrySendError::Full(job)) => {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        bentley::warn!(
          "Transcript queue full, dropping result {} for conversation {}",
          job.result.profile.id,
          job.conversation_id
        );
        false
      }
      Err(TrySendError::Closed(job)) => {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        bentley::warn!("Transcript worker stopped, dropping result for conversation {}", job.conversation_id);
        false
      }
    }
  }

  pub fn stats(&self) -> SinkStats {
    self.counters.snapshot()
  }
}

impl SinkWorker {
  /// Wait for the queue to drain after all sink handles are gone
  pub async fn join(self) -> SinkStats {
    if let Err(e) = self.handle.await {
      bentley::error!("Transcript worker ended abnormally: {e}");
    }
    self.counters.snapshot()
  }
}

async fn drain(store: Arc<dyn ConversationStore>, mut receiver: mpsc::Receiver<Job>, counters: Arc<Counters>) {
  while let Some(job) = receiver.recv().await {
    let message = Message::assistant(job.result.transcript_content());
    match store.append(&job.conversation_id, vec![message]).await {
      Ok(()) => {
        counters.persisted.fetch_add(1, Ordering::Relaxed);
      }
      Err(e) => {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        bentley::error!("Failed to persist result to conversation {}: {e:#}", job.conversation_id);
      }
    }
  }
}
