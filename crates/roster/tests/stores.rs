mod common;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;

use common::{profile, ORG, OTHER_ORG};
use roster::server::models::conversation::{ConversationStore, FileConversationStore, Message, Role};
use roster::server::models::profile::{FileProfileStore, NamedRef, Organization, ProfileStatus, ProfileStore};

#[tokio::test]
async fn profile_pages_are_ordered_by_id_and_scoped_to_the_organization() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileProfileStore::new(dir.path())?;

  for i in (0..17).rev() {
    store.save_profile(&profile(&format!("p{i:02}"), "Member", "backend")).await?;
  }
  let mut outsider = profile("outsider", "Outsider", "backend");
  outsider.organization_id = OTHER_ORG.to_string();
  store.save_profile(&outsider).await?;

  let first = store.list_by_organization(ORG, 0, 10).await?;
  let second = store.list_by_organization(ORG, 1, 10).await?;
  let third = store.list_by_organization(ORG, 2, 10).await?;

  assert_eq!(first.total, 17);
  assert_eq!(first.profiles.len(), 10);
  assert_eq!(second.profiles.len(), 7);
  assert!(third.profiles.is_empty());
  assert_eq!(first.profiles[0].id, "p00");
  assert_eq!(second.profiles.last().map(|p| p.id.as_str()), Some("p16"));
  assert!(first.profiles.iter().chain(&second.profiles).all(|p| p.organization_id == ORG));
  Ok(())
}

#[tokio::test]
async fn batched_lookup_omits_unknown_and_deleted_profiles() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileProfileStore::new(dir.path())?;

  let mut gone = profile("gone", "Gone", "left the company");
  gone.status = ProfileStatus::Deleted;
  store.save_profile(&profile("a", "Ada", "compilers")).await?;
  store.save_profile(&gone).await?;

  let ids = vec!["a".to_string(), "gone".to_string(), "missing".to_string()];
  let found = store.get_profiles_by_ids(&ids).await?;
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].name, "Ada");

  // Deleted records still appear when listing for reindexing
  let page = store.list_by_organization(ORG, 0, 10).await?;
  assert_eq!(page.total, 2);
  Ok(())
}

#[tokio::test]
async fn deleting_a_profile_is_idempotent() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileProfileStore::new(dir.path())?;
  store.save_profile(&profile("a", "Ada", "compilers")).await?;

  store.delete_profile("a").await?;
  store.delete_profile("a").await?;

  assert!(store.get_profiles_by_ids(&["a".to_string()]).await?.is_empty());
  Ok(())
}

#[tokio::test]
async fn organizations_round_trip_and_resolve_reference_names() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileProfileStore::new(dir.path())?;
  assert!(store.get_organization(ORG).await?.is_none());

  let organization = Organization {
    id: ORG.to_string(),
    title: "Acme".to_string(),
    teams: vec![NamedRef { id: "eng".to_string(), name: "Engineering".to_string() }],
    ..Default::default()
  };
  store.save_organization(&organization).await?;

  let loaded = store.get_organization(ORG).await?.expect("organization stored");
  assert_eq!(loaded, organization);
  assert_eq!(loaded.team_name(Some("eng")).as_deref(), Some("Engineering"));
  assert_eq!(loaded.team_name(Some("ops")).as_deref(), Some("ops"));
  Ok(())
}

#[tokio::test]
async fn new_conversations_start_with_the_opening_message() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileConversationStore::new(dir.path())?;

  let conversation = store.create("u1", "Who knows Kubernetes?").await?;
  let messages = store.messages(&conversation.id).await?;

  assert_eq!(conversation.title, "Who knows Kubernetes?");
  assert_eq!(messages.len(), 1);
  assert_eq!(messages[0].role, Role::User);
  assert_eq!(messages[0].content, json!("Who knows Kubernetes?"));
  Ok(())
}

#[tokio::test]
async fn conversations_are_only_visible_to_their_owner() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileConversationStore::new(dir.path())?;
  let conversation = store.create("u1", "hello").await?;

  assert!(store.find(&conversation.id, "u1").await?.is_some());
  assert!(store.find(&conversation.id, "u2").await?.is_none());
  assert!(store.find("no-such-id", "u1").await?.is_none());
  Ok(())
}

#[tokio::test]
async fn appending_to_an_unknown_conversation_fails() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileConversationStore::new(dir.path())?;

  let result = store.append("no-such-id", vec![Message::assistant(json!({"score": 1.0}))]).await;
  assert!(result.is_err());
  Ok(())
}

#[tokio::test]
async fn concurrent_appends_are_all_kept() -> Result<()> {
  let dir = TempDir::new()?;
  let store = Arc::new(FileConversationStore::new(dir.path())?);
  let conversation = store.create("u1", "hello").await?;

  let mut handles = Vec::new();
  for i in 0..40 {
    let store = store.clone();
    let id = conversation.id.clone();
    handles.push(tokio::spawn(async move { store.append(&id, vec![Message::assistant(json!({ "n": i }))]).await }));
  }
  for handle in handles {
    handle.await??;
  }

  let messages = store.messages(&conversation.id).await?;
  assert_eq!(messages.len(), 41);

  let mut seen: Vec<i64> = messages[1..].iter().filter_map(|m| m.content["n"].as_i64()).collect();
  seen.sort_unstable();
  assert_eq!(seen, (0..40).collect::<Vec<_>>());
  Ok(())
}

#[tokio::test]
async fn history_lists_the_most_recently_updated_first() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileConversationStore::new(dir.path())?;

  let older = store.create("u1", "first").await?;
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  let newer = store.create("u1", "second").await?;
  store.create("u2", "someone else").await?;

  let history = store.history("u1").await?;
  assert_eq!(history.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec![newer.id.as_str(), older.id.as_str()]);

  // Appending moves a conversation to the front
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  store.append(&older.id, vec![Message::assistant(json!({"score": 0.5}))]).await?;
  let history = store.history("u1").await?;
  assert_eq!(history[0].id, older.id);
  Ok(())
}

#[tokio::test]
async fn history_skips_stray_files_in_the_conversation_directory() -> Result<()> {
  let dir = TempDir::new()?;
  let store = FileConversationStore::new(dir.path())?;
  let kept = store.create("u1", "hello").await?;
  std::fs::write(dir.path().join("conversations").join(".DS_Store"), b"junk")?;

  let history = store.history("u1").await?;

  assert_eq!(history.len(), 1);
  assert_eq!(history[0].id, kept.id);
  Ok(())
}
