//! Member profiles, organizations, and the primary record store

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProfileStatus {
  Active,
  Invited,
  Deleted,
}

/// A member record eligible for semantic search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id: String,
  pub organization_id: String,
  pub name: String,
  #[serde(default)]
  pub email: String,
  pub status: ProfileStatus,
  /// Free text; the only field that is embedded
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub team: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub level: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

impl Profile {
  pub fn is_live(&self) -> bool {
    self.status != ProfileStatus::Deleted
  }

  /// Text handed to the embedding service
  pub fn embedding_text(&self) -> &str {
    &self.description
  }
}

/// Reference data entry (team, level or location)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamedRef {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Organization {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub teams: Vec<NamedRef>,
  #[serde(default)]
  pub levels: Vec<NamedRef>,
  #[serde(default)]
  pub locations: Vec<NamedRef>,
}

impl Organization {
  /// Placeholder used when an organization has no stored reference data
  pub fn empty(id: &str) -> Self {
    Self { id: id.to_string(), ..Default::default() }
  }

  pub fn team_name(&self, id: Option<&str>) -> Option<String> {
    resolve(&self.teams, id)
  }

  pub fn level_name(&self, id: Option<&str>) -> Option<String> {
    resolve(&self.levels, id)
  }

  pub fn location_name(&self, id: Option<&str>) -> Option<String> {
    resolve(&self.locations, id)
  }
}

// Unknown references fall back to the raw id
fn resolve(refs: &[NamedRef], id: Option<&str>) -> Option<String> {
  let id = id?;
  Some(refs.iter().find(|r| r.id == id).map(|r| r.name.clone()).unwrap_or_else(|| id.to_string()))
}

/// Lifecycle change reported by the CRUD layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProfileEvent {
  Created,
  Updated,
  SoftDeleted,
  Restored,
  Deleted,
}

/// One page of an organization's profiles
#[derive(Debug, Clone, Default)]
pub struct ProfilePage {
  pub profiles: Vec<Profile>,
  /// Profiles in the organization across all pages
  pub total: usize,
}

/// Primary record store for profiles and organizations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
  /// Batched lookup; unknown and deleted ids are omitted
  async fn get_profiles_by_ids(&self, ids: &[String]) -> Result<Vec<Profile>>;

  /// Zero-based page of an organization's profiles ordered by id, any status
  async fn list_by_organization(
    &self,
    organization_id: &str,
    page: usize,
    page_size: usize,
  ) -> Result<ProfilePage>;

  async fn get_organization(&self, organization_id: &str) -> Result<Option<Organization>>;

  async fn save_profile(&self, profile: &Profile) -> Result<()>;

  async fn delete_profile(&self, profile_id: &str) -> Result<()>;

  async fn save_organization(&self, organization: &Organization) -> Result<()>;
}

/// File-backed store: one JSON document per record
pub struct FileProfileStore {
  root: PathBuf,
}

impl FileProfileStore {
  pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
    let root = root.as_ref().to_path_buf();
    std::fs::create_dir_all(root.join("profiles"))
      .with_context(|| format!("Failed to create profile directory under {}", root.display()))?;
    std::fs::create_dir_all(root.join("organizations"))?;
    Ok(Self { root })
  }

  fn profile_path(&self, id: &str) -> PathBuf {
    self.root.join("profiles").join(format!("{}.json", file_key(id)))
  }

  fn organization_path(&self, id: &str) -> PathBuf {
    self.root.join("organizations").join(format!("{}.json", file_key(id)))
  }

  async fn all_profiles(&self) -> Result<Vec<Profile>> {
    let mut profiles = Vec::new();
    let mut entries = tokio::fs::read_dir(self.root.join("profiles")).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == "json") {
        if let Some(profile) = read_json::<Profile>(&path).await? {
          profiles.push(profile);
        }
      }
    }
    Ok(profiles)
  }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
  async fn get_profiles_by_ids(&self, ids: &[String]) -> Result<Vec<Profile>> {
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
      if let Some(profile) = read_json::<Profile>(&self.profile_path(id)).await? {
        if profile.is_live() {
          found.push(profile);
        }
      }
    }
    Ok(found)
  }

  async fn list_by_organization(
    &self,
    organization_id: &str,
    page: usize,
    page_size: usize,
  ) -> Result<ProfilePage> {
    let mut profiles: Vec<Profile> = self
      .all_profiles()
      .await?
      .into_iter()
      .filter(|p| p.organization_id == organization_id)
      .collect();
    profiles.sort_by(|a, b| a.id.cmp(&b.id));

    let total = profiles.len();
    let page_size = page_size.max(1);
    let profiles = profiles.into_iter().skip(page * page_size).take(page_size).collect();
    Ok(ProfilePage { profiles, total })
  }

  async fn get_organization(&self, organization_id: &str) -> Result<Option<Organization>> {
    read_json(&self.organization_path(organization_id)).await
  }

  async fn save_profile(&self, profile: &Profile) -> Result<()> {
    write_json(&self.profile_path(&profile.id), profile).await
  }

  async fn delete_profile(&self, profile_id: &str) -> Result<()> {
    match tokio::fs::remove_file(self.profile_path(profile_id)).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e).with_context(|| format!("Failed to delete profile {profile_id}")),
    }
  }

  async fn save_organization(&self, organization: &Organization) -> Result<()> {
    write_json(&self.organization_path(&organization.id), organization).await
  }
}

/// Hex-encode an id so arbitrary ids are safe file names
pub(crate) fn file_key(id: &str) -> String {
  id.bytes().map(|b| format!("{b:02x}")).collect()
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  match tokio::fs::read(path).await {
    Ok(bytes) => serde_json::from_slice(&bytes)
      .map(Some)
      .with_context(|| format!("Corrupt record at {}", path.display())),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
  }
}

/// Write through a temporary file so readers never see a partial document
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let bytes = serde_json::to_vec_pretty(value)?;
  let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
  tokio::fs::write(&tmp, bytes).await.with_context(|| format!("Failed to write {}", tmp.display()))?;
  tokio::fs::rename(&tmp, path).await.with_context(|| format!("Failed to replace {}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn org() -> Organization {
    Organization {
      id: "org".into(),
      title: "Acme".into(),
      teams: vec![NamedRef { id: "t1".into(), name: "Engineering".into() }],
      ..Default::default()
    }
  }

  #[test]
  fn resolves_known_references_and_falls_back_to_ids() {
    let org = org();
    assert_eq!(org.team_name(Some("t1")).as_deref(), Some("Engineering"));
    assert_eq!(org.team_name(Some("t9")).as_deref(), Some("t9"));
    assert_eq!(org.level_name(None), None);
  }

  #[test]
  fn file_keys_are_path_safe() {
    assert_eq!(file_key("a/b"), "612f62");
  }
}
