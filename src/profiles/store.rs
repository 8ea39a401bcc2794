//! JSON-document persistence for mount profiles.
//!
//! The store is the single source of truth for persisted profiles. The whole
//! document is rewritten on every mutation; profile counts are small enough
//! that batching would buy nothing.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MountProfile, migrate};

/// Current on-disk document version
pub const DOCUMENT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed profile document {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode profile document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("no profile with id {0}")]
    NotFound(Uuid),

    #[error("a profile with id {0} already exists")]
    Duplicate(Uuid),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileDocument {
    pub version: u32,
    pub profiles: Vec<MountProfile>,
}

/// Persisted profile collection with write-through JSON storage
pub struct ProfileStore {
    path: PathBuf,
    profiles: RwLock<Vec<MountProfile>>,
}

impl ProfileStore {
    /// Load the store from `path`, upgrading legacy document shapes in
    /// place. A missing file yields an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut upgraded = false;

        let profiles = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                let (document, was_legacy) =
                    migrate::upgrade_document(value).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                upgraded = was_legacy;
                document.profiles
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No profile document at {}, starting empty", path.display());
                Vec::new()
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let store = Self {
            path,
            profiles: RwLock::new(profiles),
        };

        if upgraded {
            info!(
                "⬆️ Upgraded legacy profile document {}",
                store.path.display()
            );
            let profiles = store.profiles.read().await;
            store.write_document(&profiles).await?;
        }

        Ok(store)
    }

    /// Per-user default location of the profile document
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "netshare-manager")
            .map(|dirs| dirs.config_dir().join("profiles.json"))
            .unwrap_or_else(|| PathBuf::from("profiles.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list(&self) -> Vec<MountProfile> {
        self.profiles.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<MountProfile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn add(&self, profile: MountProfile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        if profiles.iter().any(|p| p.id == profile.id) {
            return Err(StoreError::Duplicate(profile.id));
        }

        info!("➕ Adding profile '{}'", profile.name);
        profiles.push(profile);
        self.write_document(&profiles).await
    }

    pub async fn update(&self, profile: MountProfile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        let index = profiles
            .iter()
            .position(|p| p.id == profile.id)
            .ok_or(StoreError::NotFound(profile.id))?;

        debug!("💾 Updating profile '{}'", profile.name);
        profiles[index] = profile;
        self.write_document(&profiles).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        let index = profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;

        info!("➖ Removing profile '{}'", profiles[index].name);
        profiles.remove(index);
        self.write_document(&profiles).await
    }

    async fn write_document(&self, profiles: &[MountProfile]) -> Result<(), StoreError> {
        let document = ProfileDocument {
            version: DOCUMENT_VERSION,
            profiles: profiles.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&document).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
