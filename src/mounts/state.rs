//! Runtime mount state, process-wide and never persisted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;
use uuid::Uuid;

/// Mount lifecycle state of one profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum MountStatus {
    #[default]
    Unmounted,
    Mounting,
    Mounted,
    Error {
        message: String,
    },
}

impl MountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, MountStatus::Mounted | MountStatus::Mounting)
    }
}

/// Why a profile left the mounted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnmountReason {
    /// `unmount()` was called on the manager
    Requested,
    /// The OS reported the path gone outside the manager's control
    External,
}

/// State-change notifications for listeners (tray/UI layers)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MountEvent {
    StatusChanged {
        profile_id: Uuid,
        status: MountStatus,
    },
    Mounted {
        profile_id: Uuid,
        path: PathBuf,
    },
    Unmounted {
        profile_id: Uuid,
        reason: UnmountReason,
    },
    ProfileImported {
        profile_id: Uuid,
    },
}

#[derive(Default)]
struct Inner {
    status: HashMap<Uuid, MountStatus>,
    mount_paths: HashMap<Uuid, PathBuf>,
    manually_unmounted: HashSet<Uuid>,
    last_attempt: HashMap<Uuid, Instant>,
}

/// Shared runtime state of the mount engine.
///
/// All maps live behind one lock so the status and path entries of a profile
/// change together. Concurrent writers for the same id resolve by arrival
/// order at the lock: last writer wins, there is no generation counter.
pub struct MountState {
    inner: RwLock<Inner>,
    events: broadcast::Sender<MountEvent>,
}

impl MountState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MountEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Current status of a profile; a profile never acted upon is Unmounted
    pub async fn status_of(&self, id: Uuid) -> MountStatus {
        self.inner
            .read()
            .await
            .status
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_status(&self, id: Uuid, status: MountStatus) {
        {
            let mut inner = self.inner.write().await;
            inner.status.insert(id, status.clone());
        }
        self.emit(MountEvent::StatusChanged {
            profile_id: id,
            status,
        });
    }

    /// Transition to Mounted and record the actual path in one step
    pub async fn record_mounted(&self, id: Uuid, path: PathBuf) {
        {
            let mut inner = self.inner.write().await;
            inner.status.insert(id, MountStatus::Mounted);
            inner.mount_paths.insert(id, path.clone());
        }
        self.emit(MountEvent::StatusChanged {
            profile_id: id,
            status: MountStatus::Mounted,
        });
        self.emit(MountEvent::Mounted {
            profile_id: id,
            path,
        });
    }

    /// Transition to Unmounted and drop the recorded path in one step
    pub async fn record_unmounted(&self, id: Uuid, reason: UnmountReason) {
        {
            let mut inner = self.inner.write().await;
            inner.status.insert(id, MountStatus::Unmounted);
            inner.mount_paths.remove(&id);
        }
        self.emit(MountEvent::StatusChanged {
            profile_id: id,
            status: MountStatus::Unmounted,
        });
        self.emit(MountEvent::Unmounted {
            profile_id: id,
            reason,
        });
    }

    pub async fn mount_path(&self, id: Uuid) -> Option<PathBuf> {
        self.inner.read().await.mount_paths.get(&id).cloned()
    }

    /// All (profile id, path) pairs currently recorded as mounted
    pub async fn mounted_paths(&self) -> Vec<(Uuid, PathBuf)> {
        self.inner
            .read()
            .await
            .mount_paths
            .iter()
            .map(|(id, path)| (*id, path.clone()))
            .collect()
    }

    /// Profile owning the given mounted path, if any
    pub async fn profile_for_path(&self, path: &Path) -> Option<Uuid> {
        self.inner
            .read()
            .await
            .mount_paths
            .iter()
            .find(|(_, recorded)| recorded.as_path() == path)
            .map(|(id, _)| *id)
    }

    pub async fn mark_manually_unmounted(&self, id: Uuid) {
        self.inner.write().await.manually_unmounted.insert(id);
    }

    pub async fn clear_manually_unmounted(&self, id: Uuid) {
        self.inner.write().await.manually_unmounted.remove(&id);
    }

    pub async fn is_manually_unmounted(&self, id: Uuid) -> bool {
        self.inner.read().await.manually_unmounted.contains(&id)
    }

    /// Move all runtime entries of one profile id to another, used when a
    /// validation mount under a throwaway id becomes a persisted profile
    pub async fn transfer(&self, from: Uuid, to: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(status) = inner.status.remove(&from) {
            inner.status.insert(to, status);
        }
        if let Some(path) = inner.mount_paths.remove(&from) {
            inner.mount_paths.insert(to, path);
        }
        if inner.manually_unmounted.remove(&from) {
            inner.manually_unmounted.insert(to);
        }
        if let Some(at) = inner.last_attempt.remove(&from) {
            inner.last_attempt.insert(to, at);
        }
    }

    /// Announce a profile created by scan/discovery import
    pub fn notify_profile_imported(&self, id: Uuid) {
        self.emit(MountEvent::ProfileImported { profile_id: id });
    }

    /// Record an auto-mount attempt for the cooldown gate
    pub async fn record_attempt(&self, id: Uuid) {
        self.inner
            .write()
            .await
            .last_attempt
            .insert(id, Instant::now());
    }

    /// Whether an auto-mount attempt happened within the cooldown window
    pub async fn within_cooldown(&self, id: Uuid, window: Duration) -> bool {
        self.inner
            .read()
            .await
            .last_attempt
            .get(&id)
            .is_some_and(|at| at.elapsed() < window)
    }
}

impl Default for MountState {
    fn default() -> Self {
        Self::new()
    }
}
