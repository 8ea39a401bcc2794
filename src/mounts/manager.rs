//! The mount state machine.
//!
//! Per profile: `Unmounted → Mounting → {Mounted | Error}`, `Mounted →
//! Unmounted` via unmount or external-unmount detection, `Error → Mounting`
//! on retry. All status/path bookkeeping goes through the shared
//! [`MountState`] so a transition is visible atomically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::fs;
use url::Url;
use uuid::Uuid;

use crate::automation::AutomationDispatcher;
use crate::mounts::error::{MountError, MountResult};
use crate::mounts::reconcile;
use crate::mounts::state::{MountState, MountStatus, UnmountReason};
use crate::profiles::{LifecycleEvent, MountProfile, ProfileStore};
use crate::providers::{MountProvider, ReachabilityProbe};

/// Orchestrates mount/unmount transitions for all profiles
pub struct MountManager {
    store: Arc<ProfileStore>,
    provider: Arc<dyn MountProvider>,
    probe: Arc<dyn ReachabilityProbe>,
    automations: Arc<AutomationDispatcher>,
    state: Arc<MountState>,
}

impl MountManager {
    pub fn new(
        store: Arc<ProfileStore>,
        provider: Arc<dyn MountProvider>,
        probe: Arc<dyn ReachabilityProbe>,
        automations: Arc<AutomationDispatcher>,
        state: Arc<MountState>,
    ) -> Self {
        Self {
            store,
            provider,
            probe,
            automations,
            state,
        }
    }

    pub fn state(&self) -> &Arc<MountState> {
        &self.state
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn MountProvider> {
        &self.provider
    }

    pub async fn mount_by_id(&self, id: Uuid) -> MountResult<PathBuf> {
        let profile = self
            .store
            .get(id)
            .await
            .ok_or(MountError::ProfileNotFound(id))?;
        self.mount_profile(&profile).await
    }

    /// Mount a profile's share and return the path it landed on.
    ///
    /// An explicit mount always clears the manual-unmount flag, re-enabling
    /// future auto-remount. Mounting an already-mounted profile reports the
    /// recorded path without a second provider attempt.
    pub async fn mount_profile(&self, profile: &MountProfile) -> MountResult<PathBuf> {
        let id = profile.id;
        self.state.clear_manually_unmounted(id).await;

        if self.state.status_of(id).await == MountStatus::Mounted
            && let Some(path) = self.state.mount_path(id).await
        {
            debug!(
                "'{}' is already mounted at {}",
                profile.name,
                path.display()
            );
            return Ok(path);
        }

        info!("🔌 Mounting '{}' ({})", profile.name, profile.url);
        self.state.set_status(id, MountStatus::Mounting).await;
        self.automations
            .run_event(LifecycleEvent::PreMount, profile)
            .await;

        let url = match Url::parse(&profile.url) {
            Ok(url) => url,
            Err(_) => {
                let err = MountError::InvalidTarget(profile.url.clone());
                error!("❌ Cannot mount '{}': {err}", profile.name);
                self.state
                    .set_status(
                        id,
                        MountStatus::Error {
                            message: err.status_message(),
                        },
                    )
                    .await;
                return Err(err);
            }
        };

        let mount_hint: Option<PathBuf> = profile
            .mount_point
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        if let Some(dir) = &mount_hint
            && let Err(source) = fs::create_dir_all(dir).await
        {
            let err = MountError::DirectoryCreation {
                path: dir.clone(),
                source,
            };
            error!("❌ Cannot mount '{}': {err}", profile.name);
            self.state
                .set_status(
                    id,
                    MountStatus::Error {
                        message: err.status_message(),
                    },
                )
                .await;
            return Err(err);
        }

        match self.provider.mount(&url, mount_hint.as_deref()).await {
            Ok(actual_path) => {
                info!("✅ Mounted '{}' at {}", profile.name, actual_path.display());
                self.state.record_mounted(id, actual_path.clone()).await;
                self.reconcile_stored_url(profile, &actual_path).await;
                self.automations
                    .run_event(LifecycleEvent::Mounted, profile)
                    .await;
                Ok(actual_path)
            }
            Err(err) => {
                error!("❌ Mount of '{}' failed: {err}", profile.name);
                self.state
                    .set_status(
                        id,
                        MountStatus::Error {
                            message: err.status_message(),
                        },
                    )
                    .await;
                self.automations
                    .run_event(LifecycleEvent::MountFailed, profile)
                    .await;
                Err(err)
            }
        }
    }

    /// Release a profile's mount.
    ///
    /// Every explicit unmount is treated as user intent and suppresses
    /// auto-remount until the next explicit mount. A failing provider
    /// unmount only logs; the status stays as-is since the real state is
    /// ambiguous, and the watcher will catch up with reality.
    pub async fn unmount(&self, id: Uuid) -> MountResult<()> {
        self.state.mark_manually_unmounted(id).await;

        let profile = self.store.get(id).await;
        if let Some(profile) = &profile {
            self.automations
                .run_event(LifecycleEvent::PreUnmount, profile)
                .await;
        }

        let Some(path) = self.state.mount_path(id).await else {
            debug!("No recorded mount path for {id}, nothing to unmount");
            return Ok(());
        };

        let name = profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("<unknown>");
        info!("⏏️ Unmounting '{name}' at {}", path.display());

        match self.provider.unmount(&path).await {
            Ok(()) => {
                self.state
                    .record_unmounted(id, UnmountReason::Requested)
                    .await;
                if let Some(profile) = &profile {
                    self.automations
                        .run_event(LifecycleEvent::Unmounted, profile)
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Unmount of {} failed: {e}", path.display());
                Ok(())
            }
        }
    }

    /// React to the OS reporting `path` unmounted outside our control.
    ///
    /// The share leaves the Mounted state immediately. Whether auto-remount
    /// stays allowed depends on a reachability probe of the profile's host: a
    /// reachable server reads as a deliberate user unmount (suppress), an
    /// unreachable one as a network drop (let the next sweep retry). The
    /// probe is a proxy for intent, not certainty.
    pub async fn handle_external_unmount(&self, path: &Path) {
        let Some(id) = self.state.profile_for_path(path).await else {
            return;
        };

        info!("⏏️ {} was unmounted externally", path.display());
        self.state.record_unmounted(id, UnmountReason::External).await;

        let Some(profile) = self.store.get(id).await else {
            return;
        };
        let Some(host) = Url::parse(&profile.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        else {
            return;
        };

        if self.probe.is_reachable(&host).await {
            debug!(
                "Host {host} is reachable, treating unmount of '{}' as manual",
                profile.name
            );
            self.state.mark_manually_unmounted(id).await;
        } else {
            debug!(
                "Host {host} is unreachable, treating unmount of '{}' as network loss",
                profile.name
            );
        }
    }

    /// Reconcile profiles with network mounts that pre-date the process,
    /// e.g. shares mounted at a prior login. Returns how many new profiles
    /// were created.
    pub async fn scan_and_import_mounts(&self) -> MountResult<usize> {
        let mounts = self.provider.list_network_mounts().await?;
        let profiles = self.store.list().await;
        let mut imported = 0;

        for mount in mounts {
            let Some(url) = reconcile::canonical_url(&mount.source, &mount.fstype) else {
                continue;
            };
            let normalized = reconcile::normalize(&url);

            if let Some(existing) = profiles
                .iter()
                .find(|p| reconcile::normalize(&p.url) == normalized)
            {
                debug!(
                    "📎 '{}' already covers the mount at {}",
                    existing.name,
                    mount.mount_point.display()
                );
                self.state
                    .record_mounted(existing.id, mount.mount_point)
                    .await;
                continue;
            }

            let mut profile = MountProfile::new(reconcile::display_name_for_url(&url), url);
            profile.mount_point = Some(mount.mount_point.to_string_lossy().into_owned());
            info!(
                "➕ Importing existing mount {} as '{}'",
                mount.mount_point.display(),
                profile.name
            );

            let id = profile.id;
            self.store.add(profile).await?;
            self.state.record_mounted(id, mount.mount_point).await;
            self.state.notify_profile_imported(id);
            imported += 1;
        }

        Ok(imported)
    }

    /// Add a server found by discovery (or typed into the add dialog).
    ///
    /// Three tiers: a profile tracking the same Bonjour hostname is updated
    /// and reused; a profile with the same normalized URL is reused; anything
    /// else gets a validation mount under a throwaway profile and is only
    /// persisted when that mount succeeds.
    pub async fn import_discovered_server(
        &self,
        url: &str,
        bonjour_hostname: Option<&str>,
        mount_point: Option<&str>,
    ) -> MountResult<MountProfile> {
        let profiles = self.store.list().await;

        if let Some(hostname) = bonjour_hostname.filter(|h| !h.is_empty())
            && let Some(existing) = profiles
                .iter()
                .find(|p| p.bonjour_hostname.as_deref() == Some(hostname))
        {
            let mut existing = existing.clone();
            if let (Ok(mut stored), Ok(discovered)) = (Url::parse(&existing.url), Url::parse(url))
                && let Some(new_host) = discovered.host_str()
                && stored.host_str() != Some(new_host)
                && stored.set_host(Some(new_host)).is_ok()
            {
                info!("🔁 '{}' resolved to new host {new_host}", existing.name);
                existing.url = stored.to_string();
                self.store.update(existing.clone()).await?;
            }

            if !self.state.status_of(existing.id).await.is_active() {
                let _ = self.mount_profile(&existing).await;
            }
            return Ok(existing);
        }

        let normalized = reconcile::normalize(url);
        if let Some(existing) = profiles
            .iter()
            .find(|p| reconcile::normalize(&p.url) == normalized)
        {
            debug!("📎 Discovered server already stored as '{}'", existing.name);
            // "Adding" implies a connectivity check
            if !self.state.status_of(existing.id).await.is_active() {
                let _ = self.mount_profile(existing).await;
            }
            return Ok(existing.clone());
        }

        // Validation mount under a throwaway profile; nothing is persisted
        // unless it succeeds
        let mut candidate = MountProfile::new(reconcile::display_name_for_url(url), url.to_string());
        candidate.bonjour_hostname = bonjour_hostname.map(str::to_string);
        candidate.mount_point = mount_point.map(str::to_string);

        let path = self.mount_profile(&candidate).await?;

        let mut final_url = candidate.url.clone();
        if let Some((source, fstype)) = self.provider.actual_source_url(&path).await
            && let Some(updated) = reconcile::reconciled_url(&candidate.url, &source, &fstype)
        {
            final_url = updated;
        }

        let mut profile =
            MountProfile::new(reconcile::display_name_for_url(&final_url), final_url);
        profile.bonjour_hostname = candidate.bonjour_hostname.clone();
        profile.mount_point = candidate.mount_point.clone();

        self.store.add(profile.clone()).await?;
        self.state.transfer(candidate.id, profile.id).await;
        self.state.notify_profile_imported(profile.id);
        info!("➕ Imported discovered server '{}' ({})", profile.name, profile.url);
        Ok(profile)
    }

    /// Persist an edited profile; when its connection target changed while
    /// mounted, bounce the mount so the new target takes effect. The explicit
    /// remount clears the manual-unmount flag the intermediate unmount sets.
    pub async fn update_profile_and_reconnect(&self, profile: MountProfile) -> MountResult<()> {
        let previous = self
            .store
            .get(profile.id)
            .await
            .ok_or(MountError::ProfileNotFound(profile.id))?;
        self.store.update(profile.clone()).await?;

        let target_changed = reconcile::normalize(&previous.url)
            != reconcile::normalize(&profile.url)
            || previous.mount_point != profile.mount_point;

        if target_changed && self.state.status_of(profile.id).await == MountStatus::Mounted {
            info!(
                "🔄 Connection target of '{}' changed, reconnecting",
                profile.name
            );
            self.unmount(profile.id).await?;
            self.mount_profile(&profile).await?;
        }
        Ok(())
    }

    /// Unmount everything we currently hold mounted (shutdown path)
    pub async fn unmount_all(&self) {
        for (id, _) in self.state.mounted_paths().await {
            if let Err(e) = self.unmount(id).await {
                warn!("⚠️ Shutdown unmount of {id} failed: {e}");
            }
        }
    }

    /// Correct the stored URL from what the filesystem actually mounted.
    /// Only applies to persisted profiles; failures never affect the mount
    /// outcome.
    async fn reconcile_stored_url(&self, profile: &MountProfile, mounted_path: &Path) {
        if self.store.get(profile.id).await.is_none() {
            return;
        }
        let Some((source, fstype)) = self.provider.actual_source_url(mounted_path).await else {
            debug!(
                "No source info for {}, skipping URL reconciliation",
                mounted_path.display()
            );
            return;
        };
        let Some(updated) = reconcile::reconciled_url(&profile.url, &source, &fstype) else {
            return;
        };

        info!(
            "🔁 Canonical URL for '{}' is {updated} (was {})",
            profile.name, profile.url
        );
        let mut changed = profile.clone();
        changed.url = updated;
        if let Err(e) = self.store.update(changed).await {
            warn!(
                "⚠️ Failed to persist reconciled URL for '{}': {e}",
                profile.name
            );
        }
    }
}
