//! Hostname tracking for Bonjour-based profiles.
//!
//! Profiles created from discovered servers remember the advertised hostname.
//! The discovery service periodically re-resolves those hostnames and feeds a
//! drifted IP back into the stored URL, so a server that moved DHCP leases
//! keeps mounting. Resolution failures mean "no update available" and are
//! never fatal to the owning profile. Service browsing itself lives in the
//! presentation layer; browsed servers enter the engine through
//! `MountManager::import_discovered_server`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::interval;
use url::Url;

use crate::profiles::ProfileStore;
use crate::providers::NameResolver;

/// Upper bound for one resolution attempt
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(4);
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub struct NetworkDiscovery {
    store: Arc<ProfileStore>,
    resolver: Arc<dyn NameResolver>,
    running: AtomicBool,
    timeout: Duration,
    refresh_interval: Duration,
}

impl NetworkDiscovery {
    pub fn new(store: Arc<ProfileStore>, resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            store,
            resolver,
            running: AtomicBool::new(false),
            timeout: RESOLVE_TIMEOUT,
            refresh_interval: REFRESH_INTERVAL,
        }
    }

    /// Start the periodic refresh task. A second call while running is a
    /// no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("🛰 Discovery refresh already running");
            return;
        }

        let discovery = self.clone();
        tokio::spawn(async move {
            debug!("🛰 Discovery refresh started");
            let mut ticker = interval(discovery.refresh_interval);

            loop {
                ticker.tick().await;
                if !discovery.running.load(Ordering::SeqCst) {
                    debug!("🛰 Discovery refresh stopping");
                    break;
                }
                discovery.refresh_once().await;
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Re-resolve every profile that tracks a Bonjour hostname, updating the
    /// stored URL host when the address drifted. Returns how many profiles
    /// were updated.
    pub async fn refresh_once(&self) -> usize {
        let mut updated = 0;

        for profile in self.store.list().await {
            let Some(hostname) = profile.bonjour_hostname.as_deref().filter(|h| !h.is_empty())
            else {
                continue;
            };

            let Some(ip) = self.resolver.resolve(hostname, self.timeout).await else {
                debug!("🛰 {hostname} did not resolve, keeping stored URL");
                continue;
            };

            let Ok(mut url) = Url::parse(&profile.url) else {
                continue;
            };
            let resolved = ip.to_string();
            if url.host_str() == Some(resolved.as_str()) {
                continue;
            }
            if url.set_host(Some(&resolved)).is_err() {
                continue;
            }

            info!(
                "🛰 '{}' ({hostname}) now resolves to {resolved}",
                profile.name
            );
            let mut changed = profile.clone();
            changed.url = url.to_string();
            match self.store.update(changed).await {
                Ok(()) => updated += 1,
                Err(e) => warn!("⚠️ Failed to persist resolved host for '{}': {e}", profile.name),
            }
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::MountProfile;
    use crate::testing::StaticResolver;

    async fn store_in(dir: &tempfile::TempDir) -> Arc<ProfileStore> {
        Arc::new(
            ProfileStore::load(dir.path().join("profiles.json"))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_drifted_ip_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let mut profile = MountProfile::new("Media", "smb://192.168.1.40/media");
        profile.bonjour_hostname = Some("nas.local".to_string());
        store.add(profile.clone()).await.unwrap();

        let resolver = Arc::new(StaticResolver::with("nas.local", "192.168.1.77"));
        let discovery = NetworkDiscovery::new(store.clone(), resolver);

        assert_eq!(discovery.refresh_once().await, 1);
        assert_eq!(
            store.get(profile.id).await.unwrap().url,
            "smb://192.168.1.77/media"
        );
    }

    #[tokio::test]
    async fn test_matching_ip_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let mut profile = MountProfile::new("Media", "smb://192.168.1.40/media");
        profile.bonjour_hostname = Some("nas.local".to_string());
        store.add(profile.clone()).await.unwrap();

        let resolver = Arc::new(StaticResolver::with("nas.local", "192.168.1.40"));
        let discovery = NetworkDiscovery::new(store.clone(), resolver);

        assert_eq!(discovery.refresh_once().await, 0);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let mut profile = MountProfile::new("Media", "smb://192.168.1.40/media");
        profile.bonjour_hostname = Some("gone.local".to_string());
        store.add(profile.clone()).await.unwrap();

        let resolver = Arc::new(StaticResolver::default());
        let discovery = NetworkDiscovery::new(store.clone(), resolver);

        assert_eq!(discovery.refresh_once().await, 0);
        assert_eq!(
            store.get(profile.id).await.unwrap().url,
            "smb://192.168.1.40/media"
        );
    }

    #[tokio::test]
    async fn test_profiles_without_hostname_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .add(MountProfile::new("Plain", "smb://nas.local/media"))
            .await
            .unwrap();

        let resolver = Arc::new(StaticResolver::with("nas.local", "192.168.1.77"));
        let discovery = NetworkDiscovery::new(store.clone(), resolver);

        assert_eq!(discovery.refresh_once().await, 0);
    }
}
