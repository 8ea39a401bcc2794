//! Background watcher for externally removed mounts.
//!
//! The OS can take a share away at any time (user eject, server gone,
//! network drop). The watcher periodically diffs the manager's recorded
//! mounts against the live mount table and routes every disappeared path
//! through the manager's external-unmount handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;
use tokio::time;

use crate::mounts::error::MountResult;
use crate::mounts::manager::MountManager;
use crate::providers::NetworkMount;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5);

pub struct MountWatcher {
    manager: Arc<MountManager>,
    running: AtomicBool,
    interval: Duration,
}

impl MountWatcher {
    pub fn new(manager: Arc<MountManager>, interval: Duration) -> Self {
        Self {
            manager,
            running: AtomicBool::new(false),
            interval,
        }
    }

    /// Start the watcher task. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("🔍 Mount watcher already running");
            return;
        }

        let watcher = self.clone();
        tokio::spawn(async move {
            debug!("🔍 Mount watcher started");
            let mut interval = time::interval(watcher.interval);

            loop {
                interval.tick().await;
                if !watcher.running.load(Ordering::SeqCst) {
                    debug!("🔍 Mount watcher stopping");
                    break;
                }

                // Nothing recorded: skip the mount-table read entirely
                if watcher.manager.state().mounted_paths().await.is_empty() {
                    continue;
                }

                if let Err(e) = watcher.check_once().await {
                    debug!("🔍 Mount watcher reconcile failed: {e}");
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("🔍 Mount watcher stop requested");
    }

    /// Force one reconciliation pass, for event-driven callers
    pub async fn force_check(&self) -> MountResult<()> {
        self.check_once().await
    }

    async fn check_once(&self) -> MountResult<()> {
        let live: Vec<NetworkMount> = self.manager.provider().list_network_mounts().await?;

        for (_, path) in self.manager.state().mounted_paths().await {
            let still_mounted = live.iter().any(|m| m.mount_point == path);
            if !still_mounted {
                self.manager.handle_external_unmount(&path).await;
            }
        }
        Ok(())
    }
}
