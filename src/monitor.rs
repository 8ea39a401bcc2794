//! Network monitoring and the debounced auto-mount sweep.
//!
//! Connectivity changes rarely arrive in a usable state: DNS and interface
//! configuration trail the first notification by a moment. The monitor
//! therefore waits a short settle delay after every observed change before
//! sweeping all profiles through the rule engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;
use tokio::time::{interval, sleep};

use crate::mounts::MountManager;
use crate::providers::ContextSource;
use crate::rules::{self, RuleContext};

/// Minimum interval between automatic mount attempts for one profile
pub const AUTO_MOUNT_COOLDOWN: Duration = Duration::from_secs(5);
/// Delay after a network change before sweeping
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Shorter settle delay for the launch-time sweep
pub const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(1);
/// How often the network fingerprint is re-sampled
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct NetworkMonitor {
    manager: Arc<MountManager>,
    context: Arc<dyn ContextSource>,
    running: AtomicBool,
    sweep_pending: AtomicBool,
    cooldown: Duration,
    settle_delay: Duration,
    startup_delay: Duration,
    poll_interval: Duration,
}

impl NetworkMonitor {
    pub fn new(manager: Arc<MountManager>, context: Arc<dyn ContextSource>) -> Self {
        Self {
            manager,
            context,
            running: AtomicBool::new(false),
            sweep_pending: AtomicBool::new(false),
            cooldown: AUTO_MOUNT_COOLDOWN,
            settle_delay: SETTLE_DELAY,
            startup_delay: STARTUP_SETTLE_DELAY,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Start observing. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("🌐 Network monitor already running");
            return;
        }

        let monitor = self.clone();
        tokio::spawn(async move {
            debug!("🌐 Network monitor started");
            monitor.run().await;
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("🌐 Network monitor stop requested");
    }

    async fn run(&self) {
        // One immediate pass to catch profiles eligible at launch
        sleep(self.startup_delay).await;
        self.check_auto_mount().await;

        let mut fingerprint = self.fingerprint().await;
        let mut ticker = interval(self.poll_interval);

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                debug!("🌐 Network monitor stopping");
                break;
            }

            let current = self.fingerprint().await;
            if current != fingerprint {
                debug!("🌐 Network change detected");
                fingerprint = current;
                sleep(self.settle_delay).await;
                self.check_auto_mount().await;
            }
        }
    }

    /// Trigger a debounced sweep from an OS-level connectivity notification.
    /// Collapses into one sweep when notifications arrive in bursts.
    pub fn notify_change(self: &Arc<Self>) {
        if self.sweep_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let monitor = self.clone();
        tokio::spawn(async move {
            sleep(monitor.settle_delay).await;
            monitor.sweep_pending.store(false, Ordering::SeqCst);
            monitor.check_auto_mount().await;
        });
    }

    /// SSID plus the sorted VPN interface set; a change in either is a
    /// network transition worth reacting to
    async fn fingerprint(&self) -> String {
        let ssid = self.context.current_ssid().await.unwrap_or_default();
        let mut vpns = self.context.vpn_interfaces().await;
        vpns.sort();
        format!("{ssid}|{}", vpns.join(","))
    }

    /// Sweep all profiles and mount every one that passes the gates.
    ///
    /// Gate order, short-circuiting on the first failure: enabled,
    /// auto-mount opt-in, not manually unmounted, not already
    /// mounted/mounting, outside the cooldown window, rules satisfied.
    /// Mounts run concurrently; the sweep never blocks on their outcome.
    pub async fn check_auto_mount(&self) {
        let ctx = RuleContext {
            ssid: self.context.current_ssid().await,
            running_apps: self.context.running_apps().await,
            vpn_interfaces: self.context.vpn_interfaces().await,
        };
        debug!(
            "🌐 Auto-mount sweep (ssid: {:?}, {} vpn interface(s))",
            ctx.ssid,
            ctx.vpn_interfaces.len()
        );

        let state = self.manager.state();
        for profile in self.manager.store().list().await {
            if !profile.is_enabled || !profile.auto_mount {
                continue;
            }
            if state.is_manually_unmounted(profile.id).await {
                debug!("⏭ '{}' was manually unmounted, skipping", profile.name);
                continue;
            }
            if state.status_of(profile.id).await.is_active() {
                continue;
            }
            if state.within_cooldown(profile.id, self.cooldown).await {
                debug!("⏭ '{}' is in its cooldown window, skipping", profile.name);
                continue;
            }
            if !rules::evaluate(&profile, &ctx) {
                debug!("⏭ Rules keep '{}' unmounted", profile.name);
                continue;
            }

            state.record_attempt(profile.id).await;
            let manager = self.manager.clone();
            tokio::spawn(async move {
                // The outcome lands in the status map either way
                let _ = manager.mount_profile(&profile).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutomationDispatcher;
    use crate::mounts::{MountState, MountStatus};
    use crate::profiles::{MountProfile, MountRule, ProfileStore, RuleKind, RuleOperator};
    use crate::testing::{
        FlagProbe, MockMountProvider, RecordingLauncher, RecordingUdp, StaticContext,
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        provider: Arc<MockMountProvider>,
        probe: Arc<FlagProbe>,
        context: Arc<StaticContext>,
        manager: Arc<MountManager>,
        monitor: NetworkMonitor,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ProfileStore::load(dir.path().join("profiles.json"))
                .await
                .unwrap(),
        );
        let provider = Arc::new(MockMountProvider::new());
        let probe = Arc::new(FlagProbe::new(true));
        let context = Arc::new(StaticContext::with_ssid("Home"));
        let automations = Arc::new(AutomationDispatcher::new(
            Arc::new(RecordingLauncher::default()),
            Arc::new(RecordingUdp::default()),
        ));
        let manager = Arc::new(MountManager::new(
            store,
            provider.clone(),
            probe.clone(),
            automations,
            Arc::new(MountState::new()),
        ));
        let monitor = NetworkMonitor::new(manager.clone(), context.clone());
        Fixture {
            _dir: dir,
            provider,
            probe,
            context,
            manager,
            monitor,
        }
    }

    async fn auto_profile(fx: &Fixture, name: &str, url: &str) -> MountProfile {
        let mut profile = MountProfile::new(name, url);
        profile.auto_mount = true;
        profile.rules.push(MountRule::new(
            RuleKind::Wifi,
            RuleOperator::Equals,
            "Home",
        ));
        fx.manager.store().add(profile.clone()).await.unwrap();
        profile
    }

    /// Let spawned mount tasks run to completion
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn mount_calls(fx: &Fixture) -> usize {
        fx.provider.mount_calls.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_sweep_mounts_eligible_profile() {
        let fx = fixture().await;
        let profile = auto_profile(&fx, "Media", "smb://nas.local/media").await;

        fx.monitor.check_auto_mount().await;
        settle().await;

        assert_eq!(mount_calls(&fx), 1);
        assert_eq!(
            fx.manager.state().status_of(profile.id).await,
            MountStatus::Mounted
        );
    }

    #[tokio::test]
    async fn test_sweep_skips_disabled_and_non_auto_profiles() {
        let fx = fixture().await;
        let mut disabled = MountProfile::new("Off", "smb://nas.local/off");
        disabled.is_enabled = false;
        disabled.auto_mount = true;
        fx.manager.store().add(disabled).await.unwrap();

        // Enabled, but never opted into auto-mount
        let manual_only = MountProfile::new("Manual", "smb://nas.local/manual");
        fx.manager.store().add(manual_only).await.unwrap();

        fx.monitor.check_auto_mount().await;
        settle().await;

        assert_eq!(mount_calls(&fx), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_when_rules_do_not_match() {
        let fx = fixture().await;
        auto_profile(&fx, "Media", "smb://nas.local/media").await;
        *fx.context.ssid.lock().unwrap() = Some("CoffeeShop".to_string());

        fx.monitor.check_auto_mount().await;
        settle().await;

        assert_eq!(mount_calls(&fx), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_mounted_profile() {
        let fx = fixture().await;
        let profile = auto_profile(&fx, "Media", "smb://nas.local/media").await;
        fx.manager.mount_profile(&profile).await.unwrap();
        assert_eq!(mount_calls(&fx), 1);

        fx.monitor.check_auto_mount().await;
        settle().await;

        assert_eq!(mount_calls(&fx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_second_attempt() {
        let fx = fixture().await;
        auto_profile(&fx, "Flaky", "smb://flaky.local/share").await;
        // Keep the profile unmounted so only the cooldown gate can stop the
        // second sweep
        fx.provider.fail_next_mounts(64, "server unreachable");

        fx.monitor.check_auto_mount().await;
        settle().await;
        assert_eq!(mount_calls(&fx), 1);

        // Second sweep right away: inside the 5s window
        fx.monitor.check_auto_mount().await;
        settle().await;
        assert_eq!(mount_calls(&fx), 1);

        // Past the window the profile is eligible again
        tokio::time::advance(Duration::from_secs(6)).await;
        fx.monitor.check_auto_mount().await;
        settle().await;
        assert_eq!(mount_calls(&fx), 2);
    }

    #[tokio::test]
    async fn test_manual_unmount_suppresses_sweep_until_explicit_mount() {
        let fx = fixture().await;
        let profile = auto_profile(&fx, "Media", "smb://nas.local/media").await;

        fx.manager.mount_profile(&profile).await.unwrap();
        fx.manager.unmount(profile.id).await.unwrap();
        assert_eq!(mount_calls(&fx), 1);

        // Matching rules, but the manual flag wins
        fx.monitor.check_auto_mount().await;
        settle().await;
        assert_eq!(mount_calls(&fx), 1);

        // An explicit mount clears the flag
        fx.manager.mount_profile(&profile).await.unwrap();
        assert_eq!(mount_calls(&fx), 2);
        assert!(!fx.manager.state().is_manually_unmounted(profile.id).await);

        // Lose the share to a network drop: the next sweep may remount
        fx.provider.table.lock().unwrap().clear();
        fx.probe.set_reachable(false);
        let path = std::path::PathBuf::from("/mnt/test/media");
        fx.manager.handle_external_unmount(&path).await;

        fx.monitor.check_auto_mount().await;
        settle().await;
        assert_eq!(mount_calls(&fx), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_change_debounces_bursts() {
        let fx = fixture().await;
        auto_profile(&fx, "Media", "smb://nas.local/media").await;

        let monitor = Arc::new(fixture_monitor(&fx));
        monitor.notify_change();
        monitor.notify_change();
        monitor.notify_change();

        // Let the settle delay elapse and the single sweep run
        tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(100)).await;
        settle().await;

        assert_eq!(mount_calls(&fx), 1);
    }

    fn fixture_monitor(fx: &Fixture) -> NetworkMonitor {
        NetworkMonitor::new(fx.manager.clone(), fx.context.clone())
    }
}
