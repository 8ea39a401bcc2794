//! Lifecycle automation dispatch.
//!
//! Profiles carry an ordered list of side-effect tasks (shell scripts, app
//! launches, Wake-on-LAN packets) bound to mount lifecycle events. Tasks for
//! one event run strictly in configured order; a failing task is logged and
//! never fails the surrounding mount or unmount.

pub mod wol;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::sleep;

use crate::profiles::{AutomationConfig, AutomationKind, LifecycleEvent, MountProfile};
use crate::providers::{AppLauncher, DatagramSender};

const DEFAULT_WOL_PORT: u16 = 9;
const DEFAULT_WOL_BROADCAST: &str = "255.255.255.255";

/// Runs a profile's automations for one lifecycle event at a time
pub struct AutomationDispatcher {
    launcher: Arc<dyn AppLauncher>,
    udp: Arc<dyn DatagramSender>,
}

impl AutomationDispatcher {
    pub fn new(launcher: Arc<dyn AppLauncher>, udp: Arc<dyn DatagramSender>) -> Self {
        Self { launcher, udp }
    }

    /// Run every enabled task of `profile` bound to `event`, sequentially and
    /// in configured order. Task failures are logged and swallowed.
    pub async fn run_event(&self, event: LifecycleEvent, profile: &MountProfile) {
        let tasks: Vec<&AutomationConfig> = profile
            .automations
            .iter()
            .filter(|task| task.applies_to(event))
            .collect();

        if tasks.is_empty() {
            return;
        }
        debug!(
            "⚙️ Running {} automation task(s) for '{}' on {:?}",
            tasks.len(),
            profile.name,
            event
        );

        for task in tasks {
            if let Err(e) = self.run_task(task).await {
                warn!(
                    "⚠️ Automation task ({:?}) failed for '{}' on {:?}: {}",
                    task.kind, profile.name, event, e
                );
            }

            if task.wait_time > 0.0 {
                sleep(Duration::from_secs_f64(task.wait_time)).await;
            }
        }
    }

    async fn run_task(&self, task: &AutomationConfig) -> Result<(), String> {
        match task.kind {
            AutomationKind::Shell | AutomationKind::App => self.run_launch_task(task).await,
            AutomationKind::Wol => self.run_wol_task(task).await,
        }
    }

    async fn run_launch_task(&self, task: &AutomationConfig) -> Result<(), String> {
        let path = task
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or("no executable path configured")?;

        if task.kind == AutomationKind::App || is_app_bundle(path) {
            if self.launcher.launch_application(path).await {
                Ok(())
            } else {
                Err(format!("failed to launch application {path}"))
            }
        } else {
            // Naive whitespace tokenization, no quoting support
            let args: Vec<String> = task
                .arguments
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect();

            let code = self.launcher.run_process(path, &args).await?;
            if code == 0 {
                Ok(())
            } else {
                Err(format!("{path} exited with status {code}"))
            }
        }
    }

    async fn run_wol_task(&self, task: &AutomationConfig) -> Result<(), String> {
        let mac = task
            .mac_address
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or("no MAC address configured")?;
        let packet = wol::build_magic_packet(mac)?;

        let broadcast = task
            .broadcast_address
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_WOL_BROADCAST);
        let port = task.port.unwrap_or(DEFAULT_WOL_PORT);

        debug!("📡 Sending WOL packet for {mac} to {broadcast}:{port}");
        self.udp.send_datagram(broadcast, port, &packet).await
    }
}

/// Paths with an application-bundle suffix go through the app launcher even
/// when configured as shell tasks
fn is_app_bundle(path: &str) -> bool {
    path.trim_end_matches('/').ends_with(".app")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Process(String, Vec<String>),
        App(String),
        Datagram(String, u16, usize),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        fail_processes: bool,
    }

    #[async_trait]
    impl AppLauncher for Recorder {
        async fn run_process(&self, path: &str, args: &[String]) -> Result<i32, String> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Process(path.to_string(), args.to_vec()));
            if self.fail_processes {
                Err("spawn failed".to_string())
            } else {
                Ok(0)
            }
        }

        async fn launch_application(&self, path: &str) -> bool {
            self.calls.lock().unwrap().push(Call::App(path.to_string()));
            true
        }
    }

    #[async_trait]
    impl DatagramSender for Recorder {
        async fn send_datagram(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), String> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Datagram(host.to_string(), port, payload.len()));
            Ok(())
        }
    }

    fn dispatcher(recorder: &Arc<Recorder>) -> AutomationDispatcher {
        AutomationDispatcher::new(recorder.clone(), recorder.clone())
    }

    fn shell_task(path: &str, events: Vec<LifecycleEvent>) -> AutomationConfig {
        AutomationConfig {
            kind: AutomationKind::Shell,
            enabled: true,
            events,
            path: Some(path.to_string()),
            arguments: None,
            mac_address: None,
            broadcast_address: None,
            port: None,
            wait_time: 0.0,
        }
    }

    #[tokio::test]
    async fn test_tasks_filtered_by_event_and_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        profile.automations = vec![
            shell_task("/bin/first", vec![LifecycleEvent::Mounted]),
            shell_task("/bin/skipped", vec![LifecycleEvent::Unmounted]),
            shell_task("/bin/second", vec![LifecycleEvent::Mounted]),
        ];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::Mounted, &profile)
            .await;

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::Process("/bin/first".to_string(), vec![]),
                Call::Process("/bin/second".to_string(), vec![]),
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_tasks_are_skipped() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        let mut task = shell_task("/bin/never", vec![LifecycleEvent::Mounted]);
        task.enabled = false;
        profile.automations = vec![task];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::Mounted, &profile)
            .await;

        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_arguments_split_on_whitespace() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        let mut task = shell_task("/usr/local/bin/notify", vec![LifecycleEvent::PreMount]);
        task.arguments = Some("--volume media  --quiet".to_string());
        profile.automations = vec![task];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::PreMount, &profile)
            .await;

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![Call::Process(
                "/usr/local/bin/notify".to_string(),
                vec!["--volume".to_string(), "media".to_string(), "--quiet".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_app_bundle_path_uses_app_launcher() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        let task = shell_task("/Applications/Music.app", vec![LifecycleEvent::Mounted]);
        profile.automations = vec![task];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::Mounted, &profile)
            .await;

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![Call::App("/Applications/Music.app".to_string())]);
    }

    #[tokio::test]
    async fn test_wol_task_sends_magic_packet() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        profile.automations = vec![AutomationConfig {
            kind: AutomationKind::Wol,
            enabled: true,
            events: vec![LifecycleEvent::PreMount],
            path: None,
            arguments: None,
            mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            broadcast_address: Some("192.168.1.255".to_string()),
            port: Some(7),
            wait_time: 0.0,
        }];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::PreMount, &profile)
            .await;

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![Call::Datagram("192.168.1.255".to_string(), 7, 102)]);
    }

    #[tokio::test]
    async fn test_bad_mac_aborts_without_sending() {
        let recorder = Arc::new(Recorder::default());
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        profile.automations = vec![AutomationConfig {
            kind: AutomationKind::Wol,
            enabled: true,
            events: vec![LifecycleEvent::PreMount],
            path: None,
            arguments: None,
            mac_address: Some("not-a-mac".to_string()),
            broadcast_address: None,
            port: None,
            wait_time: 0.0,
        }];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::PreMount, &profile)
            .await;

        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_later_tasks() {
        let recorder = Arc::new(Recorder {
            fail_processes: true,
            ..Default::default()
        });
        let mut profile = MountProfile::new("NAS", "smb://nas.local/media");
        profile.automations = vec![
            shell_task("/bin/fails", vec![LifecycleEvent::MountFailed]),
            shell_task("/bin/still-runs", vec![LifecycleEvent::MountFailed]),
        ];

        dispatcher(&recorder)
            .run_event(LifecycleEvent::MountFailed, &profile)
            .await;

        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }
}
