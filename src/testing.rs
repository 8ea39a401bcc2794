//! Mock collaborators shared by the engine tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::mounts::error::MountError;
use crate::providers::{
    AppLauncher, ContextSource, DatagramSender, MountProvider, NameResolver, NetworkMount,
    ReachabilityProbe,
};

/// Mount provider backed by an in-memory mount table.
///
/// Successful mounts land under `/mnt/test/<share>` (or the requested hint)
/// and appear in the table with a `//host/share`-style source, the way the
/// OS reports smbfs mounts.
pub struct MockMountProvider {
    pub mount_calls: Mutex<Vec<String>>,
    pub unmount_calls: Mutex<Vec<PathBuf>>,
    /// When set, the next mounts fail with this (code, message)
    pub fail_with: Mutex<Option<(i32, String)>>,
    /// Overrides what `actual_source_url` reports, when set
    pub source_override: Mutex<Option<(String, String)>>,
    pub table: Mutex<Vec<NetworkMount>>,
}

impl MockMountProvider {
    pub fn new() -> Self {
        Self {
            mount_calls: Mutex::new(Vec::new()),
            unmount_calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            source_override: Mutex::new(None),
            table: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_mounts(&self, code: i32, message: &str) {
        *self.fail_with.lock().unwrap() = Some((code, message.to_string()));
    }

    pub fn push_table_entry(&self, fstype: &str, source: &str, mount_point: &str) {
        self.table.lock().unwrap().push(NetworkMount {
            fstype: fstype.to_string(),
            source: source.to_string(),
            mount_point: PathBuf::from(mount_point),
        });
    }

    fn source_for(url: &Url) -> String {
        let path = urlencoding::decode(url.path())
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| url.path().to_string());
        format!("//{}{}", url.host_str().unwrap_or_default(), path)
    }
}

#[async_trait]
impl MountProvider for MockMountProvider {
    async fn mount(&self, url: &Url, mount_point: Option<&Path>) -> Result<PathBuf, MountError> {
        self.mount_calls.lock().unwrap().push(url.to_string());

        if let Some((code, message)) = self.fail_with.lock().unwrap().clone() {
            return Err(MountError::ProviderFailed { code, message });
        }

        let path = mount_point.map(Path::to_path_buf).unwrap_or_else(|| {
            let share = url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("share");
            PathBuf::from("/mnt/test").join(share)
        });

        self.table.lock().unwrap().push(NetworkMount {
            fstype: "smbfs".to_string(),
            source: Self::source_for(url),
            mount_point: path.clone(),
        });
        Ok(path)
    }

    async fn unmount(&self, path: &Path) -> Result<(), MountError> {
        self.unmount_calls.lock().unwrap().push(path.to_path_buf());
        self.table
            .lock()
            .unwrap()
            .retain(|m| m.mount_point.as_path() != path);
        Ok(())
    }

    async fn actual_source_url(&self, path: &Path) -> Option<(String, String)> {
        if let Some(fixed) = self.source_override.lock().unwrap().clone() {
            return Some(fixed);
        }
        self.table
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.mount_point.as_path() == path)
            .map(|m| (m.source.clone(), m.fstype.clone()))
    }

    async fn list_network_mounts(&self) -> Result<Vec<NetworkMount>, MountError> {
        Ok(self.table.lock().unwrap().clone())
    }
}

/// Probe with a switchable answer
pub struct FlagProbe {
    reachable: AtomicBool,
}

impl FlagProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for FlagProbe {
    async fn is_reachable(&self, _host: &str) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Launcher that records invocations and always succeeds
#[derive(Default)]
pub struct RecordingLauncher {
    pub processes: Mutex<Vec<String>>,
    pub apps: Mutex<Vec<String>>,
}

#[async_trait]
impl AppLauncher for RecordingLauncher {
    async fn run_process(&self, path: &str, _args: &[String]) -> Result<i32, String> {
        self.processes.lock().unwrap().push(path.to_string());
        Ok(0)
    }

    async fn launch_application(&self, path: &str) -> bool {
        self.apps.lock().unwrap().push(path.to_string());
        true
    }
}

/// Datagram sink that records sends
#[derive(Default)]
pub struct RecordingUdp {
    pub sends: Mutex<Vec<(String, u16, usize)>>,
}

#[async_trait]
impl DatagramSender for RecordingUdp {
    async fn send_datagram(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), String> {
        self.sends
            .lock()
            .unwrap()
            .push((host.to_string(), port, payload.len()));
        Ok(())
    }
}

/// Fixed resolver answers keyed by hostname
#[derive(Default)]
pub struct StaticResolver {
    pub answers: Mutex<Vec<(String, std::net::IpAddr)>>,
}

impl StaticResolver {
    pub fn with(hostname: &str, ip: &str) -> Self {
        let resolver = Self::default();
        resolver
            .answers
            .lock()
            .unwrap()
            .push((hostname.to_string(), ip.parse().unwrap()));
        resolver
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve(&self, hostname: &str, _timeout: Duration) -> Option<std::net::IpAddr> {
        self.answers
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == hostname)
            .map(|(_, ip)| *ip)
    }
}

/// Fixed rule-evaluation context
#[derive(Default)]
pub struct StaticContext {
    pub ssid: Mutex<Option<String>>,
    pub apps: Mutex<Vec<String>>,
    pub vpns: Mutex<Vec<String>>,
}

impl StaticContext {
    pub fn with_ssid(ssid: &str) -> Self {
        let ctx = Self::default();
        *ctx.ssid.lock().unwrap() = Some(ssid.to_string());
        ctx
    }
}

#[async_trait]
impl ContextSource for StaticContext {
    async fn current_ssid(&self) -> Option<String> {
        self.ssid.lock().unwrap().clone()
    }

    async fn vpn_interfaces(&self) -> Vec<String> {
        self.vpns.lock().unwrap().clone()
    }

    async fn running_apps(&self) -> Vec<String> {
        self.apps.lock().unwrap().clone()
    }
}
