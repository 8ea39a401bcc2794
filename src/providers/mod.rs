//! Collaborator interfaces the engine drives.
//!
//! Everything slow or platform-specific sits behind one of these traits so the
//! engine can be exercised in tests with fakes. Production implementations
//! live in [`system`].

pub mod system;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::mounts::error::MountError;

/// One entry of the live mount table, as reported by the OS
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMount {
    /// Filesystem type, e.g. `smbfs`, `nfs`, `cifs`
    pub fstype: String,
    /// Raw source string, e.g. `//user@nas.local/media`
    pub source: String,
    pub mount_point: PathBuf,
}

/// Performs the actual mount/unmount work and answers mount-table queries.
///
/// Mounts are soft: a dead server fails the attempt quickly instead of
/// wedging the caller.
#[async_trait]
pub trait MountProvider: Send + Sync {
    /// Mount `url`, preferring `mount_point` when given. Returns the path the
    /// share actually landed on, which may differ from the requested one.
    async fn mount(&self, url: &Url, mount_point: Option<&Path>) -> Result<PathBuf, MountError>;

    async fn unmount(&self, path: &Path) -> Result<(), MountError>;

    /// The filesystem-reported source of a mounted path, with its type.
    /// `None` when the path is not (or no longer) a known mount.
    async fn actual_source_url(&self, path: &Path) -> Option<(String, String)>;

    /// All currently mounted network filesystems
    async fn list_network_mounts(&self) -> Result<Vec<NetworkMount>, MountError>;
}

/// Single bounded-time liveness check against a host
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, host: &str) -> bool;
}

/// Hostname to IP resolution, bounded by `timeout`. Browsing for services is
/// a presentation-layer concern and stays out of the core; discovered servers
/// enter through `MountManager::import_discovered_server`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, hostname: &str, timeout: Duration) -> Option<IpAddr>;
}

/// Spawns automation processes and activates applications
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Run an executable to completion, returning its exit code
    async fn run_process(&self, path: &str, args: &[String]) -> Result<i32, String>;

    /// Bring an application (bundle) up; true on success
    async fn launch_application(&self, path: &str) -> bool;
}

/// Fire-and-forget UDP, used for Wake-on-LAN magic packets
#[async_trait]
pub trait DatagramSender: Send + Sync {
    async fn send_datagram(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), String>;
}

/// Source of the live rule-evaluation context
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// SSID of the associated Wi-Fi network, if any
    async fn current_ssid(&self) -> Option<String>;

    /// Names of active VPN-class interfaces
    async fn vpn_interfaces(&self) -> Vec<String>;

    /// Names of currently running applications/processes
    async fn running_apps(&self) -> Vec<String>;
}
