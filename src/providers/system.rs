//! Production collaborator implementations.
//!
//! Everything here talks to the OS: mount utilities, ping, DNS, process
//! spawning, UDP. The engine only sees the traits in the parent module.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::UdpSocket;
use url::Url;

use crate::mounts::error::MountError;
use crate::providers::{
    AppLauncher, ContextSource, DatagramSender, MountProvider, NameResolver, NetworkMount,
    ReachabilityProbe,
};
use crate::utils::command::Command;

/// Filesystem types treated as network mounts
const NETWORK_FSTYPES: &[&str] = &[
    "smbfs", "cifs", "smb3", "afpfs", "nfs", "nfs4", "webdav", "davfs", "ftp", "ftpfs",
];

/// Interface name prefixes counted as VPN-class links
const VPN_PREFIXES: &[&str] = &["utun", "tun", "tap", "wg", "ppp", "ipsec", "vpn", "tailscale"];

/// Mounts shares by shelling out to the platform mount utilities.
///
/// All mounts are soft: the utilities get soft-mount options where they
/// support them, and the whole attempt runs under a hard timeout so a dead
/// server fails the attempt instead of wedging the engine.
pub struct SystemMountProvider {
    base_dir: PathBuf,
    attempt_timeout: Duration,
}

impl SystemMountProvider {
    pub fn new() -> Self {
        Self::with_base_dir(Self::default_base_dir())
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    fn default_base_dir() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            PathBuf::from("/Volumes")
        }
        #[cfg(not(target_os = "macos"))]
        {
            directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join("mnt"))
                .unwrap_or_else(|| PathBuf::from("/mnt"))
        }
    }

    /// Pick a mount point under the base directory, appending a numeric
    /// suffix when the plain name is taken by a non-empty directory
    fn pick_mount_point(&self, url: &Url) -> PathBuf {
        let name = share_name(url);
        let mut candidate = self.base_dir.join(&name);
        let mut suffix = 1;

        while directory_in_use(&candidate) {
            candidate = self.base_dir.join(format!("{name}-{suffix}"));
            suffix += 1;
        }
        candidate
    }
}

impl Default for SystemMountProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn directory_in_use(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        // Missing is free, unreadable is taken
        Err(e) => e.kind() != std::io::ErrorKind::NotFound,
    }
}

/// Decoded last path segment of the share URL, or the host when the URL has
/// no path
fn share_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(&s)
                .map(|c| c.into_owned())
                .unwrap_or(s)
        })
        .unwrap_or_else(|| url.host_str().unwrap_or("share").to_string())
}

/// `//[user@]host[:port]/path` spec the BSD mount utilities expect
#[cfg(target_os = "macos")]
fn smb_share_spec(url: &Url) -> String {
    let mut spec = String::from("//");
    if !url.username().is_empty() {
        spec.push_str(url.username());
        spec.push('@');
    }
    spec.push_str(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        spec.push_str(&format!(":{port}"));
    }
    spec.push_str(url.path());
    spec
}

#[cfg(any(target_os = "macos", target_os = "linux", test))]
fn nfs_share_spec(url: &Url) -> String {
    let path = urlencoding::decode(url.path())
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| url.path().to_string());
    format!("{}:{}", url.host_str().unwrap_or_default(), path)
}

#[cfg(target_os = "macos")]
fn mount_command(url: &Url, mount_point: &Path) -> Result<(String, Vec<String>), MountError> {
    let mp = mount_point.display().to_string();
    let (program, args) = match url.scheme() {
        "smb" | "cifs" => (
            "/sbin/mount_smbfs",
            vec!["-o".into(), "soft".into(), smb_share_spec(url), mp],
        ),
        "afp" => (
            "/sbin/mount_afp",
            vec!["-o".into(), "soft".into(), url.to_string(), mp],
        ),
        "nfs" => (
            "/sbin/mount_nfs",
            vec![
                "-o".into(),
                "soft,timeo=10,retrycnt=1".into(),
                nfs_share_spec(url),
                mp,
            ],
        ),
        "http" | "https" => ("/sbin/mount_webdav", vec![url.to_string(), mp]),
        "ftp" => ("/sbin/mount_ftp", vec![url.to_string(), mp]),
        other => return Err(MountError::InvalidTarget(format!("unsupported scheme '{other}'"))),
    };
    Ok((program.to_string(), args))
}

#[cfg(target_os = "linux")]
fn mount_command(url: &Url, mount_point: &Path) -> Result<(String, Vec<String>), MountError> {
    let mp = mount_point.display().to_string();
    let (program, args) = match url.scheme() {
        "smb" | "cifs" => {
            let mut options = String::from("soft");
            if url.username().is_empty() {
                options.push_str(",guest");
            } else {
                options.push_str(&format!(",username={}", url.username()));
            }
            let source = format!("//{}{}", url.host_str().unwrap_or_default(), url.path());
            (
                "mount",
                vec!["-t".into(), "cifs".into(), "-o".into(), options, source, mp],
            )
        }
        "nfs" => (
            "mount",
            vec![
                "-t".into(),
                "nfs".into(),
                "-o".into(),
                "soft,timeo=10,retrans=1".into(),
                nfs_share_spec(url),
                mp,
            ],
        ),
        "http" | "https" => (
            "mount",
            vec!["-t".into(), "davfs".into(), url.to_string(), mp],
        ),
        "ftp" => ("curlftpfs", vec![url.to_string(), mp]),
        other => return Err(MountError::InvalidTarget(format!("unsupported scheme '{other}'"))),
    };
    Ok((program.to_string(), args))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn mount_command(_url: &Url, _mount_point: &Path) -> Result<(String, Vec<String>), MountError> {
    Err(MountError::ProviderFailed {
        code: -1,
        message: "no mount utility available on this platform".to_string(),
    })
}

#[async_trait]
impl MountProvider for SystemMountProvider {
    async fn mount(&self, url: &Url, mount_point: Option<&Path>) -> Result<PathBuf, MountError> {
        let target = mount_point
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.pick_mount_point(url));

        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|source| MountError::DirectoryCreation {
                path: target.clone(),
                source,
            })?;

        let (program, args) = mount_command(url, &target)?;
        debug!("🔌 {program} {}", args.join(" "));

        let output = tokio::time::timeout(
            self.attempt_timeout,
            Command::new(&program).args(&args).output(),
        )
        .await
        .map_err(|_| MountError::Timeout(self.attempt_timeout.as_secs()))?
        .map_err(|e| MountError::ProviderFailed {
            code: -1,
            message: format!("failed to run {program}: {e}"),
        })?;

        if output.status.success() {
            Ok(target)
        } else {
            // Drop the directory we just created, best effort
            let _ = tokio::fs::remove_dir(&target).await;

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(MountError::ProviderFailed {
                code: output.status.code().unwrap_or(-1),
                message: if stderr.is_empty() {
                    format!("{program} failed")
                } else {
                    stderr
                },
            })
        }
    }

    async fn unmount(&self, path: &Path) -> Result<(), MountError> {
        let program = which::which("umount").unwrap_or_else(|_| PathBuf::from("/sbin/umount"));

        let output = Command::new(&program)
            .arg(path)
            .output()
            .await
            .map_err(|e| MountError::UnmountFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MountError::UnmountFailed {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn actual_source_url(&self, path: &Path) -> Option<(String, String)> {
        self.list_network_mounts()
            .await
            .ok()?
            .into_iter()
            .find(|m| m.mount_point.as_path() == path)
            .map(|m| (m.source, m.fstype))
    }

    async fn list_network_mounts(&self) -> Result<Vec<NetworkMount>, MountError> {
        // Linux exposes the table directly; elsewhere the mount utility
        // prints it
        if let Ok(contents) = tokio::fs::read_to_string("/proc/self/mounts").await {
            return Ok(parse_proc_mounts(&contents));
        }

        let program = which::which("mount").unwrap_or_else(|_| PathBuf::from("/sbin/mount"));
        let output = Command::new(&program)
            .output()
            .await
            .map_err(|e| MountError::MountTable(e.to_string()))?;
        if !output.status.success() {
            return Err(MountError::MountTable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_bsd_mount_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// Parse BSD `mount` output lines of the form
/// `//user@host/share on /Volumes/share (smbfs, nodev, nosuid, mounted by x)`
fn parse_bsd_mount_output(output: &str) -> Vec<NetworkMount> {
    output
        .lines()
        .filter_map(|line| {
            let (source, rest) = line.split_once(" on ")?;
            let (mount_point, annotations) = rest.rsplit_once(" (")?;
            let fstype = annotations.split([',', ')']).next()?.trim();
            Some(NetworkMount {
                fstype: fstype.to_string(),
                source: source.to_string(),
                mount_point: PathBuf::from(mount_point),
            })
        })
        .filter(|m| NETWORK_FSTYPES.contains(&m.fstype.as_str()))
        .collect()
}

/// Parse `/proc/self/mounts`, undoing the octal escapes the kernel uses for
/// spaces and friends
fn parse_proc_mounts(contents: &str) -> Vec<NetworkMount> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            Some(NetworkMount {
                fstype: fstype.to_string(),
                source: decode_octal_escapes(source),
                mount_point: PathBuf::from(decode_octal_escapes(mount_point)),
            })
        })
        .filter(|m| NETWORK_FSTYPES.contains(&m.fstype.as_str()))
        .collect()
}

fn decode_octal_escapes(field: &str) -> String {
    let mut result = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3
            && let Ok(code) = u8::from_str_radix(&digits, 8)
        {
            result.push(code as char);
            chars.nth(2);
        } else {
            result.push(c);
        }
    }
    result
}

/// Liveness probe via one bounded `ping`
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, host: &str) -> bool {
        let Ok(ping) = which::which("ping") else {
            warn!("⚠️ No ping binary found, treating {host} as unreachable");
            return false;
        };

        #[cfg(target_os = "macos")]
        let args: &[&str] = &["-c", "1", "-t", "1", host];
        #[cfg(target_os = "linux")]
        let args: &[&str] = &["-c", "1", "-W", "1", host];
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        let args: &[&str] = &["-n", "1", "-w", "1000", host];

        match tokio::time::timeout(self.timeout, Command::new(&ping).args(args).output()).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }
}

/// Resolver backed by the system DNS (which handles `.local` through
/// mDNS on the platforms we care about)
pub struct DnsNameResolver;

#[async_trait]
impl NameResolver for DnsNameResolver {
    async fn resolve(&self, hostname: &str, timeout: Duration) -> Option<IpAddr> {
        let lookup = tokio::net::lookup_host((hostname, 0));
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().map(|addr| addr.ip()),
            Ok(Err(e)) => {
                debug!("🛰 Resolution of {hostname} failed: {e}");
                None
            }
            Err(_) => {
                debug!("🛰 Resolution of {hostname} timed out");
                None
            }
        }
    }
}

/// Spawns automation processes and opens application bundles
pub struct SystemAppLauncher;

#[async_trait]
impl AppLauncher for SystemAppLauncher {
    async fn run_process(&self, path: &str, args: &[String]) -> Result<i32, String> {
        let output = Command::new(path)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to spawn {path}: {e}"))?;
        Ok(output.status.code().unwrap_or(-1))
    }

    #[cfg(target_os = "macos")]
    async fn launch_application(&self, path: &str) -> bool {
        match Command::new("/usr/bin/open").arg(path).output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("⚠️ Failed to launch {path}: {e}");
                false
            }
        }
    }

    #[cfg(not(target_os = "macos"))]
    async fn launch_application(&self, path: &str) -> bool {
        // Detached; only the successful spawn matters
        match Command::new(path).spawn() {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️ Failed to launch {path}: {e}");
                false
            }
        }
    }
}

/// UDP sender used for Wake-on-LAN broadcasts
pub struct BroadcastUdpSender;

#[async_trait]
impl DatagramSender for BroadcastUdpSender {
    async fn send_datagram(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), String> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| format!("failed to bind UDP socket: {e}"))?;
        socket
            .set_broadcast(true)
            .map_err(|e| format!("failed to enable broadcast: {e}"))?;
        socket
            .send_to(payload, (host, port))
            .await
            .map_err(|e| format!("failed to send datagram to {host}:{port}: {e}"))?;
        Ok(())
    }
}

/// Live rule-evaluation context from the running system
pub struct SystemContext;

#[async_trait]
impl ContextSource for SystemContext {
    async fn current_ssid(&self) -> Option<String> {
        current_ssid().await
    }

    async fn vpn_interfaces(&self) -> Vec<String> {
        let networks = sysinfo::Networks::new_with_refreshed_list();
        networks
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| is_vpn_interface(name))
            .map(str::to_string)
            .collect()
    }

    async fn running_apps(&self) -> Vec<String> {
        tokio::task::spawn_blocking(|| {
            let mut sys = sysinfo::System::new();
            sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
            sys.processes()
                .values()
                .map(|process| process.name().to_string_lossy().into_owned())
                .collect()
        })
        .await
        .unwrap_or_default()
    }
}

fn is_vpn_interface(name: &str) -> bool {
    let name = name.to_lowercase();
    VPN_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

#[cfg(target_os = "macos")]
async fn current_ssid() -> Option<String> {
    const AIRPORT: &str = "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

    if let Ok(output) = Command::new(AIRPORT).arg("-I").output().await
        && output.status.success()
        && let Some(ssid) = parse_airport_output(&String::from_utf8_lossy(&output.stdout))
    {
        return Some(ssid);
    }

    // airport was removed in newer releases; fall back to networksetup
    let output = Command::new("/usr/sbin/networksetup")
        .args(["-getairportnetwork", "en0"])
        .output()
        .await
        .ok()?;
    parse_networksetup_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(target_os = "linux")]
async fn current_ssid() -> Option<String> {
    if let Ok(output) = Command::new("iwgetid").arg("-r").output().await
        && output.status.success()
    {
        let ssid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !ssid.is_empty() {
            return Some(ssid);
        }
    }

    let output = Command::new("nmcli")
        .args(["-t", "-f", "active,ssid", "dev", "wifi"])
        .output()
        .await
        .ok()?;
    parse_nmcli_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
async fn current_ssid() -> Option<String> {
    let output = Command::new("netsh")
        .args(["wlan", "show", "interfaces"])
        .output()
        .await
        .ok()?;
    parse_netsh_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(any(target_os = "macos", test))]
fn parse_airport_output(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let trimmed = line.trim_start();
        // The BSSID line also starts with "SSID", match the exact key
        trimmed
            .strip_prefix("SSID: ")
            .map(|ssid| ssid.trim().to_string())
            .filter(|ssid| !ssid.is_empty())
    })
}

#[cfg(any(target_os = "macos", test))]
fn parse_networksetup_output(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Current Wi-Fi Network: "))
        .map(|ssid| ssid.trim().to_string())
        .filter(|ssid| !ssid.is_empty())
}

#[cfg(any(target_os = "linux", test))]
fn parse_nmcli_output(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.strip_prefix("yes:")
            .map(|ssid| ssid.trim().to_string())
            .filter(|ssid| !ssid.is_empty())
    })
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn parse_netsh_output(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix("SSID")?
            .split_once(':')
            .map(|(_, ssid)| ssid.trim().to_string())
            .filter(|ssid| !ssid.is_empty())
    })
}
