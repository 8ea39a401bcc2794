use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use netshare_manager::automation::AutomationDispatcher;
use netshare_manager::discovery::NetworkDiscovery;
use netshare_manager::monitor::NetworkMonitor;
use netshare_manager::mounts::{MountManager, MountState, MountWatcher};
use netshare_manager::profiles::ProfileStore;
use netshare_manager::providers::system::{
    BroadcastUdpSender, DnsNameResolver, PingProbe, SystemAppLauncher, SystemContext,
    SystemMountProvider,
};
use netshare_manager::providers::{ContextSource, MountProvider, ReachabilityProbe};
use netshare_manager::utils::logging::init_logging;

/// Command line arguments for the daemon
#[derive(Parser, Debug)]
#[command(name = "netshare-manager")]
#[command(about = "Automated mounting of network file shares", long_about = None)]
struct Args {
    /// Path to the profile document (defaults to the per-user config dir)
    #[arg(short, long, env = "NETSHARE_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Seconds between mount-table polls
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Skip importing mounts that pre-date the process
    #[arg(long, default_value_t = false)]
    no_scan: bool,

    /// Unmount all managed shares on shutdown
    #[arg(long, default_value_t = false)]
    unmount_on_exit: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.debug) {
        eprintln!("Failed to install logger: {e}");
    }

    if let Err(e) = run(args).await {
        error!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config.unwrap_or_else(ProfileStore::default_path);
    info!(
        "🚀 netshare-manager starting (profiles: {})",
        config.display()
    );

    let store = Arc::new(ProfileStore::load(config).await?);
    info!("📂 Loaded {} profile(s)", store.list().await.len());

    let provider: Arc<dyn MountProvider> = Arc::new(SystemMountProvider::new());
    let probe: Arc<dyn ReachabilityProbe> = Arc::new(PingProbe::new());
    let automations = Arc::new(AutomationDispatcher::new(
        Arc::new(SystemAppLauncher),
        Arc::new(BroadcastUdpSender),
    ));
    let manager = Arc::new(MountManager::new(
        store.clone(),
        provider,
        probe,
        automations,
        Arc::new(MountState::new()),
    ));

    // Adopt shares mounted before we started (e.g. at a prior login)
    if !args.no_scan {
        match manager.scan_and_import_mounts().await {
            Ok(imported) if imported > 0 => {
                info!("➕ Imported {imported} pre-existing mount(s)");
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ Startup mount scan failed: {e}"),
        }
    }

    let watcher = Arc::new(MountWatcher::new(
        manager.clone(),
        Duration::from_secs(args.poll_interval.max(1)),
    ));
    watcher.start();

    let context: Arc<dyn ContextSource> = Arc::new(SystemContext);
    let monitor = Arc::new(NetworkMonitor::new(manager.clone(), context));
    monitor.start();

    let discovery = Arc::new(NetworkDiscovery::new(store, Arc::new(DnsNameResolver)));
    discovery.start();

    tokio::signal::ctrl_c().await?;
    info!("👋 Shutting down");

    monitor.stop();
    watcher.stop();
    discovery.stop();

    if args.unmount_on_exit {
        manager.unmount_all().await;
    }

    Ok(())
}
