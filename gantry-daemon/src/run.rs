//! Daemon control flow: scan, sync, then follow live changes.
//!
//! Startup is two-phase. First every configured source is scanned and the
//! records are loaded quiescently into the store. Then `sync_ipvs`
//! flushes the kernel table and replays the loaded state, after which
//! live watch events drive incremental updates. The declared
//! configuration is authoritative across restarts; the kernel table is
//! authoritative while the daemon runs.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gantry_balancer::Services;
use gantry_config_store::{FilesSource, TreeSource};
use gantry_core::config::GantryConfig;
use gantry_core::event::Config;

/// Bound on in-flight events between the source adapters and the store.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs the reconciler until every event stream closes or a shutdown
/// signal arrives.
///
/// Fatal conditions (non-zero exit): a configured source fails to open
/// or scan, the netlink handle cannot be opened, or the initial
/// flush/sync fails.
pub async fn run(config: GantryConfig, advertise: Option<Config>) -> Result<()> {
    let mut services = Services::new();

    // Local directory source: scan once, no sync capability.
    if !config.files.path.is_empty() {
        let files = FilesSource::new(&config.files.path);
        let configs = files
            .scan()
            .with_context(|| format!("scanning config tree {}", config.files.path))?;
        for record in configs {
            if let Err(err) = services.new_config(record) {
                error!(%err, "loading file config");
            }
        }
    }

    // Tree-store source: scan now, watch after sync.
    let mut tree = if config.etcd.prefix.is_empty() {
        None
    } else {
        let mut source = TreeSource::open(&config.etcd)
            .await
            .context("opening etcd source")?;
        let configs = source.scan().await.context("scanning etcd tree")?;
        for record in configs {
            if let Err(err) = services.new_config(record) {
                error!(%err, "loading etcd config");
            }
        }
        Some(source)
    };

    info!(
        services = services.len(),
        routes = services.route_count(),
        "initial configuration loaded"
    );

    // Project onto the kernel: flush, then replay the loaded state.
    services
        .sync_ipvs(&config.ipvs)
        .context("initial ipvs sync")?;

    if config.ipvs.print {
        services.print().context("dumping ipvs table")?;
    }

    // Advertise a route record for this host, when configured.
    if let Some(record) = &advertise {
        match &mut tree {
            Some(tree) => {
                tree.publish(record)
                    .await
                    .with_context(|| format!("advertising {record}"))?;
                info!(%record, "advertised route");
            }
            None => warn!(%record, "no tree store to advertise route into"),
        }
    }

    // Follow live changes until every stream closes.
    let Some(tree) = tree else {
        info!("no sync-capable source configured; exiting after initial sync");
        return Ok(());
    };

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let watch = tokio::spawn(tree.run(tx));

    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => {
                    if let Err(err) = services.config_event(event) {
                        error!(%err, "applying config event");
                    }
                }
                None => {
                    info!("all event streams closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    watch.abort();
    info!("gantry-daemon exiting");
    Ok(())
}
