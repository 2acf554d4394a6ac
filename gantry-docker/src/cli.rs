//! CLI argument definitions for gantry-docker.

use clap::Parser;

use gantry_core::config::EtcdConfig;

/// Publishes container-derived backend configs into the gantry tree.
///
/// Watches the local Docker daemon for container lifecycle events.
/// Running containers advertise backends for the services named in their
/// labels; stopped containers retract them.
#[derive(Parser, Debug)]
#[command(name = "gantry-docker")]
#[command(version, about, long_about = None)]
pub struct DockerCli {
    /// Docker client endpoint (empty for the platform default socket).
    #[arg(long, default_value = "")]
    pub docker_endpoint: String,

    /// Comma-separated client endpoints for etcd.
    #[arg(long, default_value = "http://127.0.0.1:2379")]
    pub etcd_endpoints: String,

    /// Etcd tree prefix.
    #[arg(long, default_value = "/gantry")]
    pub etcd_prefix: String,
}

impl DockerCli {
    /// Tree-store settings derived from the flags.
    pub fn etcd_config(&self) -> EtcdConfig {
        EtcdConfig {
            endpoints: self.etcd_endpoints.clone(),
            prefix: self.etcd_prefix.clone(),
            filter_routes: false,
        }
    }
}
