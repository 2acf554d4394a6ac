//! CLI argument definitions for gantry-daemon.
//!
//! Uses `clap` v4 derive macros. Flags override the optional TOML config
//! file, which overrides built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use gantry_core::config::GantryConfig;
use gantry_core::error::SettingsError;
use gantry_core::event::{Config, Source};
use gantry_core::types::RouteConfig;

/// gantry IPVS reconciler daemon.
///
/// Aggregates virtual-service configuration from an etcd tree and/or a
/// local directory, projects it onto the kernel IPVS table, and keeps it
/// in sync with live configuration changes.
#[derive(Parser, Debug, Default)]
#[command(name = "gantry-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to an optional gantry.toml configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Local config tree to scan at startup.
    #[arg(long)]
    pub config_path: Option<String>,

    /// Comma-separated client endpoints for etcd.
    #[arg(long)]
    pub etcd_endpoints: Option<String>,

    /// Etcd tree prefix (empty disables the etcd source).
    #[arg(long)]
    pub etcd_prefix: Option<String>,

    /// Discard route records originating from etcd.
    #[arg(long)]
    pub filter_etcd_routes: bool,

    /// IPVS forwarding method: masq, tunnel or droute.
    #[arg(long)]
    pub ipvs_fwd_method: Option<String>,

    /// IPVS service scheduler passed to the kernel.
    #[arg(long)]
    pub ipvs_sched_name: Option<String>,

    /// Enable netlink debug tracing.
    #[arg(long)]
    pub ipvs_debug: bool,

    /// Dump the kernel IPVS table to stdout after the initial sync.
    #[arg(long)]
    pub ipvs_print: bool,

    /// Run without a netlink handle (development only).
    #[arg(long, hide = true)]
    pub ipvs_mock: bool,

    /// Advertise a route record by name after the initial sync.
    #[arg(long)]
    pub advertise_route_name: Option<String>,

    /// Advertised route prefix.
    #[arg(long, default_value = "")]
    pub advertise_route_prefix4: String,

    /// Advertised route gateway.
    #[arg(long, default_value = "")]
    pub advertise_route_gateway4: String,

    /// Advertised route ipvs-fwd-method.
    #[arg(long, default_value = "")]
    pub advertise_route_ipvs_method: String,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,
}

impl DaemonCli {
    /// Resolves the effective configuration: flags > file > defaults.
    pub fn build_config(&self) -> Result<GantryConfig, SettingsError> {
        let mut config = match &self.config {
            Some(path) => GantryConfig::load(path)?,
            None => GantryConfig::default(),
        };

        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(path) = &self.config_path {
            config.files.path = path.clone();
        }
        if let Some(endpoints) = &self.etcd_endpoints {
            config.etcd.endpoints = endpoints.clone();
        }
        if let Some(prefix) = &self.etcd_prefix {
            config.etcd.prefix = prefix.clone();
        }
        if self.filter_etcd_routes {
            config.etcd.filter_routes = true;
        }
        if let Some(method) = &self.ipvs_fwd_method {
            config.ipvs.fwd_method = method.clone();
        }
        if let Some(sched) = &self.ipvs_sched_name {
            config.ipvs.sched_name = sched.clone();
        }
        if self.ipvs_debug {
            config.ipvs.debug = true;
        }
        if self.ipvs_print {
            config.ipvs.print = true;
        }
        if self.ipvs_mock {
            config.ipvs.mock = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Builds the route record to advertise, when one is named.
    pub fn advertise_route(&self) -> Option<Config> {
        let name = self.advertise_route_name.clone()?;
        if name.is_empty() {
            return None;
        }
        Some(Config::Route {
            name,
            route: RouteConfig {
                prefix4: self.advertise_route_prefix4.clone(),
                gateway4: self.advertise_route_gateway4.clone(),
                ipvs_method: self.advertise_route_ipvs_method.clone(),
            },
            source: Source::Etcd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let cli = DaemonCli::try_parse_from(["gantry-daemon"]).unwrap();
        let config = cli.build_config().unwrap();
        assert_eq!(config.ipvs.fwd_method, "masq");
        assert_eq!(config.ipvs.sched_name, "wlc");
        assert_eq!(config.etcd.prefix, "/gantry");
        assert!(cli.advertise_route().is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = DaemonCli::try_parse_from([
            "gantry-daemon",
            "--ipvs-fwd-method",
            "droute",
            "--etcd-prefix",
            "/lb",
            "--filter-etcd-routes",
            "--config-path",
            "/etc/gantry/tree",
        ])
        .unwrap();
        let config = cli.build_config().unwrap();
        assert_eq!(config.ipvs.fwd_method, "droute");
        assert_eq!(config.etcd.prefix, "/lb");
        assert!(config.etcd.filter_routes);
        assert_eq!(config.files.path, "/etc/gantry/tree");
    }

    #[test]
    fn invalid_fwd_method_fails_validation() {
        let cli =
            DaemonCli::try_parse_from(["gantry-daemon", "--ipvs-fwd-method", "bypass"]).unwrap();
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(DaemonCli::try_parse_from(["gantry-daemon", "leftover"]).is_err());
    }

    #[test]
    fn advertise_route_builds_record() {
        let cli = DaemonCli::try_parse_from([
            "gantry-daemon",
            "--advertise-route-name",
            "edge1",
            "--advertise-route-prefix4",
            "10.1.0.0/24",
            "--advertise-route-gateway4",
            "10.1.0.1",
            "--advertise-route-ipvs-method",
            "droute",
        ])
        .unwrap();

        let record = cli.advertise_route().unwrap();
        match record {
            Config::Route { name, route, source } => {
                assert_eq!(name, "edge1");
                assert_eq!(route.prefix4, "10.1.0.0/24");
                assert_eq!(route.gateway4, "10.1.0.1");
                assert_eq!(route.ipvs_method, "droute");
                assert_eq!(source, Source::Etcd);
            }
            other => panic!("unexpected record: {other}"),
        }
    }
}
