//! End-to-end flow against a local config tree and a mock driver.
//!
//! Exercises the startup path the daemon takes: files scan → quiescent
//! load → sync (mock) — without a kernel or an etcd server.

use std::fs;
use std::path::Path;

use gantry_balancer::Services;
use gantry_config_store::FilesSource;
use gantry_core::config::IpvsConfig;
use gantry_core::event::{Action, Config, Event, Source};
use gantry_core::types::ServiceBackend;

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("services/web/backends")).unwrap();
    fs::write(
        root.join("services/web/frontend"),
        r#"{"ipv4": "192.0.2.10", "tcp": 80, "udp": 53}"#,
    )
    .unwrap();
    fs::write(
        root.join("services/web/backends/web1"),
        r#"{"ipv4": "10.1.0.1", "tcp": 80}"#,
    )
    .unwrap();
    fs::write(
        root.join("services/web/backends/web2"),
        r#"{"ipv4": "10.1.0.2", "tcp": 80, "weight": 5}"#,
    )
    .unwrap();
    fs::create_dir_all(root.join("routes")).unwrap();
    fs::write(
        root.join("routes/lab"),
        r#"{"prefix4": "10.1.0.0/24", "ipvsMethod": "droute"}"#,
    )
    .unwrap();
}

fn mock_ipvs() -> IpvsConfig {
    IpvsConfig {
        mock: true,
        ..Default::default()
    }
}

#[test]
fn scan_load_sync() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let mut services = Services::new();
    for record in FilesSource::new(dir.path()).scan().unwrap() {
        services.new_config(record).unwrap();
    }

    assert_eq!(services.len(), 1);
    assert_eq!(services.route_count(), 1);

    services.sync_ipvs(&mock_ipvs()).unwrap();

    // mock 드라이버에서도 print는 동작해야 합니다
    services.print().unwrap();
}

#[test]
fn live_events_after_sync() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let mut services = Services::new();
    for record in FilesSource::new(dir.path()).scan().unwrap() {
        services.new_config(record).unwrap();
    }
    services.sync_ipvs(&mock_ipvs()).unwrap();

    // 라이브 백엔드 추가와 철회가 에러 없이 적용되어야 합니다
    services
        .config_event(Event {
            action: Action::Set,
            config: Config::Backend {
                name: "web".to_owned(),
                backend_name: "web3".to_owned(),
                backend: ServiceBackend {
                    ipv4: "10.1.0.3".to_owned(),
                    tcp: 80,
                    ..Default::default()
                },
                source: Source::Etcd,
            },
        })
        .unwrap();

    services
        .config_event(Event {
            action: Action::Del,
            config: Config::Backend {
                name: "web".to_owned(),
                backend_name: "web3".to_owned(),
                backend: ServiceBackend::default(),
                source: Source::Etcd,
            },
        })
        .unwrap();

    // 서비스 전체 철거
    services
        .config_event(Event {
            action: Action::Del,
            config: Config::Service {
                name: "web".to_owned(),
                source: Source::File,
            },
        })
        .unwrap();
    assert!(services.is_empty());
}
