//! 컨테이너 → 백엔드 레코드 변환
//!
//! 컨테이너는 라벨로 자신이 속한 서비스와 포트를 광고합니다:
//!
//! - `net.gantry.service`: 공백으로 구분된 서비스 이름 목록
//! - `net.gantry.backend.tcp` / `.udp`: 노출된 컨테이너 포트 번호
//! - `net.gantry.backend:<svc>.tcp` / `.udp`: 서비스별 포트 재정의
//!
//! 백엔드 주소는 컨테이너의 내부 IPv4이고, 백엔드 이름은 컨테이너
//! id입니다. 해석된 포트가 하나도 없는 서비스는 건너뜁니다.

use std::collections::HashMap;

use tracing::warn;

use gantry_core::event::{Config, Source};
use gantry_core::types::ServiceBackend;

use crate::docker::Container;

/// 서비스 멤버십 라벨
pub const SERVICE_LABEL: &str = "net.gantry.service";
/// 공통 TCP 포트 라벨
pub const BACKEND_TCP_LABEL: &str = "net.gantry.backend.tcp";
/// 공통 UDP 포트 라벨
pub const BACKEND_UDP_LABEL: &str = "net.gantry.backend.udp";

/// 컨테이너 하나를 백엔드 레코드 목록으로 변환합니다.
pub fn container_configs(container: &Container) -> Vec<Config> {
    let mut configs = Vec::new();

    // "proto:port" → 노출 포트
    let exposed: HashMap<String, u16> = container
        .ports
        .iter()
        .map(|port| (format!("{}:{}", port.proto, port.port), port.port))
        .collect();

    let Some(service_names) = container.labels.get(SERVICE_LABEL) else {
        return configs;
    };

    for service_name in service_names.split_whitespace() {
        let mut backend = ServiceBackend::default();
        if let Some(ipv4) = container.ipv4 {
            backend.ipv4 = ipv4.to_string();
        }

        let port_labels = [
            ("tcp", BACKEND_TCP_LABEL.to_owned()),
            ("udp", BACKEND_UDP_LABEL.to_owned()),
            ("tcp", format!("net.gantry.backend:{service_name}.tcp")),
            ("udp", format!("net.gantry.backend:{service_name}.udp")),
        ];

        for (proto, label) in &port_labels {
            let Some(port_name) = container.labels.get(label) else {
                continue;
            };
            let Some(port) = exposed.get(&format!("{proto}:{port_name}")) else {
                warn!(
                    container = %container.id,
                    service = service_name,
                    port = %port_name,
                    "labeled port is not exposed"
                );
                continue;
            };
            match *proto {
                "tcp" => backend.tcp = *port,
                "udp" => backend.udp = *port,
                _ => {}
            }
        }

        if backend.tcp != 0 || backend.udp != 0 {
            configs.push(Config::Backend {
                name: service_name.to_owned(),
                backend_name: container.id.clone(),
                backend,
                source: Source::Docker,
            });
        }
    }

    configs
}
