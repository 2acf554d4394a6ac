//! 이벤트 모델 — 설정 변경을 나타내는 타입화된 레코드
//!
//! 소스 어댑터는 트리 노드를 [`Config`] 레코드로 디코딩하고,
//! `(action, config)` 쌍인 [`Event`]를 순서대로 내보냅니다.
//! 서비스 스토어는 이벤트를 하나씩 끝까지 적용합니다.
//!
//! 이름이 빈 문자열인 레코드는 와일드카드입니다. 예를 들어
//! `Config::Backend { backend_name: "" }`는 해당 서비스의 모든 백엔드를,
//! `Config::Route { name: "" }`는 모든 라우트를 가리킵니다.

use std::fmt;

use crate::node::Node;
use crate::types::{RouteConfig, ServiceBackend, ServiceFrontend};

/// 설정 레코드의 출처
///
/// 와일드카드 삭제는 출처가 일치하는 항목에만 적용되므로,
/// 모든 레코드는 자신을 만든 소스 태그를 지니고 다닙니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// 로컬 디렉터리 스캔
    File,
    /// etcd 트리 스토어
    Etcd,
    /// 컨테이너 런타임에서 파생된 레코드
    Docker,
    /// 기타 (테스트 등)
    Named(String),
}

impl Source {
    /// 임의 이름의 소스 태그를 만듭니다.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Etcd => write!(f, "etcd"),
            Self::Docker => write!(f, "docker"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// 설정 변경의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 초기 스캔에서 발견된 레코드 (드라이버 연결 전)
    New,
    /// 라이브 변경: 생성 또는 갱신
    Set,
    /// 라이브 변경: 삭제 또는 만료
    Del,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Set => write!(f, "set"),
            Self::Del => write!(f, "del"),
        }
    }
}

/// 타입화된 설정 레코드
///
/// 트리 경로와 JSON 값의 쌍을 하나의 variant로 표현합니다.
/// [`decode`](crate::node::decode)가 노드를 레코드로,
/// [`Config::encode`]가 레코드를 노드로 되돌립니다.
#[derive(Debug, Clone, PartialEq)]
pub enum Config {
    /// `services/<name>` 디렉터리 마커. 이름이 비어 있으면 전체 서비스.
    Service { name: String, source: Source },

    /// `services/<name>/frontend` 리프
    Frontend {
        name: String,
        frontend: ServiceFrontend,
        source: Source,
    },

    /// `services/<name>/backends/<backend_name>` 리프.
    /// `backend_name`이 비어 있으면 해당 서비스의 전체 백엔드.
    Backend {
        name: String,
        backend_name: String,
        backend: ServiceBackend,
        source: Source,
    },

    /// `routes/<name>` 리프. 이름이 비어 있으면 전체 라우트.
    Route {
        name: String,
        route: RouteConfig,
        source: Source,
    },
}

impl Config {
    /// 트리 프리픽스를 제외한 레코드 경로를 반환합니다.
    pub fn path(&self) -> String {
        match self {
            Self::Service { name, .. } => join_path(&["services", name.as_str()]),
            Self::Frontend { name, .. } => join_path(&["services", name.as_str(), "frontend"]),
            Self::Backend {
                name, backend_name, ..
            } => join_path(&[
                "services",
                name.as_str(),
                "backends",
                backend_name.as_str(),
            ]),
            Self::Route { name, .. } => join_path(&["routes", name.as_str()]),
        }
    }

    /// 레코드의 출처 태그를 반환합니다.
    pub fn source(&self) -> &Source {
        match self {
            Self::Service { source, .. }
            | Self::Frontend { source, .. }
            | Self::Backend { source, .. }
            | Self::Route { source, .. } => source,
        }
    }

    /// 레코드를 트리 노드로 직렬화합니다.
    ///
    /// [`decode`](crate::node::decode)의 역연산입니다. 서비스 마커는
    /// 디렉터리 노드가 되고, 나머지는 값을 JSON으로 담은 리프가 됩니다.
    pub fn encode(&self) -> Node {
        let (is_dir, value) = match self {
            Self::Service { .. } => (true, String::new()),
            // 스키마 타입의 직렬화는 실패하지 않습니다.
            Self::Frontend { frontend, .. } => {
                (false, serde_json::to_string(frontend).unwrap_or_default())
            }
            Self::Backend { backend, .. } => {
                (false, serde_json::to_string(backend).unwrap_or_default())
            }
            Self::Route { route, .. } => (false, serde_json::to_string(route).unwrap_or_default()),
        };

        Node {
            path: self.path(),
            is_dir,
            value,
            source: self.source().clone(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service { name, source } => {
                write!(f, "service[{name}] source={source}")
            }
            Self::Frontend {
                name,
                frontend,
                source,
            } => write!(f, "frontend[{name}] {frontend} source={source}"),
            Self::Backend {
                name,
                backend_name,
                backend,
                source,
            } => write!(f, "backend[{name}/{backend_name}] {backend} source={source}"),
            Self::Route {
                name,
                route,
                source,
            } => write!(f, "route[{name}] {route} source={source}"),
        }
    }
}

/// 설정 변경 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// 변경 종류
    pub action: Action,
    /// 대상 레코드
    pub config: Config,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.config)
    }
}

fn join_path(parts: &[&str]) -> String {
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_paths() {
        let source = Source::named("test");
        assert_eq!(
            Config::Service {
                name: "web".to_owned(),
                source: source.clone(),
            }
            .path(),
            "services/web",
        );
        assert_eq!(
            Config::Frontend {
                name: "web".to_owned(),
                frontend: ServiceFrontend::default(),
                source: source.clone(),
            }
            .path(),
            "services/web/frontend",
        );
        assert_eq!(
            Config::Backend {
                name: "web".to_owned(),
                backend_name: "web1".to_owned(),
                backend: ServiceBackend::default(),
                source: source.clone(),
            }
            .path(),
            "services/web/backends/web1",
        );
        assert_eq!(
            Config::Route {
                name: "rack1".to_owned(),
                route: RouteConfig::default(),
                source,
            }
            .path(),
            "routes/rack1",
        );
    }

    #[test]
    fn encode_service_is_directory() {
        let node = Config::Service {
            name: "web".to_owned(),
            source: Source::File,
        }
        .encode();
        assert!(node.is_dir);
        assert_eq!(node.path, "services/web");
        assert!(node.value.is_empty());
    }

    #[test]
    fn encode_backend_is_json_leaf() {
        let node = Config::Backend {
            name: "web".to_owned(),
            backend_name: "web1".to_owned(),
            backend: ServiceBackend {
                ipv4: "10.1.0.1".to_owned(),
                tcp: 80,
                ..Default::default()
            },
            source: Source::Docker,
        }
        .encode();
        assert!(!node.is_dir);
        assert_eq!(node.value, r#"{"ipv4":"10.1.0.1","tcp":80}"#);
    }

    #[test]
    fn source_display() {
        assert_eq!(Source::File.to_string(), "file");
        assert_eq!(Source::Etcd.to_string(), "etcd");
        assert_eq!(Source::Docker.to_string(), "docker");
        assert_eq!(Source::named("test2").to_string(), "test2");
    }

    #[test]
    fn event_display_mentions_action_and_record() {
        let event = Event {
            action: Action::Set,
            config: Config::Route {
                name: "rack1".to_owned(),
                route: RouteConfig::default(),
                source: Source::Etcd,
            },
        };
        let text = event.to_string();
        assert!(text.starts_with("set "));
        assert!(text.contains("route[rack1]"));
    }
}
