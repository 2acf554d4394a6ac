//! 노드 코덱 — 경로+값 쌍을 타입화된 레코드로 변환
//!
//! 설정 트리의 노드는 `/`로 연결된 경로, 디렉터리 여부, JSON 값으로
//! 이루어집니다. [`decode`]는 노드를 스키마에 따라 [`Config`] 레코드로
//! 해석하고, 스키마 밖의 경로는 [`SchemaError`]로 보고합니다.
//! 스키마 에러는 호출자가 로깅 후 해당 노드만 건너뜁니다.
//!
//! 값이 빈 리프는 툼스톤(삭제 표시)으로, 기본값 페이로드를 가진
//! 레코드로 디코딩됩니다. 디렉터리 노드는 이름이 빈 와일드카드
//! 레코드가 됩니다.

use crate::error::SchemaError;
use crate::event::{Config, Source};
use crate::types::{RouteConfig, ServiceBackend, ServiceFrontend};

/// 설정 트리의 원시 노드
///
/// 소스 어댑터 경계에서만 쓰이는 얇은 표현입니다. 경로는 트리
/// 프리픽스가 제거된 상대 경로입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// 프리픽스를 제거한 `/` 구분 경로
    pub path: String,
    /// 디렉터리 여부
    pub is_dir: bool,
    /// JSON 인코딩된 값 (툼스톤이면 빈 문자열)
    pub value: String,
    /// 노드의 출처
    pub source: Source,
}

impl Node {
    fn load_frontend(&self, service: &str) -> Result<ServiceFrontend, SchemaError> {
        serde_json::from_str(&self.value).map_err(|err| SchemaError::Frontend {
            service: service.to_owned(),
            reason: err.to_string(),
        })
    }

    fn load_backend(&self, service: &str, backend: &str) -> Result<ServiceBackend, SchemaError> {
        serde_json::from_str(&self.value).map_err(|err| SchemaError::Backend {
            service: service.to_owned(),
            backend: backend.to_owned(),
            reason: err.to_string(),
        })
    }

    fn load_route(&self, route: &str) -> Result<RouteConfig, SchemaError> {
        serde_json::from_str(&self.value).map_err(|err| SchemaError::Route {
            route: route.to_owned(),
            reason: err.to_string(),
        })
    }
}

/// 노드를 타입화된 설정 레코드로 디코딩합니다.
///
/// - `Ok(None)`: 스키마상 의미가 없는 노드 (빈 경로의 디렉터리)
/// - `Ok(Some(_))`: 해석된 레코드. 디렉터리는 와일드카드, 빈 값은
///   툼스톤으로 해석됩니다.
/// - `Err(_)`: 스키마 밖의 경로이거나 JSON 파싱에 실패한 값.
///   호출자는 로깅 후 노드를 건너뜁니다.
pub fn decode(node: &Node) -> Result<Option<Config>, SchemaError> {
    let parts: Vec<&str> = if node.path.is_empty() {
        Vec::new()
    } else {
        node.path.split('/').collect()
    };

    match parts.as_slice() {
        [] if node.is_dir => Ok(None),

        ["services"] if node.is_dir => Ok(Some(Config::Service {
            name: String::new(),
            source: node.source.clone(),
        })),

        ["services", service] if node.is_dir => Ok(Some(Config::Service {
            name: (*service).to_owned(),
            source: node.source.clone(),
        })),

        ["services", service, "frontend"] if !node.is_dir => {
            let frontend = if node.value.is_empty() {
                // 삭제된 노드는 빈 값을 가집니다.
                ServiceFrontend::default()
            } else {
                node.load_frontend(service)?
            };
            Ok(Some(Config::Frontend {
                name: (*service).to_owned(),
                frontend,
                source: node.source.clone(),
            }))
        }

        ["services", service, "backends"] if node.is_dir => Ok(Some(Config::Backend {
            name: (*service).to_owned(),
            backend_name: String::new(),
            backend: ServiceBackend::default(),
            source: node.source.clone(),
        })),

        ["services", service, "backends", backend] if !node.is_dir => {
            let value = if node.value.is_empty() {
                // 삭제된 노드는 빈 값을 가집니다.
                ServiceBackend::default()
            } else {
                node.load_backend(service, backend)?
            };
            Ok(Some(Config::Backend {
                name: (*service).to_owned(),
                backend_name: (*backend).to_owned(),
                backend: value,
                source: node.source.clone(),
            }))
        }

        ["services", service, "backends", _, ..] => Err(SchemaError::UnknownBackendNode {
            service: (*service).to_owned(),
            path: node.path.clone(),
        }),

        ["services", service, ..] => Err(SchemaError::UnknownServiceNode {
            service: (*service).to_owned(),
            path: node.path.clone(),
        }),

        ["routes"] if node.is_dir => Ok(Some(Config::Route {
            name: String::new(),
            route: RouteConfig::default(),
            source: node.source.clone(),
        })),

        ["routes", route] if !node.is_dir => {
            let value = if node.value.is_empty() {
                RouteConfig::default()
            } else {
                node.load_route(route)?
            };
            Ok(Some(Config::Route {
                name: (*route).to_owned(),
                route: value,
                source: node.source.clone(),
            }))
        }

        ["routes", _, ..] => Err(SchemaError::UnknownRouteNode {
            path: node.path.clone(),
        }),

        _ => Err(SchemaError::UnknownNode {
            path: node.path.clone(),
        }),
    }
}
