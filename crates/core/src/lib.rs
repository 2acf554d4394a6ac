#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod node;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{DriverError, GantryError, SchemaError, SettingsError, StoreError};

// 설정
pub use config::{EtcdConfig, FilesConfig, GantryConfig, GeneralConfig, IpvsConfig};

// 이벤트 / 레코드
pub use event::{Action, Config, Event, Source};

// 노드 코덱
pub use node::{Node, decode};

// 도메인 타입
pub use types::{DEFAULT_WEIGHT, RouteConfig, ServiceBackend, ServiceFrontend};
