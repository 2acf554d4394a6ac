//! 에러 타입 — 도메인별 에러 정의
//!
//! 각 에러 종류는 처리 방식이 다릅니다. [`SchemaError`]는 해당 노드만
//! 건너뛰고, [`StoreError`]는 스트림 수준에서 처리되며,
//! [`DriverError`]는 로깅 후 계속 진행합니다. 레지스트리 불변식 위반은
//! 에러가 아니라 프로세스 종료(panic)로 다룹니다.

/// gantry 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    /// 설정 노드 디코딩 에러
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// 데몬 설정 에러
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// 설정 소스 전송 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// IPVS 드라이버 에러
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 노드의 경로 또는 값을 디코딩할 수 없음
///
/// 스키마 에러는 치명적이지 않습니다. 발생한 노드만 건너뛰고
/// 스캔/워치는 계속됩니다.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// 스키마에 없는 경로
    #[error("ignore unknown node: {path}")]
    UnknownNode {
        /// 트리 프리픽스를 제거한 노드 경로
        path: String,
    },

    /// 서비스 하위의 알 수 없는 경로
    #[error("ignore unknown service {service} node: {path}")]
    UnknownServiceNode { service: String, path: String },

    /// 백엔드 집합 하위의 알 수 없는 경로
    #[error("ignore unknown service {service} backends node: {path}")]
    UnknownBackendNode { service: String, path: String },

    /// 라우트 하위의 알 수 없는 경로
    #[error("ignore unknown route node: {path}")]
    UnknownRouteNode { path: String },

    /// 프런트엔드 값 JSON 파싱 실패
    #[error("service {service} frontend: {reason}")]
    Frontend { service: String, reason: String },

    /// 백엔드 값 JSON 파싱 실패
    #[error("service {service} backend {backend}: {reason}")]
    Backend {
        service: String,
        backend: String,
        reason: String,
    },

    /// 라우트 값 JSON 파싱 실패
    #[error("route {route}: {reason}")]
    Route { route: String, reason: String },
}

/// 데몬 설정 로딩/검증 에러
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 설정 소스 전송 에러
///
/// 스캔 에러는 기동 시 치명적이고, 워치 에러는 이벤트 스트림을
/// 종료시킵니다 (모든 스트림이 닫히면 프로세스가 종료됩니다).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 소스 연결 실패
    #[error("source connect failed: {kind}: {reason}")]
    Connect { kind: String, reason: String },

    /// 초기 스캔 실패
    #[error("scan failed: {kind}: {reason}")]
    Scan { kind: String, reason: String },

    /// 워치 스트림 실패
    #[error("watch failed: {kind}: {reason}")]
    Watch { kind: String, reason: String },

    /// 레코드 게시/철회 실패
    #[error("publish failed: {path}: {reason}")]
    Publish { path: String, reason: String },

    /// 이벤트 채널 전송 실패
    #[error("event channel closed: {0}")]
    Channel(String),
}

/// IPVS 드라이버 에러
///
/// 빌드 에러(잘못된 주소/포트 리터럴)는 해당 슬롯만 설치하지 않고,
/// 커널 에러는 호출자에게 보고되어 로깅 후 계속 진행됩니다.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// 설정 값의 주소 리터럴이 유효하지 않음
    #[error("invalid {kind} address: {value}")]
    InvalidAddress { kind: String, value: String },

    /// 알 수 없는 포워딩 방식
    #[error("invalid fwd-method: {0}")]
    InvalidFwdMethod(String),

    /// netlink 전송/커널 에러
    #[error("netlink: {0}")]
    Netlink(String),

    /// 드라이버가 아직 연결되지 않음
    #[error("driver not attached (sync_ipvs not called)")]
    NotAttached,

    /// 드라이버가 이미 연결됨 (초기 적재 이후의 new_config)
    #[error("driver already attached (new_config after sync_ipvs)")]
    AlreadyAttached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display_names_the_path() {
        let err = SchemaError::UnknownNode {
            path: "wtf".to_owned(),
        };
        assert_eq!(err.to_string(), "ignore unknown node: wtf");
    }

    #[test]
    fn frontend_schema_error_names_the_service() {
        let err = SchemaError::Frontend {
            service: "test".to_owned(),
            reason: "expected value".to_owned(),
        };
        assert!(err.to_string().contains("service test frontend"));
    }

    #[test]
    fn errors_convert_to_gantry_error() {
        let err: GantryError = SchemaError::UnknownNode {
            path: String::new(),
        }
        .into();
        assert!(matches!(err, GantryError::Schema(_)));

        let err: GantryError = StoreError::Channel("closed".to_owned()).into();
        assert!(matches!(err, GantryError::Store(_)));

        let err: GantryError = DriverError::NotAttached.into();
        assert!(matches!(err, GantryError::Driver(_)));
    }

    #[test]
    fn settings_error_display() {
        let err = SettingsError::InvalidValue {
            field: "ipvs.fwd_method".to_owned(),
            reason: "expected masq, tunnel or droute".to_owned(),
        };
        assert!(err.to_string().contains("ipvs.fwd_method"));
    }
}
