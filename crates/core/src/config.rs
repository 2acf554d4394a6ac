//! 데몬 설정 — gantry.toml 파싱 및 기본값
//!
//! 설정 파일은 선택 사항입니다. 파일이 없으면 기본값으로 시작하고,
//! CLI 플래그가 파일 값을 덮어씁니다 (우선순위: 플래그 > 파일 > 기본값).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// gantry 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// etcd 트리 스토어 설정
    pub etcd: EtcdConfig,
    /// 로컬 디렉터리 소스 설정
    pub files: FilesConfig,
    /// IPVS 드라이버 설정
    pub ipvs: IpvsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// etcd 트리 스토어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// 쉼표로 구분된 클라이언트 엔드포인트 목록
    pub endpoints: String,
    /// 설정 트리가 위치한 경로 프리픽스
    pub prefix: String,
    /// etcd에서 온 라우트 레코드를 어댑터 경계에서 걸러냄
    pub filter_routes: bool,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: "http://127.0.0.1:2379".to_owned(),
            prefix: "/gantry".to_owned(),
            filter_routes: false,
        }
    }
}

impl EtcdConfig {
    /// 쉼표로 구분된 엔드포인트 문자열을 목록으로 풀어냅니다.
    pub fn endpoint_list(&self) -> Vec<String> {
        self.endpoints
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// 로컬 디렉터리 소스 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// 스캔할 디렉터리 (빈 문자열이면 비활성)
    pub path: String,
}

/// IPVS 드라이버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpvsConfig {
    /// 기본 포워딩 방식 (masq, tunnel, droute)
    pub fwd_method: String,
    /// 커널에 전달할 스케줄러 이름
    pub sched_name: String,
    /// netlink 디버그 트레이스 활성화
    pub debug: bool,
    /// 동기화 직후 커널 테이블을 stdout으로 덤프
    pub print: bool,
    /// netlink 핸들 없이 동작 (테스트/드라이런 전용)
    pub mock: bool,
}

impl Default for IpvsConfig {
    fn default() -> Self {
        Self {
            fwd_method: "masq".to_owned(),
            sched_name: "wlc".to_owned(),
            debug: false,
            print: false,
            mock: false,
        }
    }
}

impl GantryConfig {
    /// TOML 설정 파일을 읽어 들입니다.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|_| SettingsError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| SettingsError::ParseFailed {
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 값의 유효성을 검사합니다.
    pub fn validate(&self) -> Result<(), SettingsError> {
        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(SettingsError::InvalidValue {
                    field: "general.log_format".to_owned(),
                    reason: format!("unknown format '{other}', expected 'json' or 'pretty'"),
                });
            }
        }

        match self.ipvs.fwd_method.as_str() {
            "masq" | "tunnel" | "droute" => {}
            other => {
                return Err(SettingsError::InvalidValue {
                    field: "ipvs.fwd_method".to_owned(),
                    reason: format!("unknown method '{other}', expected masq, tunnel or droute"),
                });
            }
        }

        if self.ipvs.sched_name.is_empty() {
            return Err(SettingsError::InvalidValue {
                field: "ipvs.sched_name".to_owned(),
                reason: "scheduler name must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}
