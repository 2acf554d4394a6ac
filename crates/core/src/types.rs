//! 도메인 타입 — 설정 트리에 저장되는 JSON 값의 스키마
//!
//! 프런트엔드/백엔드/라우트 레코드의 값 부분을 정의합니다.
//! 비어 있는 필드는 직렬화에서 생략되어(`omitempty` 스타일) 트리에
//! 저장되는 JSON이 항상 최소 형태를 유지합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 백엔드 weight가 생략(0)되었을 때 적용되는 기본값
pub const DEFAULT_WEIGHT: u32 = 10;

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// 가상 서비스 프런트엔드 — 클라이언트가 접속하는 주소/포트
///
/// 주소 패밀리(ipv4/ipv6)와 전송 프로토콜(tcp/udp)별 필드가 독립적이며,
/// 비어 있는 필드는 해당 (패밀리, 프로토콜) 슬롯을 비활성화합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFrontend {
    /// IPv4 리스닝 주소 (빈 문자열이면 IPv4 비활성)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    /// IPv6 리스닝 주소 (빈 문자열이면 IPv6 비활성)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6: String,
    /// TCP 포트 (0이면 TCP 비활성)
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub tcp: u16,
    /// UDP 포트 (0이면 UDP 비활성)
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub udp: u16,
}

impl fmt::Display for ServiceFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ipv4={} ipv6={} tcp={} udp={}",
            self.ipv4, self.ipv6, self.tcp, self.udp,
        )
    }
}

/// 리얼 서버 백엔드 — 커널이 포워딩할 실제 엔드포인트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBackend {
    /// IPv4 주소 (빈 문자열이면 IPv4 슬롯 비활성)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    /// IPv6 주소 (빈 문자열이면 IPv6 슬롯 비활성)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6: String,
    /// TCP 포트 (0이면 TCP 슬롯 비활성)
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub tcp: u16,
    /// UDP 포트 (0이면 UDP 슬롯 비활성)
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub udp: u16,
    /// 스케줄링 weight (0이면 [`DEFAULT_WEIGHT`] 적용)
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub weight: u32,
}

impl ServiceBackend {
    /// 커널에 설치할 때 사용하는 실효 weight를 반환합니다.
    pub fn effective_weight(&self) -> u32 {
        if self.weight == 0 {
            DEFAULT_WEIGHT
        } else {
            self.weight
        }
    }
}

impl fmt::Display for ServiceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ipv4={} ipv6={} tcp={} udp={} weight={}",
            self.ipv4, self.ipv6, self.tcp, self.udp, self.weight,
        )
    }
}

/// 라우트 레코드 — 목적지 주소를 재작성하거나 걸러내는 프리픽스 규칙
///
/// `prefix4`가 비어 있으면 모든 주소에 매칭되는 기본 라우트입니다.
/// `ipvs_method`는 포워딩 방식 재정의(`masq`/`tunnel`/`droute`) 또는
/// 백엔드 제외(`filter`)를 지정합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// 매칭 대상 IPv4 CIDR 프리픽스 (빈 문자열이면 기본 라우트)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix4: String,
    /// 매칭 시 목적지를 치환할 게이트웨이 IPv4 주소
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway4: String,
    /// 포워딩 방식 재정의 또는 `filter`
    #[serde(
        rename = "ipvsMethod",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub ipvs_method: String,
}

impl fmt::Display for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prefix4={} gateway4={} ipvsMethod={}",
            self.prefix4, self.gateway4, self.ipvs_method,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_json_roundtrip() {
        let frontend = ServiceFrontend {
            ipv4: "10.0.1.1".to_owned(),
            tcp: 80,
            ..Default::default()
        };
        let json = serde_json::to_string(&frontend).unwrap();
        assert_eq!(json, r#"{"ipv4":"10.0.1.1","tcp":80}"#);

        let decoded: ServiceFrontend = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, frontend);
    }

    #[test]
    fn frontend_empty_fields_are_omitted() {
        let json = serde_json::to_string(&ServiceFrontend::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn backend_defaults_on_missing_fields() {
        let backend: ServiceBackend = serde_json::from_str(r#"{"ipv4": "127.0.0.1"}"#).unwrap();
        assert_eq!(backend.ipv4, "127.0.0.1");
        assert_eq!(backend.tcp, 0);
        assert_eq!(backend.weight, 0);
        assert_eq!(backend.effective_weight(), DEFAULT_WEIGHT);
    }

    #[test]
    fn backend_explicit_weight_wins() {
        let backend: ServiceBackend =
            serde_json::from_str(r#"{"ipv4": "10.1.0.1", "tcp": 80, "weight": 3}"#).unwrap();
        assert_eq!(backend.effective_weight(), 3);
    }

    #[test]
    fn backend_ignores_unknown_fields() {
        let backend: ServiceBackend =
            serde_json::from_str(r#"{"ipv4": "10.1.0.1", "comment": "spare"}"#).unwrap();
        assert_eq!(backend.ipv4, "10.1.0.1");
    }

    #[test]
    fn route_uses_camel_case_method_key() {
        let route = RouteConfig {
            prefix4: "10.1.0.0/24".to_owned(),
            gateway4: "10.99.0.1".to_owned(),
            ipvs_method: "droute".to_owned(),
        };
        let json = serde_json::to_string(&route).unwrap();
        assert!(json.contains(r#""ipvsMethod":"droute""#));

        let decoded: RouteConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, route);
    }
}
