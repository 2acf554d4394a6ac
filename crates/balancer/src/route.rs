//! 라우트 테이블 — 이름 붙은 IPv4 프리픽스와 최장 프리픽스 조회
//!
//! 라우트는 백엔드가 커널에 투영되기 전에 적용되는 재작성 규칙입니다.
//! 조회는 목적지 주소를 포함하는 라우트 중 프리픽스 길이가 가장 긴
//! 것을 돌려주며, 프리픽스가 없는 기본 라우트는 길이 0으로 항상
//! 마지막 순위입니다.
//!
//! IPv6 조회는 구현되어 있지 않습니다. IPv6 주소는 항상 `None`을
//! 돌려줍니다.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use tracing::debug;

use gantry_core::error::DriverError;
use gantry_core::event::Source;
use gantry_core::types::RouteConfig;
use gantry_netlink::FwdMethod;

/// 설정이 적용된 단일 라우트
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// 라우트 이름 (테이블 키)
    pub name: String,
    /// 매칭 프리픽스. `None`이면 모든 IPv4 주소에 매칭되는 기본 라우트.
    pub prefix4: Option<Ipv4Net>,
    /// 매칭 시 목적지 주소를 치환할 게이트웨이
    pub gateway4: Option<Ipv4Addr>,
    /// 포워딩 방식 재정의
    pub fwd_method: Option<FwdMethod>,
    /// `true`면 매칭된 백엔드를 설치하지 않음
    pub filter: bool,
    /// 이 라우트를 마지막으로 설정한 소스
    pub source: Source,
}

impl Route {
    fn new(name: &str, source: Source) -> Self {
        Self {
            name: name.to_owned(),
            prefix4: None,
            gateway4: None,
            fwd_method: None,
            filter: false,
            source,
        }
    }

    /// 레코드 값을 라우트 속성으로 풀어 적용합니다.
    ///
    /// 필드 단위로 적용하므로 중간에 실패하면 앞선 필드는 이미 반영된
    /// 상태로 남습니다 (다음 set 이벤트가 덮어씁니다).
    pub fn configure(&mut self, config: &RouteConfig) -> Result<(), DriverError> {
        if config.prefix4.is_empty() {
            self.prefix4 = None; // 기본 라우트
        } else {
            let prefix: Ipv4Net =
                config
                    .prefix4
                    .parse()
                    .map_err(|_| DriverError::InvalidAddress {
                        kind: "prefix4".to_owned(),
                        value: config.prefix4.clone(),
                    })?;
            self.prefix4 = Some(prefix.trunc());
        }

        if config.gateway4.is_empty() {
            self.gateway4 = None;
        } else {
            self.gateway4 = Some(config.gateway4.parse().map_err(|_| {
                DriverError::InvalidAddress {
                    kind: "gateway4".to_owned(),
                    value: config.gateway4.clone(),
                }
            })?);
        }

        match config.ipvs_method.as_str() {
            "" => {
                self.filter = false;
                self.fwd_method = None;
            }
            "filter" => {
                self.filter = true;
                self.fwd_method = None;
            }
            method => {
                self.filter = false;
                self.fwd_method = Some(
                    method
                        .parse()
                        .map_err(|_| DriverError::InvalidFwdMethod(method.to_owned()))?,
                );
            }
        }

        Ok(())
    }

    /// 주소가 이 라우트에 매칭되면 프리픽스 길이를 반환합니다.
    ///
    /// 기본 라우트는 길이 0으로 매칭됩니다. IPv6 주소는 매칭되지
    /// 않습니다 (IPv6 조회 미구현).
    fn match_len(&self, ip: &IpAddr) -> Option<u8> {
        let IpAddr::V4(ip4) = ip else {
            return None;
        };

        match &self.prefix4 {
            None => Some(0),
            Some(prefix) if prefix.contains(ip4) => Some(prefix.prefix_len()),
            Some(_) => None,
        }
    }
}

/// 이름 → 라우트 테이블
///
/// `BTreeMap`이라 순회 순서가 안정적이고, 같은 길이의 프리픽스가
/// 겹치면 이름 순으로 먼저 오는 라우트가 이깁니다.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, Route>,
}

impl RouteTable {
    /// 빈 테이블을 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름으로 라우트를 찾고, 없으면 빈 라우트를 만들어 돌려줍니다.
    pub fn get_or_create(&mut self, name: &str, source: &Source) -> &mut Route {
        self.routes
            .entry(name.to_owned())
            .or_insert_with(|| Route::new(name, source.clone()))
    }

    /// 이름으로 라우트를 조회합니다.
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    /// 라우트를 제거합니다.
    pub fn del(&mut self, name: &str) {
        self.routes.remove(name);
    }

    /// 등록된 라우트 이름 목록을 반환합니다.
    pub fn names(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// 소스가 일치하는 라우트 이름 목록을 반환합니다.
    pub fn names_from_source(&self, source: &Source) -> Vec<String> {
        self.routes
            .values()
            .filter(|route| route.source == *source)
            .map(|route| route.name.clone())
            .collect()
    }

    /// 등록된 라우트 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// 테이블이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 주어진 주소에 대해 가장 구체적인 라우트를 반환합니다.
    ///
    /// 매칭되는 라우트 중 프리픽스 길이가 가장 긴 것을 고르고,
    /// 기본 라우트(길이 0)는 다른 매칭이 없을 때만 선택됩니다.
    pub fn lookup(&self, ip: &IpAddr) -> Option<&Route> {
        let mut best: Option<(&Route, u8)> = None;

        for route in self.routes.values() {
            let Some(len) = route.match_len(ip) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, best_len)) => len > best_len,
            };
            if better {
                best = Some((route, len));
            }
        }

        if let Some((route, len)) = best {
            debug!(route = %route.name, prefix_len = len, ip = %ip, "route matched");
        }
        best.map(|(route, _)| route)
    }
}
