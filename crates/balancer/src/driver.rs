//! IPVS 드라이버 — 인메모리 모델을 커널 테이블로 투영
//!
//! 논리 서비스 하나는 (주소 패밀리 × 전송 프로토콜) 4개 슬롯으로
//! 전개됩니다. 슬롯별 커널 서비스는 프런트엔드가 해당 패밀리의 주소와
//! 프로토콜의 포트를 모두 가질 때만 설치됩니다. 백엔드도 같은 규칙을
//! 따르고, 설치 전에 라우트 재작성(게이트웨이 치환, 포워딩 방식
//! 재정의, 필터링)을 거칩니다.
//!
//! # 목적지 병합
//!
//! 커널 목적지는 `(서비스 id, 목적지 주소:포트)`로 식별됩니다. 서로
//! 다른 논리 백엔드가 같은 커널 튜플로 해석되면 (컨테이너 여러 개가
//! 같은 엔드포인트를 서로 다른 이름으로 광고하는 경우) 드라이버는
//! 기여 weight의 합을 가진 커널 목적지 하나만 유지합니다. 병합
//! 레지스트리([`IpvsDriver::dests`])가 그 유일한 권위 원장입니다.
//! 레지스트리와 소유 핸들이 어긋나거나 weight가 음수가 되는 것은
//! 프로그래머 에러이므로 즉시 중단(panic)합니다.
//!
//! 드라이버는 설치된 모든 커널 상태를 소유합니다. 스토어는 서비스
//! 이름으로만 드라이버를 호출하므로 소유 관계는 순환 없는 트리입니다.

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::{debug, error, info, warn};

use gantry_core::config::IpvsConfig;
use gantry_core::error::DriverError;
use gantry_core::types::{ServiceBackend, ServiceFrontend};
use gantry_netlink::{
    Af, Flags, FwdMethod, IpvsClient, IpvsDest, IpvsService, NetlinkError, Protocol,
};

use crate::route::RouteTable;

/// 드라이버가 투영하는 (패밀리, 프로토콜) 슬롯
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub af: Af,
    pub proto: Protocol,
}

/// 슬롯 전개 순서 (서비스 하나당 최대 4개의 커널 서비스)
pub const IPVS_SLOTS: [Slot; 4] = [
    Slot {
        af: Af::INET,
        proto: Protocol::TCP,
    },
    Slot {
        af: Af::INET6,
        proto: Protocol::TCP,
    },
    Slot {
        af: Af::INET,
        proto: Protocol::UDP,
    },
    Slot {
        af: Af::INET6,
        proto: Protocol::UDP,
    },
];

/// 병합 레지스트리 키: (서비스 id 문자열, 목적지 id 문자열)
type DestKey = (String, String);

/// 서비스 이름별로 설치된 커널 서비스 슬롯
#[derive(Debug, Default)]
pub(crate) struct FrontendSlots {
    pub(crate) slots: [Option<IpvsService>; 4],
}

/// (서비스, 백엔드) 이름별 슬롯 상태
///
/// 슬롯에는 이 백엔드가 기여한 커널 목적지의 id 문자열이 들어갑니다.
/// 실제 weight 합산 값은 병합 레지스트리가 가집니다.
#[derive(Debug, Default)]
pub(crate) struct BackendSlots {
    pub(crate) slots: [Option<String>; 4],
    pub(crate) weight: u32,
}

/// IPVS 드라이버
///
/// `client`가 `None`이면 mock 모드로, 커널 호출 없이 같은 상태 전이를
/// 수행합니다 (테스트와 드라이런).
impl std::fmt::Debug for IpvsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpvsDriver").finish_non_exhaustive()
    }
}

pub struct IpvsDriver {
    client: Option<IpvsClient>,

    // 전역 기본값
    fwd_method: FwdMethod,
    sched_name: String,

    // 설치 상태 (서비스/백엔드 이름 기준)
    pub(crate) frontends: HashMap<String, FrontendSlots>,
    pub(crate) backends: HashMap<(String, String), BackendSlots>,

    // 겹치는 목적지의 병합 레지스트리
    pub(crate) dests: HashMap<DestKey, IpvsDest>,
}

impl IpvsDriver {
    /// 설정에 따라 드라이버를 만들고 netlink 핸들을 엽니다.
    ///
    /// IPVS genl 패밀리를 확인하고 커널 버전을 기록합니다.
    /// `config.mock`이면 netlink 핸들 없이 동작합니다.
    pub fn setup(config: &IpvsConfig) -> Result<Self, DriverError> {
        let fwd_method = if config.fwd_method.is_empty() {
            FwdMethod::MASQ
        } else {
            config
                .fwd_method
                .parse()
                .map_err(|_: NetlinkError| DriverError::InvalidFwdMethod(config.fwd_method.clone()))?
        };

        let sched_name = if config.sched_name.is_empty() {
            "wlc".to_owned()
        } else {
            config.sched_name.clone()
        };

        let client = if config.mock {
            None
        } else {
            let mut client = IpvsClient::open().map_err(driver_err)?;
            if config.debug {
                client.set_debug();
            }
            let info = client.get_info().map_err(driver_err)?;
            info!(
                version = %info.version,
                conn_tab_size = info.conn_tab_size,
                "ipvs kernel module ready"
            );
            Some(client)
        };

        Ok(Self {
            client,
            fwd_method,
            sched_name,
            frontends: HashMap::new(),
            backends: HashMap::new(),
            dests: HashMap::new(),
        })
    }

    /// 초기 동기화: 커널 테이블을 비웁니다.
    ///
    /// 선언된 설정이 재시작 간의 유일한 권위이므로, 남아 있던 커널
    /// 상태는 버리고 스토어가 다시 투영합니다.
    pub fn sync(&mut self) -> Result<(), DriverError> {
        if let Some(client) = &mut self.client {
            client.flush().map_err(driver_err)?;
            info!("flushed kernel ipvs table");
        }
        Ok(())
    }

    /// 프런트엔드의 유효한 슬롯마다 커널 서비스를 설치합니다.
    pub fn add_frontend(
        &mut self,
        name: &str,
        frontend: &ServiceFrontend,
    ) -> Result<(), DriverError> {
        let mut slots = FrontendSlots::default();
        let mut result = Ok(());

        for (idx, slot) in IPVS_SLOTS.iter().enumerate() {
            match self.build_service(*slot, frontend) {
                Err(err) => {
                    result = Err(err);
                    break;
                }
                Ok(None) => {}
                Ok(Some(service)) => {
                    debug!(service = name, id = %service.id_string(), "installing virtual service");
                    if let Err(err) = self.up_service(&service) {
                        result = Err(err);
                        break;
                    }
                    slots.slots[idx] = Some(service);
                }
            }
        }

        // 부분 설치도 기록해야 나중에 철거할 수 있습니다.
        self.frontends.insert(name.to_owned(), slots);
        result
    }

    /// 설치된 슬롯의 커널 서비스를 제거합니다.
    ///
    /// 커널이 연관된 목적지를 함께 제거하므로, 병합 레지스트리에서도
    /// 해당 서비스 id의 항목을 모두 걷어냅니다.
    pub fn del_frontend(&mut self, name: &str) -> Result<(), DriverError> {
        let Some(slots) = self.frontends.remove(name) else {
            return Ok(());
        };

        let mut result = Ok(());
        for service in slots.slots.into_iter().flatten() {
            debug!(service = name, id = %service.id_string(), "removing virtual service");
            if let Err(err) = self.down_service(&service) {
                result = Err(err);
                break;
            }
        }

        // 슬롯별 백엔드 상태도 함께 소멸합니다.
        self.backends.retain(|(service, _), _| service != name);
        result
    }

    /// 서비스에 커널 서비스 슬롯이 하나라도 설치되어 있는지 확인합니다.
    pub fn has_frontend(&self, name: &str) -> bool {
        self.frontends.contains_key(name)
    }

    /// 새 백엔드를 각 슬롯에 설치합니다 (활성 상태가 없다고 가정).
    pub fn add_backend(
        &mut self,
        service_name: &str,
        backend_name: &str,
        backend: &ServiceBackend,
        routes: &RouteTable,
    ) -> Result<(), DriverError> {
        let weight = backend.effective_weight();
        let mut slots = BackendSlots {
            slots: Default::default(),
            weight,
        };
        let mut result = Ok(());

        for (idx, _) in IPVS_SLOTS.iter().enumerate() {
            let Some(service) = self.frontend_slot(service_name, idx) else {
                continue;
            };
            match self.build_dest(&service, backend, routes) {
                Err(err) => {
                    result = Err(err);
                    break;
                }
                Ok(None) => {}
                Ok(Some(dest)) => match self.up_dest(&service, dest, weight) {
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                    Ok(dest_id) => slots.slots[idx] = Some(dest_id),
                },
            }
        }

        self.backends
            .insert((service_name.to_owned(), backend_name.to_owned()), slots);
        result
    }

    /// 백엔드 변경을 슬롯별로 조정합니다.
    ///
    /// 이전/새 목적지의 커널 식별자를 비교해서, 같으면 weight 차이만
    /// 반영하고, 다르면 새 목적지를 먼저 설치한 뒤 이전 목적지를
    /// 내립니다 (식별자가 바뀔 때의 트래픽 공백 방지). 두 동작 사이에서
    /// 실패하면 여분의 목적지가 남지만 롤백하지 않습니다.
    pub fn set_backend(
        &mut self,
        service_name: &str,
        backend_name: &str,
        backend: &ServiceBackend,
        routes: &RouteTable,
    ) -> Result<(), DriverError> {
        let key = (service_name.to_owned(), backend_name.to_owned());
        let Some(mut slots) = self.backends.remove(&key) else {
            // 활성 상태가 없으면 새로 설치
            return self.add_backend(service_name, backend_name, backend, routes);
        };

        let get_weight = slots.weight;
        let set_weight = backend.effective_weight();
        slots.weight = set_weight;

        let mut result = Ok(());

        for (idx, _) in IPVS_SLOTS.iter().enumerate() {
            let Some(service) = self.frontend_slot(service_name, idx) else {
                continue;
            };

            let prev = slots.slots[idx].clone();
            let built = match self.build_dest(&service, backend, routes) {
                Err(err) => {
                    result = Err(err);
                    break;
                }
                Ok(built) => built,
            };

            match (prev, built) {
                (None, None) => {}

                (None, Some(dest)) => match self.up_dest(&service, dest, set_weight) {
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                    Ok(dest_id) => slots.slots[idx] = Some(dest_id),
                },

                (Some(prev_id), None) => {
                    if let Err(err) = self.down_dest(&service, &prev_id, get_weight) {
                        result = Err(err);
                        break;
                    }
                    slots.slots[idx] = None;
                }

                (Some(prev_id), Some(dest)) if dest.id_string() == prev_id => {
                    let delta = i64::from(set_weight) - i64::from(get_weight);
                    if let Err(err) = self.adjust_dest(&service, &prev_id, delta) {
                        result = Err(err);
                        break;
                    }
                }

                (Some(prev_id), Some(dest)) => {
                    // 새 목적지 먼저, 이전 목적지 나중
                    match self.up_dest(&service, dest, set_weight) {
                        Err(err) => {
                            result = Err(err);
                            break;
                        }
                        Ok(dest_id) => slots.slots[idx] = Some(dest_id),
                    }
                    if let Err(err) = self.down_dest(&service, &prev_id, get_weight) {
                        warn!(
                            service = service_name,
                            backend = backend_name,
                            "stale destination left behind after replace failure"
                        );
                        result = Err(err);
                        break;
                    }
                }
            }
        }

        self.backends.insert(key, slots);
        result
    }

    /// 백엔드의 활성 목적지를 슬롯별로 내립니다.
    pub fn del_backend(
        &mut self,
        service_name: &str,
        backend_name: &str,
    ) -> Result<(), DriverError> {
        let key = (service_name.to_owned(), backend_name.to_owned());
        let Some(mut slots) = self.backends.remove(&key) else {
            return Ok(());
        };

        let mut result = Ok(());
        for (idx, _) in IPVS_SLOTS.iter().enumerate() {
            let Some(service) = self.frontend_slot(service_name, idx) else {
                continue;
            };
            if let Some(dest_id) = slots.slots[idx].take() {
                if let Err(err) = self.down_dest(&service, &dest_id, slots.weight) {
                    result = Err(err);
                    break;
                }
            }
        }
        result
    }

    /// 동기화 직후의 커널 테이블을 stdout으로 덤프합니다.
    pub fn print(&mut self) -> Result<(), DriverError> {
        let Some(client) = &mut self.client else {
            println!("(mock driver: no kernel table)");
            return Ok(());
        };

        let services = client.list_services().map_err(driver_err)?;

        println!("Proto                           Addr:Port");
        for service in services {
            println!(
                "{:<5} {:>30}:{:<5} {}",
                service.protocol.to_string(),
                service.addr.to_string(),
                service.port,
                service.sched_name,
            );
            for dest in client.list_dests(&service).map_err(driver_err)? {
                println!(
                    "{:5} {:>30}:{:<5} {} weight={}",
                    "",
                    dest.addr.to_string(),
                    dest.port,
                    dest.fwd_method,
                    dest.weight,
                );
            }
        }
        Ok(())
    }

    // --- 내부 빌드/투영 ---

    fn frontend_slot(&self, service_name: &str, idx: usize) -> Option<IpvsService> {
        self.frontends
            .get(service_name)
            .and_then(|slots| slots.slots[idx].clone())
    }

    /// 슬롯에 맞는 커널 서비스 서술자를 만듭니다.
    ///
    /// 프런트엔드에 해당 패밀리 주소나 프로토콜 포트가 없으면 `None`,
    /// 주소 리터럴이 깨져 있으면 에러입니다.
    fn build_service(
        &self,
        slot: Slot,
        frontend: &ServiceFrontend,
    ) -> Result<Option<IpvsService>, DriverError> {
        let addr: IpAddr = if slot.af == Af::INET {
            if frontend.ipv4.is_empty() {
                return Ok(None);
            }
            frontend
                .ipv4
                .parse::<std::net::Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|_| DriverError::InvalidAddress {
                    kind: "ipv4".to_owned(),
                    value: frontend.ipv4.clone(),
                })?
        } else {
            if frontend.ipv6.is_empty() {
                return Ok(None);
            }
            frontend
                .ipv6
                .parse::<std::net::Ipv6Addr>()
                .map(IpAddr::V6)
                .map_err(|_| DriverError::InvalidAddress {
                    kind: "ipv6".to_owned(),
                    value: frontend.ipv6.clone(),
                })?
        };

        let port = if slot.proto == Protocol::TCP {
            frontend.tcp
        } else {
            frontend.udp
        };
        if port == 0 {
            return Ok(None);
        }

        Ok(Some(IpvsService {
            af: slot.af,
            protocol: slot.proto,
            addr,
            port,
            fw_mark: 0,
            sched_name: self.sched_name.clone(),
            flags: Flags {
                flags: 0,
                mask: 0xffff_ffff,
            },
            timeout: 0,
            netmask: 0xffff_ffff,
        }))
    }

    /// 백엔드를 슬롯의 커널 목적지 서술자로 만들고 라우트를 적용합니다.
    fn build_dest(
        &self,
        service: &IpvsService,
        backend: &ServiceBackend,
        routes: &RouteTable,
    ) -> Result<Option<IpvsDest>, DriverError> {
        let addr: IpAddr = if service.af == Af::INET {
            if backend.ipv4.is_empty() {
                return Ok(None);
            }
            backend
                .ipv4
                .parse::<std::net::Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|_| DriverError::InvalidAddress {
                    kind: "ipv4".to_owned(),
                    value: backend.ipv4.clone(),
                })?
        } else {
            if backend.ipv6.is_empty() {
                return Ok(None);
            }
            backend
                .ipv6
                .parse::<std::net::Ipv6Addr>()
                .map(IpAddr::V6)
                .map_err(|_| DriverError::InvalidAddress {
                    kind: "ipv6".to_owned(),
                    value: backend.ipv6.clone(),
                })?
        };

        let port = if service.protocol == Protocol::TCP {
            backend.tcp
        } else {
            backend.udp
        };
        if port == 0 {
            return Ok(None);
        }

        let dest = IpvsDest {
            addr,
            port,
            fwd_method: self.fwd_method,
            ..Default::default()
        };

        Ok(self.apply_route(service, dest, routes))
    }

    /// 목적지 주소에 매칭되는 라우트를 적용합니다.
    ///
    /// 필터 라우트면 목적지를 생략하고, 게이트웨이가 있으면 주소를
    /// 게이트웨이로, 포트를 서비스 포트로 치환합니다 (체이닝).
    fn apply_route(
        &self,
        service: &IpvsService,
        mut dest: IpvsDest,
        routes: &RouteTable,
    ) -> Option<IpvsDest> {
        let route = routes.lookup(&dest.addr)?;

        debug!(dest = %dest.id_string(), route = %route.name, "applying route");

        if route.filter {
            return None;
        }

        if let Some(method) = route.fwd_method {
            dest.fwd_method = method;
        }

        if service.af == Af::INET {
            if let Some(gateway) = route.gateway4 {
                // 체이닝: 게이트웨이의 같은 서비스 포트로 전달
                dest.addr = IpAddr::V4(gateway);
                dest.port = service.port;
            }
        }

        Some(dest)
    }

    fn up_service(&mut self, service: &IpvsService) -> Result<(), DriverError> {
        if let Some(client) = &mut self.client {
            client.new_service(service).map_err(driver_err)?;
        }
        Ok(())
    }

    fn down_service(&mut self, service: &IpvsService) -> Result<(), DriverError> {
        if let Some(client) = &mut self.client {
            client.del_service(service).map_err(driver_err)?;
        }

        // 커널이 목적지를 함께 제거하므로 레지스트리도 걷어냅니다.
        let service_id = service.id_string();
        self.dests.retain(|(sid, _), _| *sid != service_id);
        Ok(())
    }

    /// 목적지를 올립니다. 같은 커널 튜플이 이미 있으면 weight를
    /// 합산해서 병합합니다.
    fn up_dest(
        &mut self,
        service: &IpvsService,
        mut dest: IpvsDest,
        weight: u32,
    ) -> Result<String, DriverError> {
        let key = (service.id_string(), dest.id_string());

        if let Some(merged) = self.dests.get_mut(&key) {
            merged.weight += weight;
            let snapshot = merged.clone();
            info!(
                service = %key.0,
                dest = %key.1,
                add = weight,
                weight = snapshot.weight,
                "merging destination"
            );
            if let Some(client) = &mut self.client {
                client.set_dest(service, &snapshot).map_err(driver_err)?;
            }
            Ok(key.1)
        } else {
            dest.weight = weight;
            info!(
                service = %key.0,
                dest = %key.1,
                weight,
                fwd = %dest.fwd_method,
                "installing destination"
            );
            if let Some(client) = &mut self.client {
                client.new_dest(service, &dest).map_err(driver_err)?;
            }
            let dest_id = key.1.clone();
            self.dests.insert(key, dest);
            Ok(dest_id)
        }
    }

    /// 소유한 목적지의 weight를 부호 있는 delta만큼 조정합니다.
    ///
    /// 레지스트리에 없는 핸들이나 음수 weight는 불변식 위반이므로
    /// 즉시 중단합니다.
    fn adjust_dest(
        &mut self,
        service: &IpvsService,
        dest_id: &str,
        delta: i64,
    ) -> Result<(), DriverError> {
        let key = (service.id_string(), dest_id.to_owned());
        let Some(merged) = self.dests.get_mut(&key) else {
            panic!("adjust_dest: no registered destination for {key:?}");
        };

        let next = i64::from(merged.weight) + delta;
        if next < 0 {
            panic!(
                "adjust_dest: weight underflow for {key:?}: {} {delta:+}",
                merged.weight,
            );
        }
        merged.weight = next as u32;
        let snapshot = merged.clone();

        debug!(service = %key.0, dest = %key.1, delta, weight = snapshot.weight, "adjusting destination");

        if let Some(client) = &mut self.client {
            client.set_dest(service, &snapshot).map_err(driver_err)?;
        }
        Ok(())
    }

    /// 목적지를 내립니다. 남은 기여 weight가 있으면 감산하고, 마지막
    /// 기여자가 떠나면 커널에서 제거합니다.
    fn down_dest(
        &mut self,
        service: &IpvsService,
        dest_id: &str,
        weight: u32,
    ) -> Result<(), DriverError> {
        let key = (service.id_string(), dest_id.to_owned());
        let Some(merged) = self.dests.get_mut(&key) else {
            panic!("down_dest: no registered destination for {key:?}");
        };

        if merged.weight > weight {
            merged.weight -= weight;
            let snapshot = merged.clone();
            info!(
                service = %key.0,
                dest = %key.1,
                sub = weight,
                weight = snapshot.weight,
                "unmerging destination"
            );
            if let Some(client) = &mut self.client {
                client.set_dest(service, &snapshot).map_err(driver_err)?;
            }
        } else if merged.weight < weight {
            panic!(
                "down_dest: weight underflow for {key:?}: {} - {weight}",
                merged.weight,
            );
        } else {
            let snapshot = merged.clone();
            info!(service = %key.0, dest = %key.1, "removing destination");
            if let Some(client) = &mut self.client {
                client.del_dest(service, &snapshot).map_err(driver_err)?;
            }
            self.dests.remove(&key);
        }
        Ok(())
    }
}

fn driver_err(err: NetlinkError) -> DriverError {
    DriverError::Netlink(err.to_string())
}

/// 드라이버 에러를 서비스 단위로 기록합니다 (전파하지 않음).
pub(crate) fn log_driver_error(service: &str, err: &DriverError) {
    error!(service, %err, "driver error");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_driver() -> IpvsDriver {
        IpvsDriver::setup(&IpvsConfig {
            mock: true,
            ..Default::default()
        })
        .unwrap()
    }

    fn frontend_v4(tcp: u16) -> ServiceFrontend {
        ServiceFrontend {
            ipv4: "10.0.1.1".to_owned(),
            tcp,
            ..Default::default()
        }
    }

    fn backend_v4(addr: &str, tcp: u16, weight: u32) -> ServiceBackend {
        ServiceBackend {
            ipv4: addr.to_owned(),
            tcp,
            weight,
            ..Default::default()
        }
    }

    #[test]
    fn setup_defaults() {
        let driver = mock_driver();
        assert_eq!(driver.fwd_method, FwdMethod::MASQ);
        assert_eq!(driver.sched_name, "wlc");
    }

    #[test]
    fn setup_rejects_unknown_fwd_method() {
        let err = IpvsDriver::setup(&IpvsConfig {
            fwd_method: "bypass".to_owned(),
            mock: true,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, DriverError::InvalidFwdMethod(_)));
    }

    #[test]
    fn frontend_fills_only_matching_slots() {
        let mut driver = mock_driver();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();

        let slots = &driver.frontends["web"];
        assert!(slots.slots[0].is_some()); // inet/tcp
        assert!(slots.slots[1].is_none()); // inet6/tcp
        assert!(slots.slots[2].is_none()); // inet/udp
        assert!(slots.slots[3].is_none()); // inet6/udp

        let service = slots.slots[0].as_ref().unwrap();
        assert_eq!(service.id_string(), "inet+tcp://10.0.1.1:80");
        assert_eq!(service.sched_name, "wlc");
        assert_eq!(service.netmask, 0xffff_ffff);
    }

    #[test]
    fn dual_stack_frontend_fills_four_slots() {
        let mut driver = mock_driver();
        driver
            .add_frontend(
                "web",
                &ServiceFrontend {
                    ipv4: "10.0.1.1".to_owned(),
                    ipv6: "2001:db8::1".to_owned(),
                    tcp: 80,
                    udp: 80,
                },
            )
            .unwrap();

        let slots = &driver.frontends["web"];
        assert!(slots.slots.iter().all(Option::is_some));
    }

    #[test]
    fn invalid_frontend_address_is_an_error() {
        let mut driver = mock_driver();
        let err = driver
            .add_frontend(
                "web",
                &ServiceFrontend {
                    ipv4: "10.0.1.999".to_owned(),
                    tcp: 80,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidAddress { .. }));
    }

    #[test]
    fn backend_without_frontend_slot_is_inert() {
        let mut driver = mock_driver();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();

        // IPv6 전용 백엔드는 inet 슬롯에 설치되지 않음
        let backend = ServiceBackend {
            ipv6: "2001:db8::2".to_owned(),
            tcp: 80,
            ..Default::default()
        };
        let routes = RouteTable::new();
        driver.add_backend("web", "b6", &backend, &routes).unwrap();

        assert!(driver.dests.is_empty());
        assert!(driver.backends[&("web".to_owned(), "b6".to_owned())]
            .slots
            .iter()
            .all(Option::is_none));
    }

    #[test]
    fn merge_sums_weights_and_unmerges() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();

        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 3), &routes)
            .unwrap();
        driver
            .add_backend("web", "b2", &backend_v4("10.1.0.1", 80, 7), &routes)
            .unwrap();

        let key = (
            "inet+tcp://10.0.1.1:80".to_owned(),
            "10.1.0.1:80".to_owned(),
        );
        assert_eq!(driver.dests.len(), 1);
        assert_eq!(driver.dests[&key].weight, 10);

        driver.del_backend("web", "b1").unwrap();
        assert_eq!(driver.dests[&key].weight, 7);

        driver.del_backend("web", "b2").unwrap();
        assert!(driver.dests.is_empty());
    }

    #[test]
    fn set_backend_adjusts_weight_in_place() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 3), &routes)
            .unwrap();
        driver
            .add_backend("web", "b2", &backend_v4("10.1.0.1", 80, 7), &routes)
            .unwrap();

        driver
            .set_backend("web", "b1", &backend_v4("10.1.0.1", 80, 5), &routes)
            .unwrap();

        let key = (
            "inet+tcp://10.0.1.1:80".to_owned(),
            "10.1.0.1:80".to_owned(),
        );
        assert_eq!(driver.dests[&key].weight, 12);
    }

    #[test]
    fn set_backend_replaces_changed_identity() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 3), &routes)
            .unwrap();

        driver
            .set_backend("web", "b1", &backend_v4("10.1.0.2", 80, 3), &routes)
            .unwrap();

        assert_eq!(driver.dests.len(), 1);
        let key = (
            "inet+tcp://10.0.1.1:80".to_owned(),
            "10.1.0.2:80".to_owned(),
        );
        assert_eq!(driver.dests[&key].weight, 3);
    }

    #[test]
    fn set_backend_to_inactive_removes_dest() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 3), &routes)
            .unwrap();

        // TCP 포트가 사라지면 슬롯이 비활성화됨
        let inactive = ServiceBackend {
            ipv4: "10.1.0.1".to_owned(),
            udp: 53,
            weight: 3,
            ..Default::default()
        };
        driver.set_backend("web", "b1", &inactive, &routes).unwrap();
        assert!(driver.dests.is_empty());
    }

    #[test]
    fn del_frontend_purges_registry() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 0), &routes)
            .unwrap();
        assert_eq!(driver.dests.len(), 1);

        driver.del_frontend("web").unwrap();
        assert!(driver.dests.is_empty());
        assert!(driver.backends.is_empty());
        assert!(!driver.has_frontend("web"));
    }

    #[test]
    fn route_filter_omits_destination() {
        let mut driver = mock_driver();
        let mut routes = RouteTable::new();
        routes
            .get_or_create("blackhole", &gantry_core::event::Source::named("test"))
            .configure(&gantry_core::types::RouteConfig {
                prefix4: "10.1.0.0/24".to_owned(),
                ipvs_method: "filter".to_owned(),
                ..Default::default()
            })
            .unwrap();

        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 0), &routes)
            .unwrap();

        assert!(driver.dests.is_empty());
    }

    #[test]
    fn route_chaining_rewrites_addr_and_port() {
        let mut driver = mock_driver();
        let mut routes = RouteTable::new();
        routes
            .get_or_create("rack", &gantry_core::event::Source::named("test"))
            .configure(&gantry_core::types::RouteConfig {
                prefix4: "10.1.0.0/24".to_owned(),
                gateway4: "10.99.0.1".to_owned(),
                ipvs_method: "droute".to_owned(),
            })
            .unwrap();

        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.5", 8080, 0), &routes)
            .unwrap();

        let key = (
            "inet+tcp://10.0.1.1:80".to_owned(),
            "10.99.0.1:80".to_owned(),
        );
        let dest = &driver.dests[&key];
        assert_eq!(dest.port, 80); // 서비스 포트로 치환
        assert_eq!(dest.fwd_method, FwdMethod::DROUTE);
        assert_eq!(dest.weight, gantry_core::types::DEFAULT_WEIGHT);
    }

    #[test]
    #[should_panic(expected = "down_dest: weight underflow")]
    fn down_dest_underflow_is_fatal() {
        let mut driver = mock_driver();
        let routes = RouteTable::new();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        driver
            .add_backend("web", "b1", &backend_v4("10.1.0.1", 80, 3), &routes)
            .unwrap();

        let service = driver.frontend_slot("web", 0).unwrap();
        driver.down_dest(&service, "10.1.0.1:80", 5).unwrap();
    }

    #[test]
    #[should_panic(expected = "no registered destination")]
    fn adjust_unknown_dest_is_fatal() {
        let mut driver = mock_driver();
        driver.add_frontend("web", &frontend_v4(80)).unwrap();
        let service = driver.frontend_slot("web", 0).unwrap();
        driver.adjust_dest(&service, "10.9.9.9:80", 1).unwrap();
    }
}
