//! 서비스 스토어 — 설정 이벤트를 정규 모델로 접어 넣는 단일 지점
//!
//! 여러 소스(etcd, 로컬 디렉터리, 컨테이너 런타임)의 설정을 서비스 /
//! 프런트엔드 / 백엔드 / 라우트의 인메모리 모델로 합치고, 드라이버가
//! 연결된 뒤에는 변경분을 커널로 밀어냅니다.
//!
//! # 수명 주기
//!
//! 1. `new_config`: 초기 스캔 레코드를 조용히 적재 (드라이버 없음)
//! 2. `sync_ipvs`: 드라이버 연결 — 커널을 flush하고 적재된 상태를 재투영
//! 3. `config_event`: 라이브 이벤트를 하나씩 적용하고 즉시 투영
//!
//! # 와일드카드 삭제의 범위
//!
//! 이름이 빈 레코드의 `del`은 **이벤트와 같은 소스가 만든 항목만**
//! 제거합니다. 한 소스의 철수가 다른 소스의 설정을 지우지 않게 하기
//! 위한 것으로, 라우트·서비스·백엔드에 동일하게 적용됩니다.
//! 삭제가 아닌 와일드카드 동작은 소스와 무관하게 전체에 적용됩니다.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use gantry_core::config::IpvsConfig;
use gantry_core::error::DriverError;
use gantry_core::event::{Action, Config, Event, Source};
use gantry_core::types::{ServiceBackend, ServiceFrontend};

use crate::driver::{IpvsDriver, log_driver_error};
use crate::route::RouteTable;

/// 단일 논리 서비스의 설정 상태
#[derive(Debug)]
pub struct Service {
    /// 서비스 이름 (고유)
    pub name: String,
    /// 마지막으로 적용된 프런트엔드
    pub frontend: Option<ServiceFrontend>,
    /// 이름별 백엔드
    pub backends: HashMap<String, ServiceBackend>,

    /// 백엔드별 설정 소스 (와일드카드 삭제 범위 판정용)
    backend_sources: HashMap<String, Source>,
    /// 이 서비스를 마지막으로 설정한 소스
    source: Source,
}

impl Service {
    fn new(name: &str, source: Source) -> Self {
        Self {
            name: name.to_owned(),
            frontend: None,
            backends: HashMap::new(),
            backend_sources: HashMap::new(),
            source,
        }
    }
}

/// 서비스 스토어
///
/// 재진입 불가: 단일 스레드(또는 단일 액터)에서만 사용해야 합니다.
pub struct Services {
    services: HashMap<String, Service>,
    routes: RouteTable,
    driver: Option<IpvsDriver>,
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl Services {
    /// 빈 스토어를 만듭니다.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            routes: RouteTable::new(),
            driver: None,
        }
    }

    /// 초기 스캔 레코드를 적재합니다 (드라이버 연결 전).
    pub fn new_config(&mut self, config: Config) -> Result<(), DriverError> {
        if self.driver.is_some() {
            return Err(DriverError::AlreadyAttached);
        }
        self.apply(Action::New, config);
        Ok(())
    }

    /// 드라이버를 연결하고 적재된 상태를 커널로 투영합니다.
    ///
    /// 커널 테이블을 flush한 뒤 모든 서비스를 새로 설치합니다.
    pub fn sync_ipvs(&mut self, config: &IpvsConfig) -> Result<(), DriverError> {
        let mut driver = IpvsDriver::setup(config)?;
        driver.sync()?;
        self.driver = Some(driver);

        let names: Vec<String> = self.services.keys().cloned().collect();
        info!(services = names.len(), routes = self.routes.len(), "projecting initial state");
        for name in names {
            self.sync_service(&name);
        }
        Ok(())
    }

    /// 라이브 설정 이벤트를 적용합니다 (드라이버 연결 후).
    pub fn config_event(&mut self, event: Event) -> Result<(), DriverError> {
        if self.driver.is_none() {
            return Err(DriverError::NotAttached);
        }
        self.apply(event.action, event.config);
        Ok(())
    }

    /// 동기화 직후의 커널 테이블을 stdout으로 덤프합니다.
    pub fn print(&mut self) -> Result<(), DriverError> {
        match &mut self.driver {
            Some(driver) => driver.print(),
            None => Err(DriverError::NotAttached),
        }
    }

    /// 등록된 서비스 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// 스토어가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 등록된 라우트 수를 반환합니다.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    // --- 이벤트 적용 ---

    fn apply(&mut self, action: Action, config: Config) {
        // 모든 이벤트는 값과 함께 기록됩니다 (주요 관측 수단).
        info!(%action, %config, "config");

        match config {
            Config::Service { name, source } => {
                if name.is_empty() {
                    let names = self.wildcard_services(action, &source);
                    for name in names {
                        self.apply_service(&name, action, &source);
                    }
                } else {
                    self.apply_service(&name, action, &source);
                }
            }

            Config::Frontend {
                name,
                frontend,
                source,
            } => self.apply_frontend(&name, action, frontend, source),

            Config::Backend {
                name,
                backend_name,
                backend,
                source,
            } => {
                if backend_name.is_empty() {
                    let backend_names = self.wildcard_backends(&name, action, &source);
                    for backend_name in backend_names {
                        self.apply_backend(&name, &backend_name, action, backend.clone(), &source);
                    }
                } else {
                    self.apply_backend(&name, &backend_name, action, backend, &source);
                }
            }

            Config::Route {
                name,
                route,
                source,
            } => {
                if name.is_empty() {
                    let names = match action {
                        Action::Del => {
                            debug!(scope = %source, "source-scoped wildcard route delete");
                            self.routes.names_from_source(&source)
                        }
                        _ => self.routes.names(),
                    };
                    for name in names {
                        self.apply_route(&name, action, &route, &source);
                    }
                } else {
                    self.apply_route(&name, action, &route, &source);
                }
            }
        }
    }

    /// 와일드카드 서비스 레코드의 대상 목록을 정합니다.
    fn wildcard_services(&self, action: Action, source: &Source) -> Vec<String> {
        match action {
            Action::Del => {
                debug!(scope = %source, "source-scoped wildcard service delete");
                self.services
                    .values()
                    .filter(|service| service.source == *source)
                    .map(|service| service.name.clone())
                    .collect()
            }
            _ => self.services.keys().cloned().collect(),
        }
    }

    /// 와일드카드 백엔드 레코드의 대상 목록을 정합니다.
    fn wildcard_backends(&self, service: &str, action: Action, source: &Source) -> Vec<String> {
        let Some(service) = self.services.get(service) else {
            return Vec::new();
        };
        match action {
            Action::Del => {
                debug!(scope = %source, "source-scoped wildcard backend delete");
                service
                    .backends
                    .keys()
                    .filter(|name| service.backend_sources.get(*name) == Some(source))
                    .cloned()
                    .collect()
            }
            _ => service.backends.keys().cloned().collect(),
        }
    }

    fn apply_service(&mut self, name: &str, action: Action, source: &Source) {
        match action {
            Action::Del => {
                if self.services.remove(name).is_some() {
                    debug!(service = name, "removing service");
                    if let Some(driver) = self.driver.as_mut() {
                        if let Err(err) = driver.del_frontend(name) {
                            log_driver_error(name, &err);
                        }
                    }
                }
            }
            // 서비스는 첫 언급 시점에 암묵적으로 생성됩니다.
            _ => self.get_or_create(name, source),
        }
    }

    fn apply_frontend(
        &mut self,
        name: &str,
        action: Action,
        frontend: ServiceFrontend,
        source: Source,
    ) {
        self.get_or_create(name, &source);
        let prev = self.services.get(name).and_then(|s| s.frontend.clone());

        match action {
            // 드라이버 연결 전: 기록만
            Action::New => {}
            Action::Set => match &prev {
                None => self.new_frontend(name, &frontend),
                Some(prev) if *prev != frontend => {
                    // 교체: 철거 후 재설치
                    self.del_frontend(name);
                    self.new_frontend(name, &frontend);
                }
                _ => {} // 변화 없음
            },
            Action::Del => self.del_frontend(name),
        }

        if let Some(service) = self.services.get_mut(name) {
            service.source = source;
            service.frontend = match action {
                Action::Del => None,
                _ => Some(frontend),
            };
        }
    }

    fn apply_backend(
        &mut self,
        name: &str,
        backend_name: &str,
        action: Action,
        backend: ServiceBackend,
        source: &Source,
    ) {
        self.get_or_create(name, source);
        let has_frontend = self
            .services
            .get(name)
            .map(|s| s.frontend.is_some())
            .unwrap_or(false);
        let prev = self
            .services
            .get(name)
            .and_then(|s| s.backends.get(backend_name).cloned());

        match action {
            Action::New => {
                self.store_backend(name, backend_name, backend, source);
            }
            Action::Set => {
                if prev.as_ref() == Some(&backend) {
                    return; // 변화 없음 — 중복 적용은 무해해야 합니다
                }
                if has_frontend {
                    if let Some(driver) = self.driver.as_mut() {
                        if let Err(err) =
                            driver.set_backend(name, backend_name, &backend, &self.routes)
                        {
                            log_driver_error(name, &err);
                        }
                    }
                }
                self.store_backend(name, backend_name, backend, source);
            }
            Action::Del => {
                if has_frontend {
                    if let Some(driver) = self.driver.as_mut() {
                        if let Err(err) = driver.del_backend(name, backend_name) {
                            log_driver_error(name, &err);
                        }
                    }
                }
                if let Some(service) = self.services.get_mut(name) {
                    service.backends.remove(backend_name);
                    service.backend_sources.remove(backend_name);
                }
            }
        }
    }

    /// 라우트 변경을 적용합니다.
    ///
    /// 이미 설치된 백엔드는 다시 조정하지 않습니다. 라우트 변경을
    /// 반영하려면 영향을 받는 서비스를 다시 게시해야 합니다.
    fn apply_route(
        &mut self,
        name: &str,
        action: Action,
        route: &gantry_core::types::RouteConfig,
        source: &Source,
    ) {
        match action {
            Action::New | Action::Set => {
                let entry = self.routes.get_or_create(name, source);
                entry.source = source.clone();
                match entry.configure(route) {
                    Ok(()) => debug!(route = name, "route configured"),
                    Err(err) => warn!(route = name, %err, "route config error"),
                }
            }
            Action::Del => self.routes.del(name),
        }
    }

    // --- 드라이버 투영 ---

    fn get_or_create(&mut self, name: &str, source: &Source) {
        if !self.services.contains_key(name) {
            debug!(service = name, %source, "creating service");
            self.services
                .insert(name.to_owned(), Service::new(name, source.clone()));
        }
    }

    fn store_backend(
        &mut self,
        name: &str,
        backend_name: &str,
        backend: ServiceBackend,
        source: &Source,
    ) {
        if let Some(service) = self.services.get_mut(name) {
            service.backends.insert(backend_name.to_owned(), backend);
            service
                .backend_sources
                .insert(backend_name.to_owned(), source.clone());
        }
    }

    /// 드라이버 연결 시점의 서비스 재투영 (프런트엔드 + 백엔드 전체)
    fn sync_service(&mut self, name: &str) {
        let frontend = self.services.get(name).and_then(|s| s.frontend.clone());
        if let Some(frontend) = frontend {
            self.new_frontend(name, &frontend);
        }
    }

    /// 프런트엔드와 저장된 백엔드 전체를 커널에 설치합니다.
    fn new_frontend(&mut self, name: &str, frontend: &ServiceFrontend) {
        let backends: Vec<(String, ServiceBackend)> = self
            .services
            .get(name)
            .map(|s| {
                s.backends
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let Some(driver) = self.driver.as_mut() else {
            return;
        };

        info!(service = name, %frontend, "new frontend");
        if let Err(err) = driver.add_frontend(name, frontend) {
            log_driver_error(name, &err);
        }
        for (backend_name, backend) in backends {
            info!(service = name, backend = %backend_name, %backend, "new backend");
            if let Err(err) = driver.add_backend(name, &backend_name, &backend, &self.routes) {
                log_driver_error(name, &err);
            }
        }
    }

    /// 프런트엔드를 철거합니다 (커널이 목적지도 함께 제거).
    fn del_frontend(&mut self, name: &str) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        info!(service = name, "del frontend");
        if let Err(err) = driver.del_frontend(name) {
            log_driver_error(name, &err);
        }
    }

    #[cfg(test)]
    pub(crate) fn driver(&self) -> &IpvsDriver {
        self.driver.as_ref().expect("driver not attached")
    }

    #[cfg(test)]
    pub(crate) fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    #[cfg(test)]
    pub(crate) fn route_table(&self) -> &RouteTable {
        &self.routes
    }
}
