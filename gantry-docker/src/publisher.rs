//! 컨테이너 상태를 트리 스토어에 게시/철회
//!
//! 실행 중인 컨테이너는 파생된 백엔드 레코드를 게시하고, 내려간
//! 컨테이너는 이전에 게시했던 레코드를 철회합니다. 게시에 성공한
//! 레코드만 기억해 두므로 철회는 항상 게시의 역연산입니다.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use gantry_config_store::TreeSource;
use gantry_config_store::tree::TreeStore;
use gantry_core::event::Config;

use crate::docker::{Container, ContainerEvent};
use crate::labels::container_configs;

/// 컨테이너 이벤트를 트리 스토어 게시로 바꾸는 게시자
pub struct Publisher<S: TreeStore> {
    tree: TreeSource<S>,
    /// 컨테이너 id → 게시에 성공한 레코드 목록
    containers: HashMap<String, Vec<Config>>,
}

impl<S: TreeStore> Publisher<S> {
    /// 트리 소스 위에 게시자를 만듭니다.
    pub fn new(tree: TreeSource<S>) -> Self {
        Self {
            tree,
            containers: HashMap::new(),
        }
    }

    /// 추적 중인 컨테이너 수를 반환합니다.
    pub fn tracked(&self) -> usize {
        self.containers.len()
    }

    /// 컨테이너 이벤트 하나를 처리합니다.
    pub async fn handle(&mut self, event: ContainerEvent) {
        debug!(container = %event.id, status = %event.status, running = event.running, "container event");

        if event.running {
            match &event.state {
                Some(state) => self.sync_container(state).await,
                None => warn!(container = %event.id, "running container without state"),
            }
        } else if self.containers.contains_key(&event.id) {
            self.teardown(&event.id).await;
        } else {
            debug!(container = %event.id, "ignoring event for untracked container");
        }
    }

    /// 컨테이너의 파생 레코드를 게시하고 기억합니다.
    async fn sync_container(&mut self, container: &Container) {
        debug!(
            container = %container.id,
            name = %container.name,
            image = %container.image,
            "syncing container"
        );
        let configs = container_configs(container);
        let mut published = Vec::with_capacity(configs.len());

        for config in configs {
            match self.tree.publish(&config).await {
                Ok(()) => {
                    info!(container = %container.id, %config, "published");
                    published.push(config);
                }
                Err(err) => error!(container = %container.id, %config, %err, "publish failed"),
            }
        }

        self.containers.insert(container.id.clone(), published);
    }

    /// 컨테이너가 게시했던 레코드를 철회합니다.
    async fn teardown(&mut self, id: &str) {
        let Some(configs) = self.containers.remove(id) else {
            return;
        };
        for config in configs {
            match self.tree.retract(&config).await {
                Ok(()) => info!(container = %id, %config, "retracted"),
                Err(err) => error!(container = %id, %config, %err, "retract failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use gantry_core::config::EtcdConfig;
    use gantry_core::error::StoreError;
    use gantry_core::event::Source;

    use gantry_config_store::tree::{TreeChange, TreeSnapshot, TreeWatcher};

    use crate::docker::ContainerPort;
    use crate::labels::{BACKEND_TCP_LABEL, SERVICE_LABEL};

    /// put/delete만 받는 초소형 인메모리 스토어
    #[derive(Clone, Default)]
    struct MemStore {
        data: Arc<Mutex<BTreeMap<String, String>>>,
    }

    struct IdleWatcher;

    impl TreeWatcher for IdleWatcher {
        async fn next_change(&mut self) -> Result<Option<TreeChange>, StoreError> {
            Ok(None)
        }
    }

    impl TreeStore for MemStore {
        type Watcher = IdleWatcher;

        async fn scan(&mut self, _prefix: &str) -> Result<TreeSnapshot, StoreError> {
            Ok(TreeSnapshot::default())
        }

        async fn watch(
            &mut self,
            _prefix: &str,
            _start_revision: i64,
        ) -> Result<Self::Watcher, StoreError> {
            Ok(IdleWatcher)
        }

        async fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn delete(&mut self, key: &str) -> Result<(), StoreError> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn publisher(store: MemStore) -> Publisher<MemStore> {
        let config = EtcdConfig {
            prefix: "/gantry".to_owned(),
            ..Default::default()
        };
        Publisher::new(TreeSource::with_store(store, &config))
    }

    fn running_container(id: &str) -> Container {
        Container {
            id: id.to_owned(),
            name: format!("web-{id}"),
            running: true,
            ipv4: Some("172.17.0.2".parse().unwrap()),
            image: "nginx:latest".to_owned(),
            ports: vec![ContainerPort {
                proto: "tcp".to_owned(),
                port: 80,
            }],
            labels: HashMap::from([
                (SERVICE_LABEL.to_owned(), "web".to_owned()),
                (BACKEND_TCP_LABEL.to_owned(), "80".to_owned()),
            ]),
        }
    }

    fn start_event(container: Container) -> ContainerEvent {
        ContainerEvent {
            id: container.id.clone(),
            status: "start".to_owned(),
            running: true,
            state: Some(container),
        }
    }

    fn stop_event(id: &str) -> ContainerEvent {
        ContainerEvent {
            id: id.to_owned(),
            status: "die".to_owned(),
            running: false,
            state: None,
        }
    }

    #[tokio::test]
    async fn start_publishes_and_stop_retracts() {
        let store = MemStore::default();
        let mut publisher = publisher(store.clone());

        publisher.handle(start_event(running_container("c1"))).await;
        assert_eq!(publisher.tracked(), 1);

        let key = "/gantry/services/web/backends/c1";
        assert!(store.data.lock().unwrap().contains_key(key));
        assert!(
            store.data.lock().unwrap()[key].contains("172.17.0.2"),
        );

        publisher.handle(stop_event("c1")).await;
        assert_eq!(publisher.tracked(), 0);
        assert!(!store.data.lock().unwrap().contains_key(key));
    }

    #[tokio::test]
    async fn unknown_stop_is_ignored() {
        let store = MemStore::default();
        let mut publisher = publisher(store);

        publisher.handle(stop_event("ghost")).await;
        assert_eq!(publisher.tracked(), 0);
    }

    #[tokio::test]
    async fn resync_replaces_published_set() {
        let store = MemStore::default();
        let mut publisher = publisher(store.clone());

        publisher.handle(start_event(running_container("c1"))).await;

        // 라벨이 사라진 재동기화: 게시 목록이 빈 집합으로 교체됨
        let mut unlabeled = running_container("c1");
        unlabeled.labels.clear();
        publisher
            .handle(ContainerEvent {
                id: "c1".to_owned(),
                status: "sync".to_owned(),
                running: true,
                state: Some(unlabeled),
            })
            .await;

        assert_eq!(publisher.tracked(), 1);

        publisher.handle(stop_event("c1")).await;
        assert_eq!(publisher.tracked(), 0);
    }

    #[tokio::test]
    async fn unlabeled_running_container_publishes_nothing() {
        let store = MemStore::default();
        let mut publisher = publisher(store.clone());

        let mut container = running_container("c2");
        container.labels.clear();
        publisher.handle(start_event(container)).await;

        assert!(store.data.lock().unwrap().is_empty());
    }

    #[test]
    fn published_records_use_docker_source() {
        let configs = container_configs(&running_container("c1"));
        assert!(configs.iter().all(|c| *c.source() == Source::Docker));
    }
}
