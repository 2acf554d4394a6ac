//! 트리 스토어 소스 — 스캔 → 워치 프로토콜과 게시/철회
//!
//! 스캔은 prefix 아래 전체를 원자적 리비전 `R`과 함께 읽어 초기
//! 레코드 목록을 만들고, 워치는 `R+1`부터의 변경을 `set`/`del`
//! 이벤트로 바꿔 채널에 흘립니다. 워치가 끊기면 마지막으로 관측한
//! 리비전부터 즉시 다시 엽니다. 이벤트 채널은 복구 불가능한 에러에서만
//! 닫힙니다.
//!
//! etcd에서 온 라우트 레코드를 걸러내는 옵션은 스토어가 아니라 이
//! 어댑터 경계에 있습니다. 스토어는 걸러진 이벤트를 아예 관측하지
//! 못합니다.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gantry_core::config::EtcdConfig;
use gantry_core::error::StoreError;
use gantry_core::event::{Action, Config, Event, Source};
use gantry_core::node::{Node, decode};

use crate::tree::{ChangeKind, EtcdTreeStore, TreeChange, TreeStore, TreeWatcher};

/// 트리 스토어 기반 설정 소스
pub struct TreeSource<S: TreeStore> {
    store: S,
    prefix: String,
    filter_routes: bool,
    revision: i64,
}

impl TreeSource<EtcdTreeStore> {
    /// etcd에 연결된 소스를 엽니다.
    pub async fn open(config: &EtcdConfig) -> Result<Self, StoreError> {
        let store = EtcdTreeStore::connect(&config.endpoint_list()).await?;
        info!(endpoints = %config.endpoints, prefix = %config.prefix, "tree store open");
        Ok(Self::with_store(store, config))
    }
}

impl<S: TreeStore> TreeSource<S> {
    /// 임의 스토어 구현 위에 소스를 만듭니다 (테스트).
    pub fn with_store(store: S, config: &EtcdConfig) -> Self {
        Self {
            store,
            prefix: config.prefix.trim_end_matches('/').to_owned(),
            filter_routes: config.filter_routes,
            revision: 0,
        }
    }

    /// 마지막으로 관측한 스토어 리비전을 반환합니다.
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// 스토어 키를 트리 상대 경로 노드로 바꿉니다.
    fn node_from(&self, key: &str, value: &str) -> Node {
        let path = key
            .strip_prefix(&self.prefix)
            .unwrap_or(key)
            .trim_matches('/')
            .to_owned();
        Node {
            path,
            is_dir: false, // v3 키는 전부 리프
            value: value.to_owned(),
            source: Source::Etcd,
        }
    }

    /// 상대 경로를 스토어 키로 되돌립니다.
    fn absolute_key(&self, path: &str) -> String {
        format!("{}/{}", self.prefix, path)
    }

    /// 어댑터 경계 필터. `filter_routes`면 라우트 레코드를 버립니다.
    fn accept(&self, config: &Config) -> bool {
        if self.filter_routes && matches!(config, Config::Route { .. }) {
            info!(%config, "filtered etcd route");
            return false;
        }
        true
    }

    /// prefix 아래 전체를 읽어 초기 레코드 목록을 만듭니다.
    ///
    /// 스냅샷의 리비전을 기록해 두고, 이후 [`run`](Self::run)이 그
    /// 다음 리비전부터 워치를 엽니다. prefix가 비어 있으면 빈 목록을
    /// 돌려줍니다.
    pub async fn scan(&mut self) -> Result<Vec<Config>, StoreError> {
        let snapshot = self.store.scan(&self.prefix).await?;
        self.revision = snapshot.revision;

        let mut configs = Vec::new();
        for entry in &snapshot.entries {
            let node = self.node_from(&entry.key, &entry.value);
            match decode(&node) {
                Ok(Some(config)) => {
                    if self.accept(&config) {
                        debug!(key = %entry.key, %config, "scanned");
                        configs.push(config);
                    }
                }
                Ok(None) => {}
                // 스키마 에러는 해당 노드만 건너뜁니다.
                Err(err) => warn!(key = %entry.key, %err, "skipping node"),
            }
        }

        info!(
            configs = configs.len(),
            revision = self.revision,
            "tree scan complete"
        );
        Ok(configs)
    }

    /// 변경 워치 루프를 돌립니다.
    ///
    /// 이벤트는 순서대로 채널로 전달됩니다. 수신자가 사라지거나 워치를
    /// 다시 열 수 없으면 반환하며, 그 시점에 채널이 닫힙니다.
    pub async fn run(mut self, tx: mpsc::Sender<Event>) {
        loop {
            let start = self.revision + 1;
            let mut watcher = match self.store.watch(&self.prefix, start).await {
                Ok(watcher) => {
                    debug!(revision = start, "watch open");
                    watcher
                }
                Err(err) => {
                    error!(%err, "cannot reopen watch; closing event stream");
                    return;
                }
            };

            loop {
                match watcher.next_change().await {
                    Ok(Some(change)) => {
                        if self.forward(change, &tx).await.is_err() {
                            // 수신자가 사라짐 — 프로세스 종료 경로
                            return;
                        }
                    }
                    Ok(None) => {
                        warn!(revision = self.revision, "watch stream ended; restarting");
                        break;
                    }
                    Err(err) => {
                        warn!(%err, revision = self.revision, "watch error; restarting");
                        break;
                    }
                }
            }
        }
    }

    async fn forward(&mut self, change: TreeChange, tx: &mpsc::Sender<Event>) -> Result<(), ()> {
        self.revision = self.revision.max(change.revision);

        let action = match change.kind {
            ChangeKind::Put => Action::Set,
            ChangeKind::Delete => Action::Del,
        };

        let node = self.node_from(&change.key, &change.value);
        match decode(&node) {
            Ok(Some(config)) => {
                if self.accept(&config) {
                    let event = Event { action, config };
                    debug!(%event, revision = change.revision, "watched");
                    tx.send(event).await.map_err(|_| ())?;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(key = %change.key, %err, "skipping node"),
        }
        Ok(())
    }

    /// 레코드를 트리에 게시합니다 (만료 없음).
    pub async fn publish(&mut self, config: &Config) -> Result<(), StoreError> {
        let node = config.encode();
        if node.is_dir {
            return Err(StoreError::Publish {
                path: node.path,
                reason: "directory records cannot be published".to_owned(),
            });
        }
        let key = self.absolute_key(&node.path);
        info!(%key, value = %node.value, "publish");
        self.store.put(&key, &node.value).await
    }

    /// 게시했던 레코드를 철회합니다.
    pub async fn retract(&mut self, config: &Config) -> Result<(), StoreError> {
        let key = self.absolute_key(&config.path());
        info!(%key, "retract");
        self.store.delete(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::memory::MemoryTreeStore;
    use gantry_core::types::{RouteConfig, ServiceBackend};

    fn etcd_config(filter_routes: bool) -> EtcdConfig {
        EtcdConfig {
            prefix: "/gantry".to_owned(),
            filter_routes,
            ..Default::default()
        }
    }

    fn seeded_store() -> MemoryTreeStore {
        let store = MemoryTreeStore::new();
        store.seed(
            "/gantry/services/web/frontend",
            r#"{"ipv4": "10.0.1.1", "tcp": 80}"#,
        );
        store.seed(
            "/gantry/services/web/backends/web1",
            r#"{"ipv4": "10.1.0.1", "tcp": 80}"#,
        );
        store.seed("/gantry/routes/rack1", r#"{"prefix4": "10.1.0.0/24"}"#);
        store.seed("/gantry/bogus", "junk");
        store
    }

    #[tokio::test]
    async fn scan_decodes_and_records_revision() {
        let mut source = TreeSource::with_store(seeded_store(), &etcd_config(false));
        let configs = source.scan().await.unwrap();

        // bogus 노드는 로깅 후 건너뜀
        assert_eq!(configs.len(), 3);
        assert!(source.revision() > 0);
        assert!(
            configs
                .iter()
                .all(|config| *config.source() == Source::Etcd)
        );
        assert!(
            configs
                .iter()
                .any(|config| matches!(config, Config::Route { name, .. } if name == "rack1"))
        );
    }

    #[tokio::test]
    async fn scan_filters_etcd_routes_when_asked() {
        let mut source = TreeSource::with_store(seeded_store(), &etcd_config(true));
        let configs = source.scan().await.unwrap();

        assert_eq!(configs.len(), 2);
        assert!(
            !configs
                .iter()
                .any(|config| matches!(config, Config::Route { .. }))
        );
    }

    #[tokio::test]
    async fn empty_prefix_scans_empty() {
        let mut source = TreeSource::with_store(MemoryTreeStore::new(), &etcd_config(false));
        let configs = source.scan().await.unwrap();
        assert!(configs.is_empty());
    }

    async fn wait_for_watcher(store: &MemoryTreeStore) {
        while store.watcher_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn watch_maps_put_and_delete_to_events() {
        let store = seeded_store();
        let mut source = TreeSource::with_store(store.clone(), &etcd_config(false));
        source.scan().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(source.run(tx));
        wait_for_watcher(&store).await;

        // 워치가 열린 뒤의 라이브 변경: put 하나, delete(툼스톤) 하나
        let mut writer = store.clone();
        writer
            .put(
                "/gantry/services/web/backends/web2",
                r#"{"ipv4": "10.1.0.2", "tcp": 80}"#,
            )
            .await
            .unwrap();
        writer
            .delete("/gantry/services/web/backends/web1")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, Action::Set);
        match &event.config {
            Config::Backend {
                backend_name,
                backend,
                ..
            } => {
                assert_eq!(backend_name, "web2");
                assert_eq!(backend.ipv4, "10.1.0.2");
            }
            other => panic!("unexpected config: {other}"),
        }

        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, Action::Del);
        match &event.config {
            Config::Backend {
                backend_name,
                backend,
                ..
            } => {
                // 삭제는 기본값 페이로드의 툼스톤으로 옵니다
                assert_eq!(backend_name, "web1");
                assert_eq!(*backend, ServiceBackend::default());
            }
            other => panic!("unexpected config: {other}"),
        }

        // 수신자를 닫으면 루프가 종료됩니다
        drop(rx);
        let mut writer = store.clone();
        writer.put("/gantry/routes/poke", "{}").await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watch_skips_undecodable_nodes() {
        let store = MemoryTreeStore::new();
        let mut source = TreeSource::with_store(store.clone(), &etcd_config(false));
        source.scan().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(source.run(tx));
        wait_for_watcher(&store).await;

        let mut writer = store.clone();
        writer
            .put("/gantry/services/web/frontend", "not json")
            .await
            .unwrap();
        writer
            .put(
                "/gantry/services/web/frontend",
                r#"{"ipv4": "10.0.1.1", "tcp": 80}"#,
            )
            .await
            .unwrap();

        // 깨진 노드는 건너뛰고 다음 정상 노드만 도착
        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, Action::Set);
        assert!(matches!(&event.config, Config::Frontend { frontend, .. } if frontend.tcp == 80));

        drop(rx);
        let mut writer = store.clone();
        writer.put("/gantry/routes/poke", "{}").await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn route_record_publish_roundtrip() {
        let mut source = TreeSource::with_store(MemoryTreeStore::new(), &etcd_config(false));

        let record = Config::Route {
            name: "lab".to_owned(),
            route: RouteConfig {
                prefix4: "10.5.0.0/16".to_owned(),
                gateway4: "10.5.0.1".to_owned(),
                ipvs_method: "droute".to_owned(),
            },
            source: Source::Etcd,
        };

        source.publish(&record).await.unwrap();

        let configs = source.scan().await.unwrap();
        assert_eq!(configs.len(), 1);
        match &configs[0] {
            Config::Route { name, route, .. } => {
                assert_eq!(name, "lab");
                assert_eq!(route.prefix4, "10.5.0.0/16");
            }
            other => panic!("unexpected config: {other}"),
        }

        source.retract(&record).await.unwrap();
        assert!(source.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publishing_a_directory_record_is_rejected() {
        let mut source = TreeSource::with_store(MemoryTreeStore::new(), &etcd_config(false));
        let err = source
            .publish(&Config::Service {
                name: "web".to_owned(),
                source: Source::Etcd,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Publish { .. }));
    }
}
