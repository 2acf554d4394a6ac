//! 트리 스토어 추상화 — etcd v3 클라이언트와 테스트 구현
//!
//! [`TreeStore`] trait은 어댑터가 필요로 하는 etcd 연산만 노출합니다:
//! 리비전이 찍힌 prefix 스캔, 시작 리비전이 있는 prefix 워치, 그리고
//! 게시/철회를 위한 put/delete. 프로덕션 구현은 `etcd-client`를
//! 감싸고, 테스트는 같은 trait의 인메모리 구현을 사용합니다.

use std::future::Future;

use gantry_core::error::StoreError;

/// 스캔으로 읽은 단일 키/값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// 스토어 전체 키 (프리픽스 포함)
    pub key: String,
    /// 값 (UTF-8)
    pub value: String,
}

/// 한 시점의 트리 스냅샷
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    /// 스냅샷에 포함된 키/값 목록
    pub entries: Vec<TreeEntry>,
    /// 스냅샷의 스토어 리비전
    pub revision: i64,
}

/// 워치로 관측한 변경의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// 생성 또는 갱신
    Put,
    /// 삭제 또는 만료
    Delete,
}

/// 워치로 관측한 단일 변경
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    /// 변경 종류
    pub kind: ChangeKind,
    /// 스토어 전체 키
    pub key: String,
    /// 변경 후 값 (삭제면 빈 문자열 — 툼스톤)
    pub value: String,
    /// 이 변경의 리비전
    pub revision: i64,
}

/// 열린 워치 스트림
pub trait TreeWatcher: Send {
    /// 다음 변경을 기다립니다. `Ok(None)`은 스트림 종료를 뜻합니다.
    fn next_change(
        &mut self,
    ) -> impl Future<Output = Result<Option<TreeChange>, StoreError>> + Send;
}

/// 계층 키/값 스토어 클라이언트 추상화
pub trait TreeStore: Send {
    /// 이 스토어의 워치 스트림 타입
    type Watcher: TreeWatcher;

    /// prefix 아래 전체를 원자적 리비전과 함께 읽습니다.
    fn scan(
        &mut self,
        prefix: &str,
    ) -> impl Future<Output = Result<TreeSnapshot, StoreError>> + Send;

    /// `start_revision`부터의 변경을 관측하는 워치를 엽니다.
    fn watch(
        &mut self,
        prefix: &str,
        start_revision: i64,
    ) -> impl Future<Output = Result<Self::Watcher, StoreError>> + Send;

    /// 키에 값을 씁니다 (만료 없음).
    fn put(&mut self, key: &str, value: &str)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 키를 (비재귀적으로) 삭제합니다.
    fn delete(&mut self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// `etcd-client` 기반 프로덕션 구현
pub struct EtcdTreeStore {
    client: etcd_client::Client,
}

impl EtcdTreeStore {
    /// etcd 엔드포인트에 연결합니다.
    pub async fn connect(endpoints: &[String]) -> Result<Self, StoreError> {
        let client = etcd_client::Client::connect(endpoints, None)
            .await
            .map_err(|err| StoreError::Connect {
                kind: "etcd".to_owned(),
                reason: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn scan_err(err: etcd_client::Error) -> StoreError {
    StoreError::Scan {
        kind: "etcd".to_owned(),
        reason: err.to_string(),
    }
}

fn watch_err(err: etcd_client::Error) -> StoreError {
    StoreError::Watch {
        kind: "etcd".to_owned(),
        reason: err.to_string(),
    }
}

impl TreeStore for EtcdTreeStore {
    type Watcher = EtcdWatcher;

    async fn scan(&mut self, prefix: &str) -> Result<TreeSnapshot, StoreError> {
        let options = etcd_client::GetOptions::new().with_prefix();
        let resp = self
            .client
            .get(prefix, Some(options))
            .await
            .map_err(scan_err)?;

        let revision = resp.header().map(|h| h.revision()).unwrap_or(0);

        let mut entries = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv.key_str().map_err(scan_err)?.to_owned();
            let value = kv.value_str().map_err(scan_err)?.to_owned();
            entries.push(TreeEntry { key, value });
        }

        Ok(TreeSnapshot { entries, revision })
    }

    async fn watch(
        &mut self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<Self::Watcher, StoreError> {
        let options = etcd_client::WatchOptions::new()
            .with_prefix()
            .with_start_revision(start_revision);
        let (watcher, stream) = self
            .client
            .watch(prefix, Some(options))
            .await
            .map_err(watch_err)?;

        Ok(EtcdWatcher {
            _watcher: watcher,
            stream,
            pending: std::collections::VecDeque::new(),
        })
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.client
            .put(key, value, None)
            .await
            .map_err(|err| StoreError::Publish {
                path: key.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete(key, None)
            .await
            .map_err(|err| StoreError::Publish {
                path: key.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}

/// etcd 워치 스트림
///
/// 워치 응답 하나에 여러 이벤트가 실려 오므로, 남은 이벤트는 큐에
/// 두고 하나씩 돌려줍니다. `_watcher` 핸들을 잡고 있어야 서버 측
/// 워치가 취소되지 않습니다.
pub struct EtcdWatcher {
    _watcher: etcd_client::Watcher,
    stream: etcd_client::WatchStream,
    pending: std::collections::VecDeque<TreeChange>,
}

impl TreeWatcher for EtcdWatcher {
    async fn next_change(&mut self) -> Result<Option<TreeChange>, StoreError> {
        loop {
            if let Some(change) = self.pending.pop_front() {
                return Ok(Some(change));
            }

            let Some(resp) = self.stream.message().await.map_err(watch_err)? else {
                return Ok(None);
            };

            for event in resp.events() {
                let Some(kv) = event.kv() else {
                    continue;
                };
                let kind = match event.event_type() {
                    etcd_client::EventType::Put => ChangeKind::Put,
                    etcd_client::EventType::Delete => ChangeKind::Delete,
                };
                let key = kv.key_str().map_err(watch_err)?.to_owned();
                // 삭제 이벤트의 값은 비어 있음 (툼스톤)
                let value = kv.value_str().unwrap_or_default().to_owned();
                self.pending.push_back(TreeChange {
                    kind,
                    key,
                    value,
                    revision: kv.mod_revision(),
                });
            }
        }
    }
}
