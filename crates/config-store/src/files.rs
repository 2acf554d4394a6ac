//! 로컬 디렉터리 소스 — 설정 트리의 1회 스캔
//!
//! 디렉터리 구조가 곧 설정 트리입니다. 디렉터리는 `is_dir` 노드
//! (와일드카드 마커)로, 일반 파일의 내용은 값으로 해석됩니다.
//! 닷파일은 건너뜁니다. 스캔 이후에는 조용합니다 (워치 없음).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use gantry_core::error::StoreError;
use gantry_core::event::{Config, Source};
use gantry_core::node::{Node, decode};

/// 로컬 디렉터리 설정 소스
pub struct FilesSource {
    root: PathBuf,
}

impl FilesSource {
    /// 스캔할 루트 디렉터리를 지정합니다.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 디렉터리 트리를 재귀적으로 읽어 레코드 목록을 만듭니다.
    ///
    /// 파일 이름은 정렬 순서로 방문하므로 결과가 결정적입니다.
    /// 스키마에 맞지 않는 노드는 로깅 후 건너뜁니다. I/O 에러는
    /// 스캔 전체를 실패시킵니다 (기동 시 치명적).
    pub fn scan(&self) -> Result<Vec<Config>, StoreError> {
        let mut configs = Vec::new();
        self.walk(&self.root, &mut configs)?;
        info!(root = %self.root.display(), configs = configs.len(), "files scan complete");
        Ok(configs)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<Config>) -> Result<(), StoreError> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|err| self.io_err(dir, &err))?
            .collect::<Result<_, _>>()
            .map_err(|err| self.io_err(dir, &err))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name();

            if name.to_string_lossy().starts_with('.') {
                debug!(path = %path.display(), "skipping dotfile");
                continue;
            }

            let file_type = entry.file_type().map_err(|err| self.io_err(&path, &err))?;

            if file_type.is_dir() {
                self.decode_into(&path, true, String::new(), out);
                self.walk(&path, out)?;
            } else if file_type.is_file() {
                let value =
                    fs::read_to_string(&path).map_err(|err| self.io_err(&path, &err))?;
                self.decode_into(&path, false, value, out);
            }
            // 심볼릭 링크 등은 무시
        }

        Ok(())
    }

    fn decode_into(&self, path: &Path, is_dir: bool, value: String, out: &mut Vec<Config>) {
        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let node = Node {
            path: relative,
            is_dir,
            value: value.trim_end().to_owned(),
            source: Source::File,
        };

        match decode(&node) {
            Ok(Some(config)) => {
                debug!(path = %path.display(), %config, "scanned");
                out.push(config);
            }
            Ok(None) => {}
            // 스키마 에러는 해당 노드만 건너뜁니다.
            Err(err) => warn!(path = %path.display(), %err, "skipping node"),
        }
    }

    fn io_err(&self, path: &Path, err: &std::io::Error) -> StoreError {
        StoreError::Scan {
            kind: "files".to_owned(),
            reason: format!("{}: {err}", path.display()),
        }
    }
}
