#![doc = include_str!("../README.md")]

pub mod files;
pub mod source;
pub mod tree;

// --- 주요 타입 re-export ---

pub use files::FilesSource;
pub use source::TreeSource;
pub use tree::{ChangeKind, EtcdTreeStore, TreeChange, TreeEntry, TreeSnapshot, TreeStore, TreeWatcher};
