//! Metadata backends: the mapping from file paths to file ids
//!
//! Every backend implements [`Filer`]. The embedded store keeps a real
//! directory tree; the networked stores only hold a flat path → file id
//! mapping and reject directory operations with
//! [`Error::UnsupportedOperation`](crate::Error::UnsupportedOperation).

pub mod cassandra;
pub mod embedded;
pub mod flat_namespace;
pub mod redis_store;
pub mod selector;

use crate::common::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use embedded::EmbeddedFiler;
pub use flat_namespace::{FlatNamespaceFiler, FlatNamespaceStore};
pub use selector::{open_backend, select_backend, MetadataBackend};

/// Numeric id of a directory in the embedded store
pub type DirectoryId = u64;

/// A file in a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub fid: String,
}

/// A subdirectory in a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub id: DirectoryId,
}

/// Uniform metadata interface shared by all backends.
///
/// Implementations must be safe to call from many request handlers at once.
#[async_trait]
pub trait Filer: Send + Sync {
    /// Map `path` to `fid`, replacing any previous mapping
    async fn create_file(&self, path: &str, fid: &str) -> Result<()>;

    /// File id stored for `path`
    async fn find_file(&self, path: &str) -> Result<String>;

    /// Remove `path`, returning the file id it pointed to
    async fn delete_file(&self, path: &str) -> Result<String>;

    async fn find_directory(&self, path: &str) -> Result<DirectoryId>;

    async fn list_directories(&self, path: &str) -> Result<Vec<DirectoryEntry>>;

    /// Files in `path` sorted by name, starting after `last_file_name`
    async fn list_files(
        &self,
        path: &str,
        last_file_name: &str,
        limit: usize,
    ) -> Result<Vec<FileEntry>>;

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<()>;

    /// Move or rename a file or directory
    async fn move_path(&self, from: &str, to: &str) -> Result<()>;
}
