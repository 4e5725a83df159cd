//! Flat path → file id mapping over an external key-value store

use crate::common::{normalize_path, Error, Result};
use crate::filer::{DirectoryEntry, DirectoryId, FileEntry, Filer};
use async_trait::async_trait;

/// Minimal contract a networked store has to offer
#[async_trait]
pub trait FlatNamespaceStore: Send + Sync {
    async fn put(&self, path: &str, fid: &str) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Option<String>>;

    /// Remove `path`, returning the file id it held
    async fn delete(&self, path: &str) -> Result<Option<String>>;
}

/// [`Filer`] over a [`FlatNamespaceStore`]; no directory tree, no moves
pub struct FlatNamespaceFiler<S> {
    store: S,
}

impl<S: FlatNamespaceStore> FlatNamespaceFiler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: FlatNamespaceStore> Filer for FlatNamespaceFiler<S> {
    async fn create_file(&self, path: &str, fid: &str) -> Result<()> {
        self.store.put(&normalize_path(path), fid).await
    }

    async fn find_file(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        self.store
            .get(&path)
            .await?
            .ok_or(Error::NotFound(path))
    }

    async fn delete_file(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        self.store
            .delete(&path)
            .await?
            .ok_or(Error::NotFound(path))
    }

    async fn find_directory(&self, _path: &str) -> Result<DirectoryId> {
        Err(Error::UnsupportedOperation("find_directory"))
    }

    async fn list_directories(&self, _path: &str) -> Result<Vec<DirectoryEntry>> {
        Err(Error::UnsupportedOperation("list_directories"))
    }

    async fn list_files(
        &self,
        _path: &str,
        _last_file_name: &str,
        _limit: usize,
    ) -> Result<Vec<FileEntry>> {
        Err(Error::UnsupportedOperation("list_files"))
    }

    async fn delete_directory(&self, _path: &str, _recursive: bool) -> Result<()> {
        Err(Error::UnsupportedOperation("delete_directory"))
    }

    async fn move_path(&self, _from: &str, _to: &str) -> Result<()> {
        Err(Error::UnsupportedOperation("move"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store
    #[derive(Default)]
    pub(crate) struct MemStore {
        map: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl FlatNamespaceStore for MemStore {
        async fn put(&self, path: &str, fid: &str) -> Result<()> {
            self.map
                .lock()
                .unwrap()
                .insert(path.to_string(), fid.to_string());
            Ok(())
        }

        async fn get(&self, path: &str) -> Result<Option<String>> {
            Ok(self.map.lock().unwrap().get(path).cloned())
        }

        async fn delete(&self, path: &str) -> Result<Option<String>> {
            Ok(self.map.lock().unwrap().remove(path))
        }
    }

    #[tokio::test]
    async fn test_file_operations() {
        let filer = FlatNamespaceFiler::new(MemStore::default());

        filer.create_file("/a/b.txt", "4,0a").await.unwrap();
        assert_eq!(filer.find_file("a/b.txt").await.unwrap(), "4,0a");
        assert_eq!(filer.delete_file("/a/b.txt").await.unwrap(), "4,0a");
        assert!(matches!(
            filer.delete_file("/a/b.txt").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_unsupported() {
        let filer = FlatNamespaceFiler::new(MemStore::default());
        filer.create_file("/a", "1,01").await.unwrap();

        assert!(matches!(
            filer.move_path("/a", "/b").await,
            Err(Error::UnsupportedOperation(_))
        ));
        // The mapping is untouched
        assert_eq!(filer.find_file("/a").await.unwrap(), "1,01");
    }

    #[tokio::test]
    async fn test_directory_operations_unsupported() {
        let filer = FlatNamespaceFiler::new(MemStore::default());
        assert!(filer.list_directories("/").await.is_err());
        assert!(filer.list_files("/", "", 10).await.is_err());
        assert!(filer.delete_directory("/", true).await.is_err());
        assert!(filer.find_directory("/").await.is_err());
    }
}
