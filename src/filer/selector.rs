//! Startup selection of the metadata backend

use crate::common::{BackendKind, Config, Error, Result};
use crate::filer::cassandra::CassandraStore;
use crate::filer::embedded::EmbeddedFiler;
use crate::filer::flat_namespace::FlatNamespaceFiler;
use crate::filer::redis_store::RedisStore;
use crate::filer::Filer;
use std::sync::Arc;

/// The one metadata backend this process serves from
#[derive(Clone)]
pub enum MetadataBackend {
    /// sled store with a real directory tree and admin operations
    Embedded(Arc<EmbeddedFiler>),
    /// Flat namespace on Cassandra or Redis
    Networked {
        kind: BackendKind,
        filer: Arc<dyn Filer>,
    },
}

impl MetadataBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            MetadataBackend::Embedded(_) => BackendKind::Embedded,
            MetadataBackend::Networked { kind, .. } => *kind,
        }
    }

    /// Uniform handle for request handlers
    pub fn filer(&self) -> Arc<dyn Filer> {
        match self {
            MetadataBackend::Embedded(filer) => filer.clone(),
            MetadataBackend::Networked { filer, .. } => filer.clone(),
        }
    }

    /// Whether the move and register admin routes are served
    pub fn supports_admin(&self) -> bool {
        matches!(self, MetadataBackend::Embedded(_))
    }

    /// Persist buffered writes before shutdown
    pub fn flush(&self) -> Result<()> {
        match self {
            MetadataBackend::Embedded(filer) => filer.flush(),
            MetadataBackend::Networked { .. } => Ok(()),
        }
    }
}

impl std::fmt::Debug for MetadataBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MetadataBackend({})", self.kind())
    }
}

/// Construct the backend `kind` from `config`.
///
/// Any failure is reported as `BackendConstructionFailed`; the caller is
/// expected to abort startup.
pub async fn open_backend(config: &Config, kind: BackendKind) -> Result<MetadataBackend> {
    tracing::info!("Opening {} metadata backend", kind);
    match kind {
        BackendKind::Cassandra => {
            let store = CassandraStore::connect(&config.cassandra).await.map_err(|e| {
                Error::BackendConstructionFailed(format!(
                    "cannot connect to cassandra server {} with keyspace {}: {}",
                    config.cassandra.server, config.cassandra.keyspace, e
                ))
            })?;
            Ok(MetadataBackend::Networked {
                kind,
                filer: Arc::new(FlatNamespaceFiler::new(store)),
            })
        }
        BackendKind::Redis => {
            let store = RedisStore::connect(&config.redis).await.map_err(|e| {
                Error::BackendConstructionFailed(format!(
                    "cannot connect to redis server {}: {}",
                    config.redis.server, e
                ))
            })?;
            Ok(MetadataBackend::Networked {
                kind,
                filer: Arc::new(FlatNamespaceFiler::new(store)),
            })
        }
        BackendKind::Embedded => {
            let filer = EmbeddedFiler::open(&config.dir).map_err(|e| {
                Error::BackendConstructionFailed(format!(
                    "cannot start filer in dir {}: {}",
                    config.dir.display(),
                    e
                ))
            })?;
            Ok(MetadataBackend::Embedded(Arc::new(filer)))
        }
    }
}

/// Resolve the backend kind from `config` and construct it
pub async fn select_backend(config: &Config) -> Result<MetadataBackend> {
    let kind = config.backend_kind()?;
    open_backend(config, kind).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filer::flat_namespace::tests::MemStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_embedded_selected_by_default() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            dir: dir.path().join("meta"),
            ..Default::default()
        };

        let backend = select_backend(&config).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Embedded);
        assert!(backend.supports_admin());

        let filer = backend.filer();
        filer.create_file("/x", "1,01").await.unwrap();
        filer.move_path("/x", "/y").await.unwrap();
        assert_eq!(filer.find_file("/y").await.unwrap(), "1,01");
        backend.flush().unwrap();
    }

    #[tokio::test]
    async fn test_embedded_open_failure_is_construction_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = Config {
            dir: blocker.join("meta"),
            ..Default::default()
        };
        assert!(matches!(
            select_backend(&config).await,
            Err(Error::BackendConstructionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_networked_backend_has_no_admin() {
        let backend = MetadataBackend::Networked {
            kind: BackendKind::Redis,
            filer: Arc::new(FlatNamespaceFiler::new(MemStore::default())),
        };
        assert!(!backend.supports_admin());
        assert!(matches!(
            backend.filer().move_path("/a", "/b").await,
            Err(Error::UnsupportedOperation(_))
        ));
        backend.flush().unwrap();
    }
}
