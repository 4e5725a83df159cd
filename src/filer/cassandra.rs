//! Cassandra-backed flat namespace
//!
//! Expects a table created ahead of time:
//!
//! ```text
//! CREATE TABLE seaweed_files (
//!     path varchar,
//!     fids list<varchar>,
//!     PRIMARY KEY (path)
//! );
//! ```

use crate::common::{CassandraConfig, Error, Result};
use crate::filer::flat_namespace::FlatNamespaceStore;
use async_trait::async_trait;
use scylla::{Session, SessionBuilder};

const INSERT_FILE: &str = "INSERT INTO seaweed_files (path, fids) VALUES (?, ?)";
const SELECT_FILE: &str = "SELECT fids FROM seaweed_files WHERE path = ? LIMIT 1";
const DELETE_FILE: &str = "DELETE FROM seaweed_files WHERE path = ?";

pub struct CassandraStore {
    session: Session,
}

impl CassandraStore {
    pub async fn connect(config: &CassandraConfig) -> Result<Self> {
        let session = SessionBuilder::new()
            .known_node(&config.server)
            .use_keyspace(&config.keyspace, false)
            .build()
            .await
            .map_err(storage_err)?;

        tracing::info!(
            "Connected to cassandra at {} (keyspace {})",
            config.server,
            config.keyspace
        );
        Ok(Self { session })
    }
}

#[async_trait]
impl FlatNamespaceStore for CassandraStore {
    async fn put(&self, path: &str, fid: &str) -> Result<()> {
        self.session
            .query(INSERT_FILE, (path, vec![fid.to_string()]))
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<String>> {
        let result = self
            .session
            .query(SELECT_FILE, (path,))
            .await
            .map_err(storage_err)?;
        let row = result
            .maybe_first_row_typed::<(Option<Vec<String>>,)>()
            .map_err(storage_err)?;
        Ok(row
            .and_then(|(fids,)| fids)
            .and_then(|fids| fids.into_iter().next()))
    }

    async fn delete(&self, path: &str) -> Result<Option<String>> {
        let fid = self.get(path).await?;
        if fid.is_some() {
            self.session
                .query(DELETE_FILE, (path,))
                .await
                .map_err(storage_err)?;
        }
        Ok(fid)
    }
}

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("cassandra: {}", e))
}
