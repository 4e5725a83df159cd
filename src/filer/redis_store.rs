//! Redis-backed flat namespace: one string key per path

use crate::common::{encode_userinfo, Error, RedisConfig, Result};
use crate::filer::flat_namespace::FlatNamespaceStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect and verify the server answers
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let url = connection_url(config);
        let client = redis::Client::open(url.as_str()).map_err(storage_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(storage_err)?;

        tracing::info!(
            "Connected to redis at {} (database {})",
            config.server,
            config.database
        );
        Ok(Self { conn })
    }
}

#[async_trait]
impl FlatNamespaceStore for RedisStore {
    async fn put(&self, path: &str, fid: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(path, fid).await.map_err(storage_err)
    }

    async fn get(&self, path: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(path)
            .await
            .map_err(storage_err)
    }

    async fn delete(&self, path: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let (fid, _removed): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(path)
            .del(path)
            .query_async(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(fid)
    }
}

fn storage_err(e: redis::RedisError) -> Error {
    Error::Storage(format!("redis: {}", e))
}

/// `redis://[:password@]server/database`
pub fn connection_url(config: &RedisConfig) -> String {
    if config.password.is_empty() {
        format!("redis://{}/{}", config.server, config.database)
    } else {
        format!(
            "redis://:{}@{}/{}",
            encode_userinfo(&config.password),
            config.server,
            config.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let config = RedisConfig {
            server: "localhost:6379".into(),
            password: String::new(),
            database: 2,
        };
        assert_eq!(connection_url(&config), "redis://localhost:6379/2");

        let config = RedisConfig {
            password: "p@ss".into(),
            ..config
        };
        assert_eq!(connection_url(&config), "redis://:p%40ss@localhost:6379/2");
    }
}
