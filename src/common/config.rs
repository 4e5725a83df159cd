//! Configuration for the filer server

use crate::common::{Error, Result};
use crate::security::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides (`WEEDFILER_PORT=8889`,
/// nested keys with `__` as in `WEEDFILER_REDIS__SERVER`)
pub const ENV_PREFIX: &str = "WEEDFILER";

/// Filer server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IP address to bind to
    #[serde(default = "default_ip")]
    pub ip: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seed master address (host:port)
    #[serde(default = "default_master")]
    pub master: String,

    /// Directory for the embedded metadata store
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Default collection for new files
    #[serde(default)]
    pub collection: String,

    /// Default replication policy string, e.g. "000"
    #[serde(default)]
    pub default_replication: String,

    /// Redirect reads to volume servers instead of proxying
    #[serde(default = "default_true")]
    pub redirect_on_read: bool,

    /// Turn off directory listings
    #[serde(default)]
    pub disable_dir_listing: bool,

    /// Largest request body accepted, in MB
    #[serde(default = "default_max_mb")]
    pub max_mb: u32,

    /// Shared secret used to sign file id tokens
    #[serde(default)]
    pub secret: String,

    /// Explicit metadata backend; `None` picks by which settings are present
    #[serde(default)]
    pub backend: Option<BackendKind>,

    #[serde(default)]
    pub cassandra: CassandraConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    /// Access guards keyed by operation kind
    #[serde(default)]
    pub guards: BTreeMap<OperationKind, GuardConfig>,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_master() -> String {
    "localhost:9333".to_string()
}
fn default_dir() -> PathBuf {
    PathBuf::from("./filer-data")
}
fn default_true() -> bool {
    true
}
fn default_max_mb() -> u32 {
    32
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            master: default_master(),
            dir: default_dir(),
            collection: String::new(),
            default_replication: String::new(),
            redirect_on_read: true,
            disable_dir_listing: false,
            max_mb: default_max_mb(),
            secret: String::new(),
            backend: None,
            cassandra: CassandraConfig::default(),
            redis: RedisConfig::default(),
            guards: BTreeMap::new(),
            supervisor: SupervisorConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Metadata backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// sled database under `dir`
    Embedded,
    /// Flat namespace in a Cassandra keyspace
    Cassandra,
    /// Flat namespace in a Redis database
    Redis,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Embedded => write!(f, "embedded"),
            BackendKind::Cassandra => write!(f, "cassandra"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "sled" => Ok(BackendKind::Embedded),
            "cassandra" => Ok(BackendKind::Cassandra),
            "redis" => Ok(BackendKind::Redis),
            other => Err(Error::InvalidConfig(format!("unknown backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CassandraConfig {
    /// Contact point, e.g. "localhost:9042"
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
}

fn default_keyspace() -> String {
    "seaweed".to_string()
}

impl CassandraConfig {
    pub fn is_configured(&self) -> bool {
        !self.server.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Address, e.g. "localhost:6379"
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: i64,
}

impl RedisConfig {
    pub fn is_configured(&self) -> bool {
        !self.server.is_empty()
    }
}

/// Per-operation access guard settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Allowed client IPs or CIDR ranges; empty allows everyone
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    /// Allowed path prefixes; empty allows every path
    #[serde(default)]
    pub root_whitelist: Vec<String>,
    /// Token secret; empty disables token checks
    #[serde(default)]
    pub secure_key: String,
}

/// Master connectivity timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Wait between bootstrap attempts
    #[serde(default = "default_bootstrap_retry")]
    pub bootstrap_retry_ms: u64,

    /// Base poll interval while connected; jittered up to twice this
    #[serde(default = "default_connected_poll")]
    pub connected_poll_ms: u64,

    /// Poll interval while disconnected
    #[serde(default = "default_disconnected_poll")]
    pub disconnected_poll_ms: u64,

    /// Candidates tried per iteration after the current master fails
    #[serde(default = "default_failover_attempts")]
    pub failover_attempts: usize,

    /// Timeout for health check and discovery requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_bootstrap_retry() -> u64 {
    3_000
}
fn default_connected_poll() -> u64 {
    10_000
}
fn default_disconnected_poll() -> u64 {
    2_500
}
fn default_failover_attempts() -> usize {
    4
}
fn default_request_timeout() -> u64 {
    5_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bootstrap_retry_ms: default_bootstrap_retry(),
            connected_poll_ms: default_connected_poll(),
            disconnected_poll_ms: default_disconnected_poll(),
            failover_attempts: default_failover_attempts(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl SupervisorConfig {
    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms)
    }

    pub fn connected_poll(&self) -> Duration {
        Duration::from_millis(self.connected_poll_ms)
    }

    pub fn disconnected_poll(&self) -> Duration {
        Duration::from_millis(self.disconnected_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load from an optional TOML file, then `WEEDFILER_*` environment variables.
    ///
    /// Without an explicit path, `weedfiler.toml` in the working directory is
    /// read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("weedfiler").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        settings
            .try_deserialize::<Config>()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Address the HTTP server listens on
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Settings for one operation kind; missing entries are fully open
    pub fn guard(&self, kind: OperationKind) -> GuardConfig {
        self.guards.get(&kind).cloned().unwrap_or_default()
    }

    /// Decide which metadata backend this configuration selects.
    ///
    /// An explicit `backend` must have its connection settings present.
    /// Otherwise Cassandra wins over Redis, and Redis over the embedded store.
    pub fn backend_kind(&self) -> Result<BackendKind> {
        match self.backend {
            Some(BackendKind::Cassandra) if !self.cassandra.is_configured() => Err(
                Error::InvalidConfig("backend 'cassandra' requires cassandra.server".into()),
            ),
            Some(BackendKind::Redis) if !self.redis.is_configured() => Err(
                Error::InvalidConfig("backend 'redis' requires redis.server".into()),
            ),
            Some(kind) => Ok(kind),
            None => {
                if self.cassandra.is_configured() {
                    if self.redis.is_configured() {
                        tracing::warn!(
                            "Both cassandra and redis are configured, using cassandra ({})",
                            self.cassandra.server
                        );
                    }
                    Ok(BackendKind::Cassandra)
                } else if self.redis.is_configured() {
                    Ok(BackendKind::Redis)
                } else {
                    Ok(BackendKind::Embedded)
                }
            }
        }
    }

    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<BackendKind> {
        if self.master.trim().is_empty() {
            return Err(Error::InvalidConfig("master address is empty".into()));
        }
        if self.supervisor.failover_attempts == 0 {
            return Err(Error::InvalidConfig(
                "supervisor.failover_attempts must be at least 1".into(),
            ));
        }
        let kind = self.backend_kind()?;
        if kind == BackendKind::Embedded && self.dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("dir is empty".into()));
        }
        Ok(kind)
    }
}
