//! Common utilities and types shared across weedfiler

pub mod config;
pub mod error;
pub mod tracing_middleware;
pub mod utils;

pub use config::{
    BackendKind, CassandraConfig, Config, GuardConfig, RedisConfig, SupervisorConfig,
};
pub use error::{Error, Result};
pub use utils::{encode_userinfo, is_within, join_path, normalize_path, split_path, timestamp_now};
