//! # weedfiler
//!
//! Connectivity core of a filer server in a distributed blob store:
//! - Master discovery with health checks and automatic failover
//! - Pluggable metadata backends (embedded sled, Cassandra, Redis)
//! - Per-operation access guards (IP whitelist, path roots, signed tokens)
//! - Short-lived tokens for file ids handed to volume servers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Filer server                │
//! │  HTTP: /status, /admin/mv, /admin/register│
//! │  ┌────────────┐   ┌───────────────────┐  │
//! │  │ GuardSet   │   │ MetadataBackend   │  │
//! │  └────────────┘   │ sled | cassandra  │  │
//! │                   │      | redis      │  │
//! │  ┌────────────┐   └───────────────────┘  │
//! │  │ MasterCell │◄── MasterSupervisor      │
//! │  └────────────┘        │ check/discover  │
//! └────────────────────────┼─────────────────┘
//!                          │ HTTP
//!            ┌─────────────┼─────────────┐
//!         master 1      master 2      master 3
//! ```
//!
//! ## Usage
//!
//! ```bash
//! weedfiler \
//!   --port 8888 \
//!   --master localhost:9333 \
//!   --dir ./filer-data
//! ```

pub mod common;
pub mod filer;
pub mod master;
pub mod security;
pub mod server;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use filer::{Filer, MetadataBackend};
pub use master::{MasterCell, MasterSupervisor};
pub use security::{GuardSet, TokenIssuer};
pub use server::FilerServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
