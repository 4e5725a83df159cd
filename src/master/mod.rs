//! Master discovery and failover
//!
//! - [`MasterCell`]: the current master address shared with request handlers
//! - [`MasterRegistry`]: candidate masters with round-robin selection
//! - [`MasterSupervisor`]: bootstrap plus the health-check loop
//! - [`MasterClient`]: health check and discovery calls, reqwest-backed by default

pub mod cell;
pub mod client;
pub mod registry;
pub mod supervisor;

pub use cell::MasterCell;
pub use client::{ClusterStatus, HttpMasterClient, MasterClient};
pub use registry::MasterRegistry;
pub use supervisor::{ConnectionState, Iteration, MasterSupervisor};
