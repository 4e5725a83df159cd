//! HTTP surface of the filer

pub mod filer_server;
pub mod http;

pub use filer_server::FilerServer;
pub use http::{create_router, FilerState};
