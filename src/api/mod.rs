//! HTTP surface of the scan service.
//!
//! `scan_api_router()` returns a composable `Router`; `start_server_on()`
//! binds it and runs it in a background task until shut down.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::scan_api_router;
pub use server::{start_server_on, ScanApiServer};
pub use types::ApiContext;
