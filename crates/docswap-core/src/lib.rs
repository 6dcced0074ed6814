//! docswap-core: single-document web server with upload swap and health monitor
//!
//! - [`FileServer`] serves files from a root directory, `/` maps to the
//!   document slot, and `POST /upload` replaces that document
//! - [`Monitor`] probes a target on a fixed period and keeps rolling
//!   latency/availability statistics
//!
//! ```no_run
//! use docswap_core::{FileServer, Monitor, MonitorConfig, ServerConfig};
//!
//! # async fn run() -> docswap_core::Result<()> {
//! let server = FileServer::new(ServerConfig::new("./site").port(11000));
//! server.start().await?;
//!
//! let monitor = Monitor::new(MonitorConfig::default()).local_server(server.clone());
//! monitor.start().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod handlers;
pub mod mime;
pub mod monitor;
pub mod request;
pub mod response;
pub mod server;

#[cfg(test)]
mod test_util;

// Re-exports
pub use document::{DocumentSlot, SwapError, SwapStrategy};
pub use error::{Error, Result};
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};

pub use handlers::{StaticFiles, UploadError, UploadHandler};

pub use monitor::{
    CheckResult, HttpProbe, Monitor, MonitorConfig, Probe, ProbeError, ProbeResponse, StatsSnapshot,
    Target,
};
pub use server::{create_listen_socket, FileServer, ServerConfig};
