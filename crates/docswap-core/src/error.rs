//! Error types for docswap-core

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docswap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum Error {
    /// The document slot file is absent, the server refuses to start
    #[error("Document not found: {}", .0.display())]
    DocumentMissing(PathBuf),

    /// Invalid listen address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Could not bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}
