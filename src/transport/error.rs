//! Setup error taxonomy.
//!
//! Connection setup walks through distinct stages, and each stage that can
//! fail gets its own variant so callers see exactly how far setup got.
//! Setup errors are always returned synchronously from the operation that
//! triggered them, never through a callback.

use std::io;

use thiserror::Error;

/// Errors from connection setup, one variant per stage.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The listener socket could not be created.
    #[error("failed to create listener socket: {0}")]
    SocketCreate(#[source] io::Error),

    /// Binding the listener to its port failed.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// Port the bind targeted.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Switching the bound socket into listening mode failed.
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        /// Port the listener was bound to.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Accepting the pending connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The outbound socket could not be constructed, or the peer address
    /// could not be parsed.
    #[error("failed to create outbound stream: {0}")]
    StreamCreate(#[source] io::Error),

    /// The connection attempt was rejected or timed out.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Peer address the attempt targeted.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The endpoint already holds, or already used up, its one connection.
    #[error("endpoint is already active")]
    AlreadyActive,
}
