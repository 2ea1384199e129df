//! Crate-level error type.

use thiserror::Error;

use crate::endpoint::SendError;
use crate::message::FrameError;
use crate::transport::SetupError;

/// Top-level tether errors.
///
/// Each endpoint operation returns the narrow error of its own layer; this
/// aggregate exists for callers that funnel them into one `Result` type.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Connection setup failed.
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),

    /// An outbound message could not be sent.
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// A frame could not be encoded or decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O failure outside the coded setup stages.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
