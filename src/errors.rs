//! Error taxonomy for the FXD core.
//!
//! Every fallible operation across the codec, WAL, graph, selector, view,
//! marker, patch, disk, and transaction layers returns [`FxdError`].
//! Codec/parser errors are returned to the caller, WAL checksum failures
//! are logged and the record dropped (never raised here), and
//! transactional `Busy`/`Conflict` failures are retried by the
//! transaction manager before ever reaching a caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FxdError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("exhausted: {0}")]
    Exhausted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("config error: {0}")]
    Config(String),
}

impl FxdError {
    /// Exit codes for a host CLI (out of core scope): 0 success,
    /// 1 unrecoverable, 2 validation, 3 I/O.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::InvalidFormat(_) => 2,
            Self::Io(_) => 3,
            _ => 1,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Conflict(_))
    }
}
