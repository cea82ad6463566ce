//! Error taxonomy for the watchdog core and its collaborators.

use thiserror::Error;

/// Errors raised by the threshold store, the idle probe and the shutdown action.
#[derive(Debug, Error)]
pub enum Error {
    /// A proposed idle limit was negative, NaN or infinite.
    #[error("invalid idle limit: {0}")]
    InvalidLimit(f64),

    /// The platform idle-duration source could not be read.
    #[error("idle probe unavailable: {0}")]
    ProbeUnavailable(String),

    /// The power-off primitive failed or was denied.
    #[error("shutdown failed: {0}")]
    ShutdownFailed(String),

    /// Writing to the event journal failed.
    #[error("journal write failed: {0}")]
    Journal(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
