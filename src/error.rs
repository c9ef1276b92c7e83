//! Error types for routing and bring-up operations.
//!
//! Every failure the driver can report maps onto one of a small number of
//! [`ErrorKind`]s. Validation failures (`InvalidArgument`, `Unsupported`) are
//! always returned before any state or hardware is touched; `Timeout` and
//! `Io` only come out of the bounded hardware handshakes (configuration load
//! and calibration DAC writes).

use std::fmt;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while bringing up or routing a sync module.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A caller-supplied name or value does not match anything legal.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was rejected.
        message: String,
    },

    /// The operation is not available on this kind of terminal.
    #[error("Operation '{operation}' not supported by terminal '{terminal}'")]
    Unsupported {
        /// Terminal the operation was attempted on.
        terminal: String,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// A bounded hardware wait ran out of retries.
    #[error("Timed out waiting for {waiting_for} after {attempts} attempts")]
    Timeout {
        /// Condition that never arrived.
        waiting_for: &'static str,
        /// Polls spent before giving up.
        attempts: u32,
    },

    /// The hardware reported an unexpected or error status.
    #[error("Hardware I/O error: {message}")]
    Io {
        /// Hardware state that was observed.
        message: String,
    },

    /// Storage for bring-up bookkeeping could not be allocated.
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Allocator report.
        message: String,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`SyncError::InvalidArgument`].
    InvalidArgument,
    /// See [`SyncError::Unsupported`].
    Unsupported,
    /// See [`SyncError::Timeout`].
    Timeout,
    /// See [`SyncError::Io`].
    Io,
    /// See [`SyncError::ResourceExhausted`].
    ResourceExhausted,
    /// See [`SyncError::Config`].
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Timeout => write!(f, "timeout"),
            Self::Io => write!(f, "I/O error"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl SyncError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io { .. } => ErrorKind::Io,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Check if this is a rejected name or value.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if the operation is unsupported on the target terminal.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Check if a hardware wait timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the hardware reported a bad status.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<figment::Error> for SyncError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for SyncError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::ResourceExhausted {
            message: err.to_string(),
        }
    }
}
