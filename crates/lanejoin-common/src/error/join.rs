//! Join error types.
//!
//! Provides the error type for every failure the join core can report.

use std::fmt;
use thiserror::Error;

use super::fault::{EvalFault, FaultCode};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,

    // Buffer errors (0x0200 - 0x02FF)
    /// Destination buffer has no room for the next batch.
    DataStoreNoSpace = 0x0200,
    /// Scratch memory budget exceeded.
    ScratchExhausted = 0x0201,

    // Relation errors (0x0300 - 0x03FF)
    /// Relation descriptor is inconsistent.
    InvalidRelation = 0x0300,
    /// Too many inner relations.
    DepthLimit = 0x0301,

    // Evaluation errors (0x0600 - 0x06FF)
    /// Predicate, hash or projection evaluation failed.
    EvaluationFailed = 0x0600,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Buffer",
            0x03 => "Relation",
            0x06 => "Evaluation",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for lanejoin.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::error::{JoinError, JoinResult};
///
/// fn check(lanes: usize) -> JoinResult<()> {
///     if lanes == 0 {
///         return Err(JoinError::invalid_config("lanes_per_group must be positive"));
///     }
///     Ok(())
/// }
/// assert!(check(0).is_err());
/// ```
#[derive(Debug, Error)]
pub enum JoinError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Buffer Errors
    // ==========================================================================
    /// The destination buffer cannot hold the next batch of tuples.
    ///
    /// Non-fatal: re-invoke with a larger buffer or a narrower window.
    #[error(
        "destination buffer full: {rows} rows / {bytes} bytes do not fit in {capacity} bytes"
    )]
    DestinationFull {
        /// Rows the rejected batch asked for.
        rows: u32,
        /// Bytes the rejected batch asked for.
        bytes: u32,
        /// Total length of the destination buffer.
        capacity: u32,
    },

    /// The pseudo-stack arena would exceed the scratch budget.
    #[error("pseudo-stack needs {required} bytes, budget is {budget} bytes")]
    ScratchExhausted {
        /// Bytes required.
        required: usize,
        /// Configured budget.
        budget: usize,
    },

    // ==========================================================================
    // Relation Errors
    // ==========================================================================
    /// An inner relation descriptor is inconsistent.
    #[error("invalid relation at depth {depth}: {message}")]
    InvalidRelation {
        /// Depth of the offending relation.
        depth: usize,
        /// Error message.
        message: String,
    },

    /// More inner relations than supported.
    #[error("join depth {depth} exceeds maximum {max}")]
    DepthLimit {
        /// Requested depth.
        depth: usize,
        /// Maximum supported depth.
        max: usize,
    },

    // ==========================================================================
    // Evaluation Errors
    // ==========================================================================
    /// A predicate, hash or projection callback failed.
    #[error("evaluation failed at depth {depth} ({code}): {message}")]
    Evaluation {
        /// Depth at which the fault happened.
        depth: usize,
        /// Diagnostic code.
        code: FaultCode,
        /// Fault detail.
        message: String,
    },
}

impl JoinError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
            Self::Io { .. } => ErrorCode::Io,
            Self::DestinationFull { .. } => ErrorCode::DataStoreNoSpace,
            Self::ScratchExhausted { .. } => ErrorCode::ScratchExhausted,
            Self::InvalidRelation { .. } => ErrorCode::InvalidRelation,
            Self::DepthLimit { .. } => ErrorCode::DepthLimit,
            Self::Evaluation { .. } => ErrorCode::EvaluationFailed,
        }
    }

    /// Returns true if the caller may retry with different buffers or windows.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DestinationFull { .. })
    }

    /// Returns true if the failure invalidates the current invocation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Evaluation { .. } | Self::Internal { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid relation error.
    #[must_use]
    pub fn invalid_relation(depth: usize, message: impl Into<String>) -> Self {
        Self::InvalidRelation {
            depth,
            message: message.into(),
        }
    }

    /// Wraps a collaborator fault raised at `depth`.
    #[must_use]
    pub fn evaluation(depth: usize, fault: EvalFault) -> Self {
        Self::Evaluation {
            depth,
            code: fault.code,
            message: fault.message,
        }
    }
}

impl Clone for JoinError {
    fn clone(&self) -> Self {
        match self {
            Self::Io { source } => Self::Io {
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Internal { message } => Self::internal(message.clone()),
            Self::InvalidConfig { message } => Self::invalid_config(message.clone()),
            Self::DestinationFull {
                rows,
                bytes,
                capacity,
            } => Self::DestinationFull {
                rows: *rows,
                bytes: *bytes,
                capacity: *capacity,
            },
            Self::ScratchExhausted { required, budget } => Self::ScratchExhausted {
                required: *required,
                budget: *budget,
            },
            Self::InvalidRelation { depth, message } => {
                Self::invalid_relation(*depth, message.clone())
            }
            Self::DepthLimit { depth, max } => Self::DepthLimit {
                depth: *depth,
                max: *max,
            },
            Self::Evaluation {
                depth,
                code,
                message,
            } => Self::Evaluation {
                depth: *depth,
                code: *code,
                message: message.clone(),
            },
        }
    }
}
