//! Evaluation faults raised by join collaborators.

use std::fmt;

/// Diagnostic code attached to an evaluation fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FaultCode {
    /// Arithmetic overflow while evaluating an expression.
    NumericOverflow = 1,
    /// Division by zero.
    DivisionByZero = 2,
    /// A datum had an unexpected type.
    TypeMismatch = 3,
    /// A value was outside the domain the expression accepts.
    InvalidValue = 4,
    /// The row needs re-evaluation outside the device (CPU re-check).
    CpuRecheck = 5,
    /// Any other failure inside generated code.
    Internal = 99,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A fault reported by a predicate, hash or projection callback.
///
/// The executor attaches the depth at which the fault happened and
/// surfaces it as [`JoinError::Evaluation`](super::JoinError::Evaluation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalFault {
    /// Diagnostic code.
    pub code: FaultCode,
    /// Human readable detail.
    pub message: String,
}

impl EvalFault {
    /// Creates a new fault.
    #[must_use]
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a type mismatch fault.
    #[must_use]
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(FaultCode::TypeMismatch, message)
    }

    /// Creates an internal fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultCode::Internal, message)
    }
}

impl fmt::Display for EvalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EvalFault {}
