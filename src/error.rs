//! Error types for the click gate.
use crate::decision::Decision;
use crate::policy::PolicyError;
use crate::record::SubjectIdError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Boxed store error, erased so the gate does not carry the store's error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse error classes surfaced to the transport in [`crate::Decision::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing subject id; the store was not touched.
    Validation,
    /// Store read/write failure, timeout or unresolved write conflict. Safe to retry.
    Storage,
    /// Invalid policy configuration. Only raised at startup.
    PolicyMisconfiguration,
}

impl ErrorKind {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Storage)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::PolicyMisconfiguration => "policy",
        }
    }
}

/// Failures of a gate operation. None of them leave a partial write behind.
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    /// The subject id was rejected before any store access.
    #[error("invalid subject id: {0}")]
    InvalidSubject(#[from] SubjectIdError),
    /// The record store returned an error.
    #[error("record store failure: {0}")]
    Storage(#[source] BoxError),
    /// The record store did not answer in time.
    #[error("record store call timed out after {timeout:?}")]
    StoreTimeout {
        /// Configured per-call limit.
        timeout: Duration,
    },
    /// Every conditional write lost a race with a concurrent writer.
    #[error("record for '{subject}' changed concurrently on all {attempts} attempts")]
    Contention {
        /// Subject whose record kept changing.
        subject: String,
        /// Attempts made before giving up.
        attempts: usize,
    },
}

impl GateError {
    pub(crate) fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GateError::Storage(Box::new(err))
    }

    /// Error class for rendering.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::InvalidSubject(_) => ErrorKind::Validation,
            GateError::Storage(_) | GateError::StoreTimeout { .. } | GateError::Contention { .. } => {
                ErrorKind::Storage
            }
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Check if this error is due to a store timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GateError::StoreTimeout { .. })
    }

    /// Check if this error is due to exhausted write conflicts.
    pub fn is_contention(&self) -> bool {
        matches!(self, GateError::Contention { .. })
    }
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PolicyMisconfiguration
    }
}

/// Error returned by [`crate::ClickGateService`] around an inner service with error `E`.
#[derive(Debug)]
pub enum AdmissionError<E> {
    /// The gate did not admit the click; the inner service was not called.
    Rejected(Decision),
    /// The gate could not decide; the inner service was not called.
    Gate(GateError),
    /// The inner service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(decision) => write!(f, "click rejected ({})", decision.declaration()),
            Self::Gate(e) => write!(f, "click gate failure: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(_) => None,
            Self::Gate(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> AdmissionError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, Self::Gate(_))
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// The rejecting decision, if the gate refused the click.
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Self::Rejected(decision) => Some(decision),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
