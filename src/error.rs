//! Error types and error handling strategy for Syncopate.
//!
//! This module defines the core error types used throughout the toolkit.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Panics inside user callables are isolated and converted to
//!   [`ErrorKind::Captured`] errors; they never unwind a pool thread
//! - Timeouts are not errors: a timed-out wait transitions the result
//!   cell to the cancelled terminal state instead
//! - Rate-limit rejection is an expected outcome, classified transient
//!   so retry logic can treat it as backpressure
//!
//! # Error Categories
//!
//! - **Promise**: result-cell resolution violations (double set, set
//!   after cancel)
//! - **Task**: querying a cancelled task
//! - **Admission**: rate-limiter rejection
//! - **User**: errors originating inside user-supplied callables
//! - **Internal**: toolkit bugs and invalid states
//!
//! # Recovery Classification
//!
//! All errors can be classified by [`Recoverability`]:
//! - `Transient`: temporary failure, safe to retry
//! - `Permanent`: unrecoverable, do not retry
//! - `Unknown`: recoverability depends on context

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Promise / result cell ===
    /// The result cell was already resolved with a value or error.
    AlreadySatisfied,
    /// Resolution was attempted after the cell was cancelled.
    Cancelled,

    // === Task ===
    /// The task was cancelled before it could produce a value.
    TaskCancelled,

    // === Admission control ===
    /// The rate limiter rejected the request (window full).
    AdmissionRejected,

    // === User ===
    /// A user-supplied callable panicked; the payload is carried in the
    /// error message.
    Captured,

    // === Internal / state machine ===
    /// Internal toolkit error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadySatisfied | Self::Cancelled => ErrorCategory::Promise,
            Self::TaskCancelled => ErrorCategory::Task,
            Self::AdmissionRejected => ErrorCategory::Admission,
            Self::Captured => ErrorCategory::User,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    ///
    /// This helps retry logic decide whether to attempt recovery.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            // Transient: the window rolls over, a later attempt may be admitted
            Self::AdmissionRejected => Recoverability::Transient,

            // Permanent: terminal cell states never change
            Self::AlreadySatisfied | Self::Cancelled | Self::TaskCancelled | Self::Internal => {
                Recoverability::Permanent
            }

            // Context-dependent: whatever the user callable did may or may
            // not happen again
            Self::Captured => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AlreadySatisfied => "promise already satisfied",
            Self::Cancelled => "promise cancelled",
            Self::TaskCancelled => "task cancelled",
            Self::AdmissionRejected => "admission rejected by rate limiter",
            Self::Captured => "user callable failed",
            Self::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Result-cell resolution failures.
    Promise,
    /// Task lifecycle failures.
    Task,
    /// Admission-control rejections.
    Admission,
    /// User-originated errors.
    User,
    /// Internal toolkit errors.
    Internal,
}

/// The main error type for Syncopate operations.
///
/// Errors are cheap to clone: a consumer that calls `get()` on a failed
/// future repeatedly receives an equivalent error on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates an error carrying the payload of a caught panic.
    #[must_use]
    pub fn captured(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(ErrorKind::Captured).with_message(message)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the attached message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error represents cancellation of the promise
    /// or its task.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::TaskCancelled)
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}
