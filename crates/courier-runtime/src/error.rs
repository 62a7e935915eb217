//! Runtime layer errors.
//!
//! All errors implement [`ErrorCode`] for standardized handling.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`AssignError::Transport`] | `ASSIGN_TRANSPORT` | Depends on cause |
//! | [`AssignError::Postman`] | `ASSIGN_POSTMAN` | No |
//! | [`AssignError::Recoverable`] | `ASSIGN_RECOVERABLE` | Yes |
//! | [`AssignError::Critical`] | `ASSIGN_CRITICAL` | No |
//! | [`AssignError::Cancelled`] | `ASSIGN_CANCELLED` | No |
//! | [`AssignError::Interrupted`] | `ASSIGN_INTERRUPTED` | No |
//! | [`AssignError::Timeout`] | `ASSIGN_TIMEOUT` | Yes |
//! | [`AssignError::Structure`] | `ASSIGN_STRUCTURE` | No |
//! | [`AssignError::NoContext`] | `ASSIGN_NO_CONTEXT` | No |
//! | [`AssignError::InvalidTarget`] | `ASSIGN_INVALID_TARGET` | No |
//! | [`AssignError::Spawn`] | `ASSIGN_SPAWN` | No |
//! | [`AssignError::Unsupported`] | `ASSIGN_UNSUPPORTED` | No |
//!
//! # Terminal events
//!
//! Failed terminal events map onto variants one-to-one:
//!
//! ```text
//! ERROR       → Recoverable(message)
//! CRITICAL    → Critical(message)
//! CANCELLED   → Cancelled
//! INTERUPTED  → Interrupted
//! DONE        → (no error)
//! ```

use crate::caller::StructureError;
use crate::transport::TransportError;
use courier_event::{AssignationEvent, EventKind};
use courier_types::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Error surfaced to callers of the assignment runtime.
///
/// # Example
///
/// ```
/// use courier_runtime::AssignError;
/// use courier_types::ErrorCode;
///
/// let err = AssignError::Recoverable("division by zero".into());
/// assert_eq!(err.code(), "ASSIGN_RECOVERABLE");
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, Error)]
pub enum AssignError {
    /// The broker could not be reached or refused the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The postman is closed or its subscription is gone.
    #[error("postman error: {0}")]
    Postman(String),

    /// The function failed with an `ERROR` event.
    #[error("assignation failed: {0}")]
    Recoverable(String),

    /// The function or its host failed with a `CRITICAL` event.
    #[error("critical failure: {0}")]
    Critical(String),

    /// The assignation ended with `CANCELLED`.
    #[error("assignation was cancelled")]
    Cancelled,

    /// The assignation ended with `INTERUPTED`.
    #[error("assignation was interrupted")]
    Interrupted,

    /// No terminal event arrived in time.
    #[error("assignation timed out after {0:?}")]
    Timeout(Duration),

    /// Arguments or returns did not match the node definition.
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// A required ambient context is not set.
    #[error("{0}")]
    NoContext(&'static str),

    /// The call designator cannot be used for this operation.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A local actor failed to start.
    #[error("actor spawn failed: {0}")]
    Spawn(String),

    /// The assigner does not implement the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl AssignError {
    /// Maps a failed terminal event to its error.
    ///
    /// Returns `None` for `DONE` and for non-terminal kinds.
    #[must_use]
    pub fn from_terminal(event: &AssignationEvent) -> Option<Self> {
        match event.kind {
            EventKind::Error => Some(Self::Recoverable(event.message_or_kind())),
            EventKind::Critical => Some(Self::Critical(event.message_or_kind())),
            EventKind::Cancelled => Some(Self::Cancelled),
            EventKind::Interupted => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Returns `true` if the assignation was stopped by a cancel or interrupt.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Interrupted)
    }
}

impl ErrorCode for AssignError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "ASSIGN_TRANSPORT",
            Self::Postman(_) => "ASSIGN_POSTMAN",
            Self::Recoverable(_) => "ASSIGN_RECOVERABLE",
            Self::Critical(_) => "ASSIGN_CRITICAL",
            Self::Cancelled => "ASSIGN_CANCELLED",
            Self::Interrupted => "ASSIGN_INTERRUPTED",
            Self::Timeout(_) => "ASSIGN_TIMEOUT",
            Self::Structure(_) => "ASSIGN_STRUCTURE",
            Self::NoContext(_) => "ASSIGN_NO_CONTEXT",
            Self::InvalidTarget(_) => "ASSIGN_INVALID_TARGET",
            Self::Spawn(_) => "ASSIGN_SPAWN",
            Self::Unsupported(_) => "ASSIGN_UNSUPPORTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Recoverable(_) | Self::Timeout(_) => true,
            Self::Transport(err) => err.is_recoverable(),
            _ => false,
        }
    }
}
