//! Lifecycle events and subscription messages.

use crate::error::EventError;
use crate::{Assignation, EventKind};
use courier_types::Reference;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One lifecycle event for one assignment.
///
/// `returns` is present on `YIELD`; `message` on error kinds and `LOG`;
/// `progress` on `PROGRESS`.
///
/// # Example
///
/// ```
/// use courier_event::{AssignationEvent, EventKind};
/// use courier_types::Reference;
///
/// let r = Reference::new();
/// let ev = AssignationEvent::yielded(r, vec![serde_json::json!(4)]);
/// assert_eq!(ev.kind, EventKind::Yield);
/// assert!(!ev.is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignationEvent {
    /// Correlation key of the originating call.
    pub reference: Reference,
    /// Lifecycle kind.
    pub kind: EventKind,
    /// Yielded values (present on `YIELD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Vec<Value>>,
    /// Human-readable message (error kinds and `LOG`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Progress percentage (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl AssignationEvent {
    /// Creates a bare event of the given kind.
    #[must_use]
    pub fn new(reference: Reference, kind: EventKind) -> Self {
        Self {
            reference,
            kind,
            returns: None,
            message: None,
            progress: None,
        }
    }

    /// `QUEUED` event.
    #[must_use]
    pub fn queued(reference: Reference) -> Self {
        Self::new(reference, EventKind::Queued)
    }

    /// `BOUND` event.
    #[must_use]
    pub fn bound(reference: Reference) -> Self {
        Self::new(reference, EventKind::Bound)
    }

    /// `ASSIGN` event.
    #[must_use]
    pub fn assigned(reference: Reference) -> Self {
        Self::new(reference, EventKind::Assign)
    }

    /// `YIELD` event carrying `returns`.
    #[must_use]
    pub fn yielded(reference: Reference, returns: Vec<Value>) -> Self {
        Self {
            returns: Some(returns),
            ..Self::new(reference, EventKind::Yield)
        }
    }

    /// `PROGRESS` event. Values above 100 are clamped.
    #[must_use]
    pub fn progress(reference: Reference, progress: u8, message: Option<String>) -> Self {
        Self {
            progress: Some(progress.min(100)),
            message,
            ..Self::new(reference, EventKind::Progress)
        }
    }

    /// `LOG` event.
    #[must_use]
    pub fn log(reference: Reference, message: impl Into<String>) -> Self {
        Self::with_message(reference, EventKind::Log, message)
    }

    /// `DONE` event.
    #[must_use]
    pub fn done(reference: Reference) -> Self {
        Self::new(reference, EventKind::Done)
    }

    /// `ERROR` event (retryable failure).
    #[must_use]
    pub fn error(reference: Reference, message: impl Into<String>) -> Self {
        Self::with_message(reference, EventKind::Error, message)
    }

    /// `CRITICAL` event (fatal failure).
    #[must_use]
    pub fn critical(reference: Reference, message: impl Into<String>) -> Self {
        Self::with_message(reference, EventKind::Critical, message)
    }

    /// `CANCELLED` event.
    #[must_use]
    pub fn cancelled(reference: Reference) -> Self {
        Self::new(reference, EventKind::Cancelled)
    }

    /// `INTERUPTED` event.
    #[must_use]
    pub fn interrupted(reference: Reference) -> Self {
        Self::new(reference, EventKind::Interupted)
    }

    fn with_message(reference: Reference, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(reference, kind)
        }
    }

    /// Returns `true` if this event ends the stream for its reference.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Returns the message, or a placeholder naming the kind.
    #[must_use]
    pub fn message_or_kind(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("assignation ended with {}", self.kind))
    }
}

/// One message from the broker's per-instance subscription.
///
/// Exactly one of `create` and `event` is expected to be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WatchMessage {
    /// A newly bound assignation (used to learn its server id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Assignation>,
    /// A lifecycle event for a registered reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<AssignationEvent>,
}

/// A [`WatchMessage`] after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchItem {
    /// Assignation creation notice.
    Create(Assignation),
    /// Lifecycle event.
    Event(AssignationEvent),
}

impl WatchMessage {
    /// Wraps a creation notice.
    #[must_use]
    pub fn create(assignation: Assignation) -> Self {
        Self {
            create: Some(assignation),
            event: None,
        }
    }

    /// Wraps a lifecycle event.
    #[must_use]
    pub fn event(event: AssignationEvent) -> Self {
        Self {
            create: None,
            event: Some(event),
        }
    }

    /// Validates that exactly one payload is present.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MalformedMessage`] when neither or both of
    /// `create` and `event` are set.
    pub fn classify(self) -> Result<WatchItem, EventError> {
        match (self.create, self.event) {
            (Some(create), None) => Ok(WatchItem::Create(create)),
            (None, Some(event)) => Ok(WatchItem::Event(event)),
            (None, None) => Err(EventError::MalformedMessage(
                "watch message carries neither create nor event".into(),
            )),
            (Some(_), Some(_)) => Err(EventError::MalformedMessage(
                "watch message carries both create and event".into(),
            )),
        }
    }
}
