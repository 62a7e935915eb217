//! Assignation lifecycle kinds.
//!
//! # Lifecycle
//!
//! ```text
//!  [submit] → QUEUED → (BOUND) → ASSIGN → (PROGRESS | LOG | YIELD)* → terminal
//!
//!  terminal = DONE | ERROR | CRITICAL | CANCELLED | INTERUPTED
//! ```
//!
//! Transitions are observed, not driven, by the client. The only kinds a
//! client can provoke are `CANCELLED` (via `cancel`) and `INTERUPTED`
//! (via `interrupt`).

use serde::{Deserialize, Serialize};

/// The kind of an [`AssignationEvent`](crate::AssignationEvent).
///
/// Serialized in SCREAMING_SNAKE_CASE. The broker spells the interrupt
/// kind `INTERUPTED`; that spelling is kept on the wire.
///
/// | Kind | Terminal | Carries |
/// |------|----------|---------|
/// | `Queued` | No | - |
/// | `Bound` | No | - |
/// | `Assign` | No | - |
/// | `Progress` | No | `progress`, optional `message` |
/// | `Yield` | No | `returns` |
/// | `Log` | No | `message` |
/// | `Done` | Yes | - |
/// | `Error` | Yes | `message` |
/// | `Critical` | Yes | `message` |
/// | `Cancelled` | Yes | optional `message` |
/// | `Interupted` | Yes | optional `message` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Queued,
    Bound,
    Assign,
    Progress,
    Yield,
    Log,
    Done,
    Error,
    Critical,
    Cancelled,
    Interupted,
}

impl EventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [EventKind; 11] = [
        Self::Queued,
        Self::Bound,
        Self::Assign,
        Self::Progress,
        Self::Yield,
        Self::Log,
        Self::Done,
        Self::Error,
        Self::Critical,
        Self::Cancelled,
        Self::Interupted,
    ];

    /// Returns `true` if this kind ends the per-reference stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::Critical | Self::Cancelled | Self::Interupted
        )
    }

    /// Returns `true` for terminal kinds other than `Done`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && !matches!(self, Self::Done)
    }

    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Bound => "BOUND",
            Self::Assign => "ASSIGN",
            Self::Progress => "PROGRESS",
            Self::Yield => "YIELD",
            Self::Log => "LOG",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Cancelled => "CANCELLED",
            Self::Interupted => "INTERUPTED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_set() {
        let terminal: Vec<_> = EventKind::ALL
            .iter()
            .filter(|k| k.is_terminal())
            .copied()
            .collect();
        assert_eq!(
            terminal,
            vec![
                EventKind::Done,
                EventKind::Error,
                EventKind::Critical,
                EventKind::Cancelled,
                EventKind::Interupted,
            ]
        );
    }

    #[test]
    fn done_is_not_a_failure() {
        assert!(!EventKind::Done.is_failure());
        assert!(EventKind::Critical.is_failure());
        assert!(!EventKind::Yield.is_failure());
    }

    #[test]
    fn wire_names_match_serde() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).expect("serialize");
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn interrupt_keeps_broker_spelling() {
        let kind: EventKind = serde_json::from_str("\"INTERUPTED\"").expect("deserialize");
        assert_eq!(kind, EventKind::Interupted);
    }
}
