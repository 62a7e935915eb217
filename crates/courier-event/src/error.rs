//! Event layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EventError::MalformedMessage`] | `EVENT_MALFORMED_MESSAGE` | No |
//! | [`EventError::Decode`] | `EVENT_DECODE` | No |
//!
//! Neither is recoverable: a malformed broker message stays malformed.
//! The subscription logs and skips such messages instead of failing.

use courier_types::ErrorCode;
use thiserror::Error;

/// Error raised while interpreting broker messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A watch message violated the one-payload contract.
    #[error("malformed watch message: {0}")]
    MalformedMessage(String),

    /// A payload could not be decoded.
    #[error("failed to decode event: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage(_) => "EVENT_MALFORMED_MESSAGE",
            Self::Decode(_) => "EVENT_DECODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                EventError::MalformedMessage("x".into()),
                EventError::Decode("x".into()),
            ],
            "EVENT_",
        );
    }

    #[test]
    fn decode_from_serde() {
        let err: EventError = serde_json::from_str::<u8>("nope")
            .map_err(EventError::from)
            .unwrap_err();
        assert_eq!(err.code(), "EVENT_DECODE");
        assert!(!err.is_recoverable());
    }
}
