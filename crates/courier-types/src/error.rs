//! Unified error interface.
//!
//! Every courier error type implements [`ErrorCode`] so callers can branch
//! on a stable machine-readable code and decide whether a retry makes sense.
//!
//! # Example
//!
//! ```
//! use courier_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LinkError {
//!     Dropped,
//!     Refused,
//! }
//!
//! impl ErrorCode for LinkError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Dropped => "LINK_DROPPED",
//!             Self::Refused => "LINK_REFUSED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Dropped)
//!     }
//! }
//!
//! assert_eq!(LinkError::Dropped.code(), "LINK_DROPPED");
//! assert!(!LinkError::Refused.is_recoverable());
//! ```

/// Machine-readable error classification.
///
/// # Code Format
///
/// - UPPER_SNAKE_CASE, e.g. `"ASSIGN_TIMEOUT"`
/// - Prefixed with the owning domain (`ASSIGN_`, `TRANSPORT_`, `EVENT_`, ...)
/// - Stable once published
///
/// # Recoverability
///
/// An error is recoverable when retrying the same operation may succeed:
/// a dropped connection, a timeout, or a function that reported a
/// retryable failure. Contract violations and critical function failures
/// are not.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code follows the naming convention.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use courier_types::{assert_error_code, ErrorCode};
///
/// struct Boom;
///
/// impl ErrorCode for Boom {
///     fn code(&self) -> &'static str { "DEMO_BOOM" }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_code(&Boom, "DEMO_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Asserts [`assert_error_code`] for every error in `errors`.
///
/// Pass one instance of each variant to cover a whole enum.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum ProbeError {
        Flaky,
        Broken,
    }

    impl ErrorCode for ProbeError {
        fn code(&self) -> &'static str {
            match self {
                Self::Flaky => "PROBE_FLAKY",
                Self::Broken => "PROBE_BROKEN",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    #[test]
    fn codes_and_recoverability() {
        assert_eq!(ProbeError::Flaky.code(), "PROBE_FLAKY");
        assert!(ProbeError::Flaky.is_recoverable());
        assert!(!ProbeError::Broken.is_recoverable());
    }

    #[test]
    fn all_variants_pass() {
        assert_error_codes(&[ProbeError::Flaky, ProbeError::Broken], "PROBE_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn wrong_prefix_panics() {
        assert_error_code(&ProbeError::Flaky, "OTHER_");
    }

    #[test]
    fn snake_case_rules() {
        assert!(is_upper_snake_case("ASSIGN_TIMEOUT"));
        assert!(is_upper_snake_case("E2"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("assign"));
        assert!(!is_upper_snake_case("_ASSIGN"));
        assert!(!is_upper_snake_case("ASSIGN_"));
        assert!(!is_upper_snake_case("ASSIGN__X"));
    }
}
