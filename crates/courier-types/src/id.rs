//! Identifier types.
//!
//! [`Reference`] is UUID-based and minted by the client. Everything else is
//! an opaque, server-issued string wrapped in a newtype so the compiler
//! keeps an assignation id from being passed where a reservation id is
//! expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix marking assignation ids minted by the local executor.
const LOCAL_PREFIX: &str = "local-";

/// Client-generated correlation key for one assignment.
///
/// A reference exists before the broker has seen the request, which is
/// what allows a queue to be registered ahead of submission.
///
/// # Example
///
/// ```
/// use courier_types::Reference;
///
/// let r = Reference::new();
/// let parsed: Reference = r.to_string().parse().unwrap();
/// assert_eq!(r, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(pub Uuid);

impl Reference {
    /// Creates a new [`Reference`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Reference {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Declares an opaque string identifier issued by the broker.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the raw string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id! {
    /// Server-assigned identifier of an assignation.
    ///
    /// Known only once the broker acknowledges a submission; recorded
    /// against the [`Reference`] solely so the call can be cancelled.
    AssignationId
}

impl AssignationId {
    /// Mints an id for an assignment that never leaves the process.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns `true` if this id was minted by [`AssignationId::local`].
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }
}

string_id! {
    /// Server-issued identifier of a reservation.
    ReservationId
}

string_id! {
    /// Opaque identifier of the submitting client.
    ///
    /// Scopes the broker's event subscription to this client's assignations.
    InstanceId
}

string_id! {
    /// Server identifier of a node (a callable function signature).
    NodeId
}

string_id! {
    /// Content hash of a node; stable across servers.
    NodeHash
}

string_id! {
    /// Server identifier of a template (one implementation of a node).
    TemplateId
}

string_id! {
    /// Server identifier of an agent registration.
    AgentId
}
