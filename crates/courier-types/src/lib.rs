//! Core types for the courier assignment runtime.
//!
//! This crate provides the identifier types and the unified error-code
//! interface shared by every courier crate.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SDK Layer                              │
//! │  (SemVer stable, safe to depend on)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  courier-types   : IDs, ErrorCode             ◄── HERE       │
//! │  courier-event   : wire model (events, inputs, reservations) │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  courier-runtime : correlator, postman, local executor,     │
//! │                    caller API, config                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Frontend Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  courier-cli     : command-line interface                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! Two families of identifiers exist:
//!
//! - **Client-minted**: [`Reference`] is a UUID v4 created before the
//!   broker has seen a request, so that events can be correlated with
//!   the call that produced them.
//! - **Server-issued**: [`AssignationId`], [`ReservationId`], [`NodeId`],
//!   [`TemplateId`] and [`AgentId`] are opaque strings handed out by the
//!   broker. The client never interprets them.
//!
//! # Example
//!
//! ```
//! use courier_types::{AssignationId, NodeHash, Reference};
//!
//! let r1 = Reference::new();
//! let r2 = Reference::new();
//! assert_ne!(r1, r2);
//!
//! let id = AssignationId::from("42");
//! assert_eq!(id.as_str(), "42");
//!
//! let hash = NodeHash::from("3f2a");
//! assert_eq!(hash.to_string(), "3f2a");
//! ```

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{
    AgentId, AssignationId, InstanceId, NodeHash, NodeId, Reference, ReservationId, TemplateId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_unique() {
        let a = Reference::new();
        let b = Reference::new();
        assert_ne!(a, b);
    }

    #[test]
    fn server_ids_compare_by_value() {
        assert_eq!(AssignationId::from("1"), AssignationId::from("1"));
        assert_ne!(ReservationId::from("1"), ReservationId::from("2"));
    }

    #[test]
    fn local_assignation_ids_are_marked() {
        let id = AssignationId::local();
        assert!(id.is_local());
        assert!(!AssignationId::from("17").is_local());
    }
}
