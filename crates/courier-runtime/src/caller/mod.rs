//! Caller API.
//!
//! | Entry point | Args | Returns |
//! |-------------|------|---------|
//! | [`call`] | shrunk via registry | last `YIELD`, expanded, value-or-list |
//! | [`iterate`] | shrunk via registry | every `YIELD`, expanded |
//! | [`call_raw`] | wire form | last `YIELD` as sent |
//! | [`iterate_raw`] | wire form | every `YIELD` as sent |
//! | [`reserved`] | - | scope bound to a reservation |
//! | [`direct`] | - | scope resolving the target per call |
//!
//! The free functions use the ambient [`Caller`] (see
//! [`crate::with_caller`]). Calls made from inside a running handler use
//! that handler's assignation as `parent` unless [`CallOptions::parent`]
//! is set.

mod call;
mod port;
mod scope;
mod structure;
mod target;

pub use call::{call, call_raw, iterate, iterate_raw, CallOptions, Caller, Returns, ValueStream};
pub use port::{Definition, NodeRef, Port, PortKind};
pub use scope::{direct, reserved, reserved_with, DirectContext, ReservedContext};
pub use structure::{
    expand_returns, shrink_args, JsonRegistry, StructureCodec, StructureError, StructureRegistry,
};
pub use target::resolve_target;
