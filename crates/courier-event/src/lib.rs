//! Wire model for the courier assignment runtime.
//!
//! This crate describes everything that crosses the boundary between the
//! client and the broker (or a local actor):
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | [`AssignInput`] | client → broker | Submit an assignment |
//! | [`ReserveInput`] | client → broker | Hold an implementation |
//! | [`EnsureAgentInput`] | client → broker | Register this client |
//! | [`WatchMessage`] | broker → client | Subscription traffic |
//! | [`AssignationEvent`] | broker/actor → client | Lifecycle event |
//! | [`ActorMessage`] | client → local actor | Assign / cancel |
//!
//! # Event Flow
//!
//! ```text
//! caller ──AssignInput──► broker
//!   ▲                        │
//!   │                 WatchMessage { create | event }
//!   │                        ▼
//!   └──── per-reference queue ◄── correlator
//! ```
//!
//! Events for one reference arrive in broker order and end with exactly
//! one terminal kind (see [`EventKind::is_terminal`]).
//!
//! # Usage
//!
//! ```
//! use courier_event::{AssignationEvent, EventKind, WatchItem, WatchMessage};
//! use courier_types::Reference;
//!
//! let reference = Reference::new();
//! let msg = WatchMessage::event(AssignationEvent::done(reference));
//!
//! match msg.classify().unwrap() {
//!     WatchItem::Event(ev) => assert_eq!(ev.kind, EventKind::Done),
//!     WatchItem::Create(_) => unreachable!(),
//! }
//! ```

mod assignation;
mod error;
mod event;
mod kind;
mod message;
mod reservation;

pub use assignation::{AssignFlags, AssignInput, Assignation, Hook, HookKind, Target};
pub use error::EventError;
pub use event::{AssignationEvent, WatchItem, WatchMessage};
pub use kind::EventKind;
pub use message::{ActorMessage, Assign};
pub use reservation::{
    Agent, Binds, EnsureAgentInput, Reservation, ReservationStatus, ReserveInput,
};
