//! Remote assignment over a broker subscription.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Postman                         │
//! │  submit ──register──► Correlator ◄──deliver──┐       │
//! │     │                     │                  │       │
//! │     └─assign─► Transport  └─► AssignationStream      │
//! │                    │                         │       │
//! │                    └── watch ─► Subscription ┘       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! - [`Postman`]: public handle, implements [`crate::Assigner`]
//! - `Subscription`: background task reading the per-instance stream
//! - [`ReconnectPolicy`]: backoff used when the stream is lost
//!
//! # Failure handling
//!
//! | Situation | Effect |
//! |-----------|--------|
//! | first connect fails | `submit` returns the transport error |
//! | stream lost | reconnect with backoff; in-flight calls keep waiting |
//! | reconnect exhausted | every pending stream ends with `CRITICAL` |
//! | `close()` | every pending stream ends with `CANCELLED` |
//!
//! Events missed while disconnected are not replayed.

#[allow(clippy::module_inception)]
mod postman;
mod reconnect;
mod subscription;

pub use postman::{Postman, PostmanBuilder};
pub use reconnect::ReconnectPolicy;
