//! Courier Runtime - assignment runtime.
//!
//! Submits function invocations ("assignations") to a broker or to an
//! in-process actor and streams their lifecycle events back to the caller.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller API                             │
//! │  call / iterate / call_raw / iterate_raw, reserved, direct  │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ Arc<dyn Assigner>
//!              ┌─────────────────┴─────────────────┐
//!              ▼                                   ▼
//! ┌────────────────────────────┐    ┌────────────────────────────┐
//! │  Postman (remote)          │    │  LocalExecutor (in-proc)   │
//! │  Transport + subscription  │    │  Supervisor + Actor        │
//! └─────────────┬──────────────┘    └─────────────┬──────────────┘
//!               │ events                          │ events
//!               ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Correlator: reference → per-call queue                      │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                ▼
//!                       AssignationStream
//! ```
//!
//! # Modules
//!
//! ## [`correlator`] - Event Routing
//!
//! - [`Correlator`]: maps each reference to an in-order event queue and
//!   retires it at the first terminal event
//!
//! ## [`postman`] - Remote Assigner
//!
//! - [`Postman`]: submits through a [`Transport`], owns the per-instance
//!   subscription and reconnects with [`ReconnectPolicy`]
//!
//! ## [`local`] - Local Executor
//!
//! - [`LocalExecutor`]: runs assignments on an actor spawned by a
//!   [`Supervisor`]
//! - [`InProcessSupervisor`]: runs registered async functions in tasks
//!
//! ## [`caller`] - Caller API
//!
//! - [`Caller`]: shrinks arguments, resolves targets, expands returns
//! - [`reserved`] and [`direct`]: call scopes
//!
//! ## [`config`] - Configuration Management
//!
//! - [`CourierConfig`](config::CourierConfig): unified configuration
//! - [`ConfigLoader`](config::ConfigLoader): multi-source loader
//!
//! Configuration priority: Environment > Project > Global > Default
//!
//! # Example
//!
//! ```ignore
//! use courier_runtime::{with_caller, call, Caller, CallOptions, Postman};
//!
//! let postman = Postman::new(transport, "worker-1");
//! let caller = Caller::new(Arc::new(postman.clone()));
//!
//! let returns = with_caller(caller, async {
//!     call(&node, kwargs, CallOptions::default()).await
//! })
//! .await?;
//! postman.close().await;
//! ```

pub mod assigner;
pub mod caller;
pub mod config;
pub mod context;
pub mod correlator;
pub mod error;
pub mod local;
pub mod postman;
pub mod stream;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for convenience
pub use assigner::{AssignRequest, Assigner, ReserveRequest};
pub use caller::{
    call, call_raw, direct, iterate, iterate_raw, reserved, reserved_with, CallOptions, Caller,
    Definition, DirectContext, JsonRegistry, NodeRef, Port, PortKind, ReservedContext, Returns,
    StructureCodec, StructureError, StructureRegistry, ValueStream,
};
pub use config::{ConfigError, ConfigLoader, CourierConfig};
pub use context::{
    current_assignation, current_caller, with_assigner, with_caller, within_assignation,
    NotWithinAnAssignation,
};
pub use correlator::{Correlator, Delivery, EventReceiver};
pub use error::AssignError;
pub use local::{
    Actor, AssignationContext, EventSink, Function, FunctionError, FunctionRegistry,
    InProcessActor, InProcessSupervisor, LocalExecutor, Supervisor, Template,
};
pub use postman::{Postman, PostmanBuilder, ReconnectPolicy};
pub use stream::{AssignationStream, CancelAck, Dispatcher, YieldStream};
pub use transport::{Transport, TransportError, WatchStream};
