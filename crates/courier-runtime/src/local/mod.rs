//! Local execution of a single template.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  LocalExecutor                      │
//! │   call / iterate ──Assign──►  Actor ──events──┐     │
//! │   cancel ─────────Cancel──►    ▲              │     │
//! │                                │ spawn        ▼     │
//! │                           Supervisor     EventSink  │
//! │                                              │      │
//! │   AssignationStream ◄──── Correlator ◄───────┘      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The executor reuses the same [`crate::Correlator`] and
//! [`crate::AssignationStream`] as the remote path, so callers cannot tell
//! the two apart except for cancellation, which here waits for the actor
//! to confirm.
//!
//! [`InProcessSupervisor`] hosts plain async functions from a
//! [`FunctionRegistry`]; other supervisors (child processes, containers)
//! plug in through [`Supervisor`] and [`Actor`].

mod executor;
mod function;
mod in_process;
mod supervisor;

pub use executor::LocalExecutor;
pub use function::{AssignationContext, Function, FunctionError, FunctionFuture, FunctionRegistry};
pub use in_process::{InProcessActor, InProcessSupervisor};
pub use supervisor::{Actor, EventSink, Supervisor, Template};
