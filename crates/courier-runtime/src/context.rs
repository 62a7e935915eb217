//! Ambient runtime context.
//!
//! Two task-local slots flow implicitly through async code:
//!
//! | Slot | Set by | Read by |
//! |------|--------|---------|
//! | current caller | [`with_caller`] / [`with_assigner`] | free caller functions |
//! | current assignation | local actors, around each handler | parent propagation |
//!
//! Task-locals follow the future they are scoped around, so concurrent
//! calls on one runtime never see each other's context. Code spawned with
//! `tokio::spawn` starts with empty slots; wrap the spawned future again
//! if it needs the context.

use crate::assigner::Assigner;
use crate::caller::Caller;
use crate::error::AssignError;
use courier_event::Assignation;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

tokio::task_local! {
    static CURRENT_CALLER: Caller;
    static CURRENT_ASSIGNATION: Assignation;
}

/// Raised when [`current_assignation`] is called outside a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not within an assignation")]
pub struct NotWithinAnAssignation;

/// Runs `fut` with `caller` as the ambient caller.
pub async fn with_caller<F: Future>(caller: Caller, fut: F) -> F::Output {
    CURRENT_CALLER.scope(caller, fut).await
}

/// Runs `fut` with `assigner` as the ambient assigner, using the default
/// structure registry.
pub async fn with_assigner<F: Future>(assigner: Arc<dyn Assigner>, fut: F) -> F::Output {
    with_caller(Caller::new(assigner), fut).await
}

/// Returns the ambient caller.
///
/// # Errors
///
/// Returns [`AssignError::NoContext`] outside [`with_caller`].
pub fn current_caller() -> Result<Caller, AssignError> {
    CURRENT_CALLER
        .try_with(Caller::clone)
        .map_err(|_| AssignError::NoContext("no assigner is active in this context"))
}

/// Runs `fut` as the body of `assignation`.
pub async fn within_assignation<F: Future>(assignation: Assignation, fut: F) -> F::Output {
    CURRENT_ASSIGNATION.scope(assignation, fut).await
}

/// Returns the assignation whose handler is currently running.
///
/// # Errors
///
/// Returns [`NotWithinAnAssignation`] outside a handler.
pub fn current_assignation() -> Result<Assignation, NotWithinAnAssignation> {
    CURRENT_ASSIGNATION
        .try_with(Assignation::clone)
        .map_err(|_| NotWithinAnAssignation)
}
