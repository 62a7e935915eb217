//! Scoped call styles: `reserved` and `direct`.
//!
//! ```text
//! reserved(node) ─► reserve ─► f(ctx) ─► unreserve (exactly once, any exit)
//! direct(node)   ─► f(ctx)            ─► (nothing)
//! ```
//!
//! Inside a reserved scope every call targets the reservation; inside a
//! direct scope each call resolves its target from the node.

use super::call::{CallOptions, Caller, ValueStream};
use super::port::NodeRef;
use crate::assigner::ReserveRequest;
use crate::context::current_caller;
use crate::error::AssignError;
use courier_event::Reservation;
use courier_types::ReservationId;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Releases a reservation at most once.
struct ReservationGuard {
    caller: Caller,
    id: ReservationId,
    released: AtomicBool,
}

impl ReservationGuard {
    async fn release(&self) -> Result<(), AssignError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(reservation = %self.id, "releasing reservation");
        self.caller.assigner().unreserve(&self.id).await
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let assigner = Arc::clone(self.caller.assigner());
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = assigner.unreserve(&id).await {
                        warn!(reservation = %id, error = %err, "unreserve failed");
                    }
                });
            }
            Err(_) => warn!(reservation = %id, "no runtime available, reservation leaked"),
        }
    }
}

/// Calls bound to one reservation.
///
/// Clones share the reservation. It is released by [`ReservedContext::exit`],
/// by the end of a [`reserved`] scope, or when the last clone is dropped.
#[derive(Clone)]
pub struct ReservedContext {
    node: NodeRef,
    reservation: Reservation,
    guard: Arc<ReservationGuard>,
}

impl ReservedContext {
    /// Reserves `node` through `caller`.
    ///
    /// # Errors
    ///
    /// - [`AssignError::InvalidTarget`] if the node has no id
    /// - the assigner's error if the reservation is refused
    pub async fn enter(
        caller: &Caller,
        node: NodeRef,
        request: ReserveRequest,
    ) -> Result<Self, AssignError> {
        let node_id = node.id.clone().ok_or_else(|| {
            AssignError::InvalidTarget(format!("node {} has no id to reserve", node.hash))
        })?;
        let request = ReserveRequest {
            hash: request.hash.or_else(|| Some(node.hash.clone())),
            ..request
        };
        let reservation = caller.assigner().reserve(node_id, request).await?;
        debug!(reservation = %reservation.id, "reserved scope entered");
        let guard = Arc::new(ReservationGuard {
            caller: caller.clone(),
            id: reservation.id.clone(),
            released: AtomicBool::new(false),
        });
        Ok(Self {
            node,
            reservation,
            guard,
        })
    }

    #[must_use]
    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub async fn call(&self, kwargs: Map<String, Value>) -> Result<Value, AssignError> {
        self.call_with(kwargs, CallOptions::default()).await
    }

    pub async fn call_with(
        &self,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Value, AssignError> {
        self.guard
            .caller
            .call_on(Some(&self.reservation.id), &self.node, kwargs, options)
            .await
    }

    pub async fn iterate(&self, kwargs: Map<String, Value>) -> Result<ValueStream, AssignError> {
        self.iterate_with(kwargs, CallOptions::default()).await
    }

    pub async fn iterate_with(
        &self,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<ValueStream, AssignError> {
        self.guard
            .caller
            .iterate_on(Some(&self.reservation.id), &self.node, kwargs, options)
            .await
    }

    /// Releases the reservation. Later calls on any clone still target the
    /// released reservation and will be refused by the broker.
    pub async fn exit(self) -> Result<(), AssignError> {
        self.guard.release().await
    }
}

impl std::fmt::Debug for ReservedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservedContext")
            .field("reservation", &self.reservation.id)
            .field("node", &self.node.hash)
            .finish()
    }
}

/// Runs `f` with a reservation on `node`, using the ambient caller.
///
/// The reservation is released exactly once after `f` finishes, whether it
/// succeeded or not. An error from `f` takes precedence over a release
/// error.
pub async fn reserved<F, Fut, T>(
    node: NodeRef,
    request: ReserveRequest,
    f: F,
) -> Result<T, AssignError>
where
    F: FnOnce(ReservedContext) -> Fut,
    Fut: Future<Output = Result<T, AssignError>>,
{
    let caller = current_caller()?;
    reserved_with(&caller, node, request, f).await
}

/// [`reserved`] with an explicit caller.
pub async fn reserved_with<F, Fut, T>(
    caller: &Caller,
    node: NodeRef,
    request: ReserveRequest,
    f: F,
) -> Result<T, AssignError>
where
    F: FnOnce(ReservedContext) -> Fut,
    Fut: Future<Output = Result<T, AssignError>>,
{
    let ctx = ReservedContext::enter(caller, node, request).await?;
    let guard = Arc::clone(&ctx.guard);
    let result = f(ctx).await;
    let released = guard.release().await;

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(reservation = %guard.id, error = %release_err, "unreserve failed after scope error");
            Err(err)
        }
    }
}

/// Calls on a node without holding a reservation.
#[derive(Debug, Clone)]
pub struct DirectContext {
    caller: Caller,
    node: NodeRef,
}

impl DirectContext {
    #[must_use]
    pub fn new(caller: Caller, node: NodeRef) -> Self {
        Self { caller, node }
    }

    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub async fn call(&self, kwargs: Map<String, Value>) -> Result<Value, AssignError> {
        self.call_with(kwargs, CallOptions::default()).await
    }

    pub async fn call_with(
        &self,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Value, AssignError> {
        self.caller.call_on(None, &self.node, kwargs, options).await
    }

    pub async fn iterate(&self, kwargs: Map<String, Value>) -> Result<ValueStream, AssignError> {
        self.iterate_with(kwargs, CallOptions::default()).await
    }

    pub async fn iterate_with(
        &self,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<ValueStream, AssignError> {
        self.caller.iterate_on(None, &self.node, kwargs, options).await
    }

    /// Leaves the scope. Nothing is released.
    pub fn exit(self) {}
}

/// Opens a direct scope on `node` with the ambient caller.
///
/// # Errors
///
/// Returns [`AssignError::NoContext`] outside [`crate::with_caller`].
pub fn direct(node: NodeRef) -> Result<DirectContext, AssignError> {
    Ok(DirectContext::new(current_caller()?, node))
}
