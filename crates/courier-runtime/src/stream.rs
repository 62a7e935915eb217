//! Consumer side of one assignment.
//!
//! [`AssignationStream`] wraps the per-reference queue handed out by the
//! [`Correlator`] and turns lifecycle events into a [`Stream`]:
//!
//! | Event | Item |
//! |-------|------|
//! | non-terminal, `DONE` | `Ok(event)` |
//! | `ERROR` | `Err(AssignError::Recoverable)` |
//! | `CRITICAL` | `Err(AssignError::Critical)` |
//! | `CANCELLED` | `Err(AssignError::Cancelled)` |
//! | `INTERUPTED` | `Err(AssignError::Interrupted)` |
//!
//! The stream ends right after the terminal item.
//!
//! # Cancellation
//!
//! Dropping an unfinished stream cancels the assignation: the cancel is
//! spawned from `Drop` before the drop returns. [`AssignationStream::cancel`]
//! does the same but awaits the outcome. Both go through the
//! [`Dispatcher`] of whoever created the stream (broker or local actor).

use crate::correlator::{Correlator, EventReceiver};
use crate::error::AssignError;
use async_trait::async_trait;
use courier_event::{AssignationEvent, EventKind};
use courier_types::{AssignationId, Reference};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

/// Stream of `YIELD` payloads.
pub type YieldStream = BoxStream<'static, Result<Vec<Value>, AssignError>>;

/// Issues cancel and interrupt requests for assignations.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Requests cancellation of `assignation`.
    ///
    /// `ack` still holds the assignation's queue when
    /// [`Dispatcher::awaits_acknowledgement`] is `true`; the entry is
    /// unregistered when `ack` is dropped.
    async fn cancel(&self, assignation: &AssignationId, ack: CancelAck) -> Result<(), AssignError>;

    /// Requests an interrupt of `assignation`.
    async fn interrupt(&self, assignation: &AssignationId) -> Result<(), AssignError>;

    /// Whether cancellation waits for the assignation to confirm.
    ///
    /// When `false` the queue is unregistered before the cancel is sent.
    fn awaits_acknowledgement(&self) -> bool {
        false
    }
}

/// Keeps a cancelled assignation's queue alive until the cancel is confirmed.
///
/// Dropping the ack unregisters the reference.
pub struct CancelAck {
    reference: Reference,
    events: EventReceiver,
    correlator: Arc<Correlator>,
}

impl CancelAck {
    fn new(reference: Reference, events: EventReceiver, correlator: Arc<Correlator>) -> Self {
        Self {
            reference,
            events,
            correlator,
        }
    }

    /// Waits up to `grace` for any terminal event.
    ///
    /// Returns the terminal kind, or `None` if nothing arrived in time.
    pub async fn wait_terminal(&mut self, grace: Duration) -> Option<EventKind> {
        let wait = async {
            while let Some(event) = self.events.recv().await {
                if event.is_terminal() {
                    return Some(event.kind);
                }
            }
            None
        };
        tokio::time::timeout(grace, wait).await.ok().flatten()
    }

    /// Reference whose queue this ack holds.
    #[must_use]
    pub fn reference(&self) -> Reference {
        self.reference
    }
}

impl Drop for CancelAck {
    fn drop(&mut self) {
        self.correlator.unregister(&self.reference);
    }
}

/// Event stream of one in-flight assignment.
///
/// # Example
///
/// ```ignore
/// let mut stream = postman.submit(request).await?;
/// while let Some(item) = stream.next().await {
///     let event = item?;
///     println!("{}", event.kind);
/// }
/// ```
pub struct AssignationStream {
    reference: Reference,
    assignation: AssignationId,
    events: Option<EventReceiver>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<dyn Dispatcher>,
    deadline: Option<(Duration, Pin<Box<Sleep>>)>,
}

impl AssignationStream {
    /// Wraps a registered queue.
    ///
    /// `events` must be the receiver returned by `correlator.register(reference)`.
    #[must_use]
    pub fn new(
        reference: Reference,
        assignation: AssignationId,
        events: EventReceiver,
        correlator: Arc<Correlator>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            reference,
            assignation,
            events: Some(events),
            correlator,
            dispatcher,
            deadline: None,
        }
    }

    /// Ends the stream with [`AssignError::Timeout`] if no terminal event
    /// arrives within `timeout`. The assignation is cancelled on expiry.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let sleep = tokio::time::sleep_until(Instant::now() + timeout);
        self.deadline = Some((timeout, Box::pin(sleep)));
        self
    }

    /// Client correlation key.
    #[must_use]
    pub fn reference(&self) -> Reference {
        self.reference
    }

    /// Server-assigned id.
    #[must_use]
    pub fn assignation(&self) -> &AssignationId {
        &self.assignation
    }

    /// Returns `true` once the terminal item was produced or the stream
    /// was cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.events.is_none()
    }

    /// Cancels the assignation and waits for the dispatcher to finish.
    ///
    /// A no-op on a finished stream.
    pub async fn cancel(mut self) -> Result<(), AssignError> {
        let Some(ack) = self.detach() else {
            return Ok(());
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        dispatcher.cancel(&self.assignation, ack).await
    }

    /// Requests an interrupt. The stream keeps running and will end with
    /// [`AssignError::Interrupted`] once the assignation confirms.
    pub async fn interrupt(&self) -> Result<(), AssignError> {
        self.dispatcher.interrupt(&self.assignation).await
    }

    /// Consumes the stream and returns the last `YIELD` payload.
    ///
    /// Returns an empty list when the assignation finished without
    /// yielding.
    pub async fn returns(mut self) -> Result<Vec<Value>, AssignError> {
        let mut last = Vec::new();
        while let Some(item) = self.next().await {
            let event = item?;
            if event.kind == EventKind::Yield {
                last = event.returns.unwrap_or_default();
            }
        }
        Ok(last)
    }

    /// Converts the stream into a stream of `YIELD` payloads.
    ///
    /// Other non-terminal events are skipped. Errors are passed through.
    #[must_use]
    pub fn into_yields(self) -> YieldStream {
        self.filter_map(|item| async move {
            match item {
                Ok(event) if event.kind == EventKind::Yield => {
                    Some(Ok(event.returns.unwrap_or_default()))
                }
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            }
        })
        .boxed()
    }

    /// Takes the queue out of an unfinished stream and prepares it for
    /// cancellation.
    fn detach(&mut self) -> Option<CancelAck> {
        let events = self.events.take()?;
        self.deadline = None;
        if !self.dispatcher.awaits_acknowledgement() {
            self.correlator.unregister(&self.reference);
        }
        Some(CancelAck::new(
            self.reference,
            events,
            Arc::clone(&self.correlator),
        ))
    }

    /// Detaches and fires the cancel in the background.
    fn abandon(&mut self) {
        let Some(ack) = self.detach() else {
            return;
        };
        let assignation = self.assignation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let dispatcher = Arc::clone(&self.dispatcher);
                debug!(%assignation, "cancelling abandoned assignation");
                handle.spawn(async move {
                    if let Err(err) = dispatcher.cancel(&assignation, ack).await {
                        warn!(%assignation, error = %err, "cancel failed");
                    }
                });
            }
            Err(_) => {
                warn!(%assignation, "no runtime available, cancel not issued");
            }
        }
    }

    fn finish(&mut self) {
        self.events = None;
        self.deadline = None;
        self.correlator.unregister(&self.reference);
    }

    fn terminal_item(&mut self, event: AssignationEvent) -> Result<AssignationEvent, AssignError> {
        self.finish();
        match AssignError::from_terminal(&event) {
            Some(err) => Err(err),
            None => Ok(event),
        }
    }
}

impl Stream for AssignationStream {
    type Item = Result<AssignationEvent, AssignError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(events) = this.events.as_mut() else {
            return Poll::Ready(None);
        };

        match events.poll_recv(cx) {
            Poll::Ready(Some(event)) if event.is_terminal() => {
                Poll::Ready(Some(this.terminal_item(event)))
            }
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(Some(Err(AssignError::Postman(
                    "event queue closed before a terminal event".into(),
                ))))
            }
            Poll::Pending => {
                if let Some((timeout, sleep)) = this.deadline.as_mut() {
                    if sleep.as_mut().poll(cx).is_ready() {
                        let timeout = *timeout;
                        this.abandon();
                        return Poll::Ready(Some(Err(AssignError::Timeout(timeout))));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for AssignationStream {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl std::fmt::Debug for AssignationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignationStream")
            .field("reference", &self.reference)
            .field("assignation", &self.assignation)
            .field("finished", &self.is_finished())
            .finish()
    }
}
