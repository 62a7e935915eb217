//! The per-instance subscription task.
//!
//! One background task owns the broker subscription and feeds the
//! [`Correlator`]:
//!
//! ```text
//!            ┌──────────── shutdown (oneshot) ────────────┐
//!            ▼                                            │
//! connect ──► read loop ──create──► correlator.bind       │
//!   ▲            │      ──event───► correlator.deliver    │
//!   │            │ lost                                   │
//!   └─ backoff ◄─┘                                        │
//!        │ exhausted                                      │
//!        ▼                                                │
//!   correlator.poison (CRITICAL to every queue)     Postman::close
//! ```
//!
//! The first successful connect is reported on the ready channel. A failed
//! first connect is reported there too and ends the task, so the
//! submitter sees the error instead of a silent hang.

use super::reconnect::ReconnectPolicy;
use crate::correlator::Correlator;
use crate::transport::{Transport, TransportError};
use courier_event::{WatchItem, WatchMessage};
use courier_types::{ErrorCode, InstanceId};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result sent once the subscription is live (or failed to start).
pub(super) type Ready = oneshot::Sender<Result<(), TransportError>>;

/// Handle to a running subscription task.
pub(super) struct Subscription {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(super) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the task to stop and waits for it.
    pub(super) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = self.task.await {
            warn!(error = %err, "subscription task ended abnormally");
        }
    }
}

pub(super) struct SubscriptionTask {
    pub(super) transport: Arc<dyn Transport>,
    pub(super) instance_id: InstanceId,
    pub(super) correlator: Arc<Correlator>,
    pub(super) policy: ReconnectPolicy,
}

impl SubscriptionTask {
    pub(super) fn spawn(self, ready: Ready) -> Subscription {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(ready, shutdown_rx));
        Subscription {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(self, ready: Ready, mut shutdown: oneshot::Receiver<()>) {
        let instance = self.instance_id.clone();
        let mut ready = Some(ready);
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!(%instance, "subscription stopped before connect");
                    return;
                }
                result = self.transport.watch_assignations(&self.instance_id) => result,
            };

            let cause = match connected {
                Ok(mut stream) => {
                    failures = 0;
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                    info!(%instance, "subscription established");

                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut shutdown => {
                                info!(%instance, "subscription stopped");
                                return;
                            }
                            msg = stream.next() => match msg {
                                Some(Ok(msg)) => self.handle(msg),
                                Some(Err(err)) => break err,
                                None => break TransportError::Closed,
                            },
                        }
                    }
                }
                Err(err) => {
                    if let Some(tx) = ready.take() {
                        warn!(%instance, error = %err, "subscription could not be established");
                        let _ = tx.send(Err(err));
                        return;
                    }
                    err
                }
            };

            failures += 1;
            if self.policy.exhausted(failures) {
                let message = format!(
                    "subscription lost after {} reconnect attempts: {cause}",
                    self.policy.max_attempts
                );
                let poisoned = self.correlator.poison(&message);
                error!(%instance, poisoned, code = cause.code(), "{message}");
                return;
            }

            let delay = self.policy.delay(failures);
            warn!(
                %instance,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %cause,
                "subscription lost, reconnecting"
            );
            tokio::select! {
                biased;
                _ = &mut shutdown => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn handle(&self, msg: WatchMessage) {
        match msg.classify() {
            Ok(WatchItem::Create(assignation)) => {
                if !self.correlator.bind(&assignation.reference, assignation.id.clone()) {
                    debug!(
                        reference = %assignation.reference,
                        assignation = %assignation.id,
                        "create for unregistered reference"
                    );
                }
            }
            Ok(WatchItem::Event(event)) => {
                self.correlator.deliver(event);
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "skipping malformed watch message");
            }
        }
    }
}
