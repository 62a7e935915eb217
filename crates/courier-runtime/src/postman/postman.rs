//! The remote assigner.

use super::reconnect::ReconnectPolicy;
use super::subscription::{Subscription, SubscriptionTask};
use crate::assigner::{AssignRequest, Assigner, ReserveRequest};
use crate::config::PostmanConfig;
use crate::correlator::Correlator;
use crate::error::AssignError;
use crate::stream::{AssignationStream, CancelAck, Dispatcher};
use crate::transport::Transport;
use async_trait::async_trait;
use courier_event::{Agent, EnsureAgentInput, Reservation};
use courier_types::{AssignationId, InstanceId, NodeId, Reference, ReservationId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Submits assignments to the broker and routes their events back.
///
/// `Postman` is cheap to clone; clones share one subscription and one
/// correlator. The subscription is started lazily by the first
/// [`Postman::submit`] and survives transient disconnects (see
/// [`ReconnectPolicy`]).
///
/// # Example
///
/// ```ignore
/// let postman = Postman::builder(transport, "worker-1")
///     .with_reconnect(ReconnectPolicy::default())
///     .build();
/// let stream = postman
///     .submit(AssignRequest::new(Target::Hash(hash)).with_args(args))
///     .await?;
/// let returns = stream.returns().await?;
/// postman.close().await;
/// ```
#[derive(Clone)]
pub struct Postman {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    instance_id: InstanceId,
    correlator: Arc<Correlator>,
    policy: ReconnectPolicy,
    subscription: Mutex<Option<Subscription>>,
    closed: AtomicBool,
    dispatcher: Arc<RemoteDispatcher>,
}

/// Builder for [`Postman`].
pub struct PostmanBuilder {
    transport: Arc<dyn Transport>,
    instance_id: InstanceId,
    policy: ReconnectPolicy,
}

impl PostmanBuilder {
    /// Starts a builder from loaded configuration: the instance id and the
    /// reconnect policy come from `config`.
    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, config: &PostmanConfig) -> Self {
        Postman::builder(transport, config.instance_id.as_str())
            .with_reconnect(config.reconnect.policy())
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> Postman {
        let dispatcher = Arc::new(RemoteDispatcher {
            transport: Arc::clone(&self.transport),
        });
        Postman {
            inner: Arc::new(Inner {
                transport: self.transport,
                instance_id: self.instance_id,
                correlator: Arc::new(Correlator::new()),
                policy: self.policy,
                subscription: Mutex::new(None),
                closed: AtomicBool::new(false),
                dispatcher,
            }),
        }
    }
}

impl Postman {
    /// Starts building a postman for `instance_id` on `transport`.
    #[must_use]
    pub fn builder(
        transport: Arc<dyn Transport>,
        instance_id: impl Into<InstanceId>,
    ) -> PostmanBuilder {
        PostmanBuilder {
            transport,
            instance_id: instance_id.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    /// Creates a postman with the default reconnect policy.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, instance_id: impl Into<InstanceId>) -> Self {
        Self::builder(transport, instance_id).build()
    }

    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.inner.instance_id
    }

    /// Number of assignments whose terminal event has not been consumed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.correlator.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Submits one assignment.
    ///
    /// The reference is registered before the broker is contacted, so no
    /// event can arrive for an unknown reference. If the broker rejects the
    /// submission the reference is unregistered again.
    ///
    /// # Errors
    ///
    /// - [`AssignError::Postman`] if the postman is closed
    /// - [`AssignError::Transport`] if the subscription cannot be started
    ///   or the broker rejects the submission
    pub async fn submit(&self, request: AssignRequest) -> Result<AssignationStream, AssignError> {
        self.ensure_open()?;
        self.ensure_subscribed().await?;

        let correlator = &self.inner.correlator;
        let reference = Reference::new();
        let events = correlator.register(reference)?;
        let mut pending = PendingRegistration {
            correlator,
            reference,
            armed: true,
        };
        // close() may have drained the correlator since ensure_open.
        self.ensure_open()?;
        let target = request.target.clone();
        let input = request.into_input(self.inner.instance_id.clone(), reference);

        let assignation = match self.inner.transport.assign(input).await {
            Ok(assignation) => assignation,
            Err(err) => {
                warn!(%reference, %target, error = %err, "assign rejected");
                return Err(err.into());
            }
        };
        pending.armed = false;
        correlator.bind(&reference, assignation.id.clone());
        debug!(%reference, assignation = %assignation.id, %target, "assignment submitted");

        Ok(AssignationStream::new(
            reference,
            assignation.id,
            events,
            Arc::clone(correlator),
            Arc::clone(&self.inner.dispatcher) as Arc<dyn Dispatcher>,
        ))
    }

    /// Creates a reservation for `node`.
    pub async fn reserve(
        &self,
        node: NodeId,
        request: ReserveRequest,
    ) -> Result<Reservation, AssignError> {
        self.ensure_open()?;
        let input = request.into_input(self.inner.instance_id.clone(), node);
        let reservation = self.inner.transport.reserve(input).await?;
        info!(reservation = %reservation.id, node = %reservation.node, "reserved");
        Ok(reservation)
    }

    /// Releases a reservation.
    pub async fn unreserve(&self, id: &ReservationId) -> Result<(), AssignError> {
        self.inner.transport.unreserve(id).await?;
        info!(reservation = %id, "unreserved");
        Ok(())
    }

    /// Requests cancellation of an assignation by id.
    pub async fn cancel(&self, id: &AssignationId) -> Result<(), AssignError> {
        self.inner.transport.cancel(id).await?;
        Ok(())
    }

    /// Requests an interrupt of an assignation by id.
    pub async fn interrupt(&self, id: &AssignationId) -> Result<(), AssignError> {
        self.inner.transport.interrupt(id).await?;
        Ok(())
    }

    /// Registers this client as an agent with the broker.
    pub async fn ensure_agent(&self, name: Option<String>) -> Result<Agent, AssignError> {
        self.ensure_open()?;
        let mut input = EnsureAgentInput::new(self.inner.instance_id.clone());
        input.name = name;
        let agent = self.inner.transport.ensure_agent(input).await?;
        info!(agent = %agent.id, "agent registered");
        Ok(agent)
    }

    /// Stops the subscription and ends every pending stream with
    /// `CANCELLED`. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.inner.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            subscription.shutdown().await;
        }
        let drained = self.inner.correlator.cancel_all();
        info!(instance = %self.inner.instance_id, drained, "postman closed");
    }

    fn ensure_open(&self) -> Result<(), AssignError> {
        if self.is_closed() {
            return Err(AssignError::Postman("postman closed".into()));
        }
        Ok(())
    }

    /// Starts the subscription unless it is already running.
    ///
    /// Concurrent callers serialize on the lock; only the first spawns the
    /// task, the rest observe it running.
    async fn ensure_subscribed(&self) -> Result<(), AssignError> {
        let mut guard = self.inner.subscription.lock().await;
        // Re-checked under the lock: close() may have taken the subscription
        // while this call was waiting for it.
        self.ensure_open()?;
        if guard.as_ref().is_some_and(Subscription::is_running) {
            return Ok(());
        }
        if guard.take().is_some() {
            info!(instance = %self.inner.instance_id, "restarting subscription");
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let subscription = SubscriptionTask {
            transport: Arc::clone(&self.inner.transport),
            instance_id: self.inner.instance_id.clone(),
            correlator: Arc::clone(&self.inner.correlator),
            policy: self.inner.policy,
        }
        .spawn(ready_tx);

        match ready_rx.await {
            Ok(Ok(())) => {
                *guard = Some(subscription);
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(AssignError::Postman(
                "subscription task ended before it was ready".into(),
            )),
        }
    }
}

#[async_trait]
impl Assigner for Postman {
    async fn assign(&self, request: AssignRequest) -> Result<AssignationStream, AssignError> {
        self.submit(request).await
    }

    async fn reserve(
        &self,
        node: NodeId,
        request: ReserveRequest,
    ) -> Result<Reservation, AssignError> {
        Postman::reserve(self, node, request).await
    }

    async fn unreserve(&self, id: &ReservationId) -> Result<(), AssignError> {
        Postman::unreserve(self, id).await
    }
}

impl std::fmt::Debug for Postman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postman")
            .field("instance_id", &self.inner.instance_id)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Unregisters a reference whose submission did not complete, including
/// when the submitting future is dropped mid-flight.
struct PendingRegistration<'a> {
    correlator: &'a Correlator,
    reference: Reference,
    armed: bool,
}

impl Drop for PendingRegistration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.unregister(&self.reference);
        }
    }
}

/// Cancels through the broker. The queue is released before the cancel is
/// sent; the broker's `CANCELLED` event, if any, is dropped as late.
struct RemoteDispatcher {
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Dispatcher for RemoteDispatcher {
    async fn cancel(&self, assignation: &AssignationId, ack: CancelAck) -> Result<(), AssignError> {
        drop(ack);
        self.transport.cancel(assignation).await?;
        debug!(%assignation, "cancel sent");
        Ok(())
    }

    async fn interrupt(&self, assignation: &AssignationId) -> Result<(), AssignError> {
        self.transport.interrupt(assignation).await?;
        debug!(%assignation, "interrupt sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use crate::testing::MockTransport;

    fn mock() -> Arc<MockTransport> {
        Arc::new(MockTransport::new())
    }

    #[test]
    fn builder_takes_instance_and_policy_from_config() {
        let config = PostmanConfig {
            instance_id: "worker-7".into(),
            reconnect: ReconnectConfig {
                initial_backoff_ms: 10,
                max_backoff_ms: 40,
                max_attempts: 2,
            },
        };
        let postman = PostmanBuilder::from_config(mock() as Arc<dyn Transport>, &config).build();

        assert_eq!(postman.instance_id().as_str(), "worker-7");
        assert_eq!(postman.inner.policy, config.reconnect.policy());
        assert_eq!(postman.inner.policy.max_attempts, 2);
    }

    /// A subscription start that was queued behind `close` must not
    /// spawn a new subscription.
    #[tokio::test]
    async fn no_subscription_starts_after_close() {
        let transport = mock();
        let postman = Postman::new(Arc::clone(&transport) as Arc<dyn Transport>, "closing");

        postman.close().await;
        let err = postman.ensure_subscribed().await.expect_err("closed");

        assert!(matches!(err, AssignError::Postman(ref m) if m == "postman closed"));
        assert_eq!(transport.watch_count(), 0);
        assert!(postman.inner.subscription.lock().await.is_none());
    }

    /// Closing while a start holds the lock leaves nothing running once
    /// both have finished.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_submit_and_close_leave_no_subscription() {
        for _ in 0..20 {
            let transport = mock();
            let postman = Postman::new(Arc::clone(&transport) as Arc<dyn Transport>, "race");

            let starter = {
                let postman = postman.clone();
                tokio::spawn(async move { postman.ensure_subscribed().await })
            };
            postman.close().await;
            let _ = starter.await.expect("join");

            assert!(postman.inner.subscription.lock().await.is_none());
            for _ in 0..100 {
                if transport.open_watchers() == 0 {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            assert_eq!(transport.open_watchers(), 0);
        }
    }
}
