//! Broker transport seam.
//!
//! The runtime talks to the broker through [`Transport`]: a handful of
//! request/response mutations plus one long-lived per-instance
//! subscription. Implementations own connection handling; the runtime owns
//! correlation, reconnection policy and cancellation.
//!
//! [`crate::testing::MockTransport`] is an in-memory implementation for tests.

use async_trait::async_trait;
use courier_event::{
    Agent, AssignInput, Assignation, EnsureAgentInput, Reservation, ReserveInput, WatchMessage,
};
use courier_types::{AssignationId, ErrorCode, InstanceId, ReservationId};
use futures::stream::BoxStream;
use thiserror::Error;

/// Stream of subscription messages for one instance.
///
/// An `Err` item or the end of the stream both mean the subscription is
/// lost and must be re-established.
pub type WatchStream = BoxStream<'static, Result<WatchMessage, TransportError>>;

/// Transport level failure.
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | `Connection` | `TRANSPORT_CONNECTION` | Yes |
/// | `Rejected` | `TRANSPORT_REJECTED` | No |
/// | `Closed` | `TRANSPORT_CLOSED` | Yes |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broker could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The broker answered with an error.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The subscription stream ended.
    #[error("subscription closed by broker")]
    Closed,
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "TRANSPORT_CONNECTION",
            Self::Rejected(_) => "TRANSPORT_REJECTED",
            Self::Closed => "TRANSPORT_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Connection to the broker.
///
/// All methods may be called concurrently from many tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Creates a reservation for a node.
    async fn reserve(&self, input: ReserveInput) -> Result<Reservation, TransportError>;

    /// Releases a reservation.
    async fn unreserve(&self, id: &ReservationId) -> Result<ReservationId, TransportError>;

    /// Submits an assignment. The broker replies with the created assignation.
    async fn assign(&self, input: AssignInput) -> Result<Assignation, TransportError>;

    /// Requests cancellation of an assignation.
    async fn cancel(&self, id: &AssignationId) -> Result<Assignation, TransportError>;

    /// Requests an interrupt of an assignation.
    async fn interrupt(&self, id: &AssignationId) -> Result<Assignation, TransportError>;

    /// Registers this client as an agent.
    async fn ensure_agent(&self, input: EnsureAgentInput) -> Result<Agent, TransportError>;

    /// Opens the per-instance subscription.
    async fn watch_assignations(&self, instance_id: &InstanceId)
        -> Result<WatchStream, TransportError>;
}
