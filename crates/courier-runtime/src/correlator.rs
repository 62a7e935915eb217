//! Reference → queue routing table.
//!
//! The [`Correlator`] routes every incoming [`AssignationEvent`] to the
//! queue of the call that created it, keyed by [`Reference`].
//!
//! # Lifecycle of an entry
//!
//! ```text
//! register(ref) ──► Slot { tx, assignation: None }
//!                      │ bind(ref, id)      (broker acknowledged)
//!                      ▼
//!                   Slot { tx, assignation: Some(id) }
//!                      │ deliver(terminal) │ unregister(ref)
//!                      ▼                   ▼
//!                   retired (late events are logged at debug)
//! ```
//!
//! # Delivery guarantees
//!
//! - Events for one reference are delivered in arrival order.
//! - Nothing is delivered after the first terminal event.
//! - Events for unknown references are logged and dropped.
//!
//! The table is guarded by a single [`parking_lot::Mutex`]. Sending on an
//! unbounded channel never blocks, so delivery never waits on a consumer.

use crate::error::AssignError;
use courier_event::AssignationEvent;
use courier_types::{AssignationId, Reference};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receiving half of a per-reference event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<AssignationEvent>;

/// How many retired references are remembered for late-event logging.
const RETIRED_CAPACITY: usize = 1024;

/// Outcome of [`Correlator::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed to a live queue.
    Delivered,
    /// Pushed to a live queue and the entry was removed (terminal event).
    Completed,
    /// The queue's receiver was gone; the entry was removed.
    Abandoned,
    /// The reference finished earlier; the event was dropped.
    Late,
    /// The reference was never registered here; the event was dropped.
    Unknown,
}

struct Slot {
    tx: mpsc::UnboundedSender<AssignationEvent>,
    assignation: Option<AssignationId>,
}

#[derive(Default)]
struct Table {
    slots: HashMap<Reference, Slot>,
    retired: VecDeque<Reference>,
    retired_set: HashSet<Reference>,
}

impl Table {
    fn retire(&mut self, reference: Reference) {
        if self.retired_set.insert(reference) {
            self.retired.push_back(reference);
            if self.retired.len() > RETIRED_CAPACITY {
                if let Some(old) = self.retired.pop_front() {
                    self.retired_set.remove(&old);
                }
            }
        }
    }

    fn remove(&mut self, reference: &Reference) -> Option<Slot> {
        let slot = self.slots.remove(reference)?;
        self.retire(*reference);
        Some(slot)
    }
}

/// Routes lifecycle events to per-call queues.
///
/// # Example
///
/// ```
/// use courier_event::{AssignationEvent, EventKind};
/// use courier_runtime::{Correlator, Delivery};
/// use courier_types::Reference;
///
/// let correlator = Correlator::new();
/// let r = Reference::new();
/// let mut rx = correlator.register(r).unwrap();
///
/// assert_eq!(correlator.deliver(AssignationEvent::log(r, "hi")), Delivery::Delivered);
/// assert_eq!(correlator.deliver(AssignationEvent::done(r)), Delivery::Completed);
/// assert_eq!(correlator.deliver(AssignationEvent::log(r, "late")), Delivery::Late);
///
/// assert_eq!(rx.try_recv().unwrap().kind, EventKind::Log);
/// assert_eq!(rx.try_recv().unwrap().kind, EventKind::Done);
/// assert!(correlator.is_empty());
/// ```
#[derive(Default)]
pub struct Correlator {
    table: Mutex<Table>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the queue for `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`AssignError::Postman`] if the reference is already registered.
    pub fn register(&self, reference: Reference) -> Result<EventReceiver, AssignError> {
        let mut table = self.table.lock();
        if table.slots.contains_key(&reference) {
            return Err(AssignError::Postman(format!(
                "reference {reference} is already registered"
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        table.slots.insert(
            reference,
            Slot {
                tx,
                assignation: None,
            },
        );
        table.retired_set.remove(&reference);
        Ok(rx)
    }

    /// Records the server id of a registered reference.
    ///
    /// Returns `false` if the reference is not registered.
    pub fn bind(&self, reference: &Reference, assignation: AssignationId) -> bool {
        match self.table.lock().slots.get_mut(reference) {
            Some(slot) => {
                slot.assignation = Some(assignation);
                true
            }
            None => false,
        }
    }

    /// Returns the server id bound to `reference`, if known.
    #[must_use]
    pub fn assignation(&self, reference: &Reference) -> Option<AssignationId> {
        self.table
            .lock()
            .slots
            .get(reference)
            .and_then(|slot| slot.assignation.clone())
    }

    /// Routes one event to its queue.
    pub fn deliver(&self, event: AssignationEvent) -> Delivery {
        let reference = event.reference;
        let terminal = event.is_terminal();
        let kind = event.kind;

        let mut table = self.table.lock();
        let Some(slot) = table.slots.get(&reference) else {
            let late = table.retired_set.contains(&reference);
            drop(table);
            if late {
                debug!(%reference, %kind, "dropping event for finished reference");
                return Delivery::Late;
            }
            warn!(%reference, %kind, "dropping event for unknown reference");
            return Delivery::Unknown;
        };

        if slot.tx.send(event).is_err() {
            table.remove(&reference);
            drop(table);
            debug!(%reference, %kind, "queue receiver gone, entry removed");
            return Delivery::Abandoned;
        }

        if terminal {
            table.remove(&reference);
            Delivery::Completed
        } else {
            Delivery::Delivered
        }
    }

    /// Removes the entry for `reference`. Idempotent.
    ///
    /// Returns the bound assignation id if the entry existed.
    pub fn unregister(&self, reference: &Reference) -> Option<AssignationId> {
        self.table
            .lock()
            .remove(reference)
            .and_then(|slot| slot.assignation)
    }

    /// Ends every live queue with a synthetic `CRITICAL` event.
    ///
    /// Used when the subscription cannot be re-established. Returns the
    /// number of queues that were ended.
    pub fn poison(&self, message: &str) -> usize {
        self.drain_with(|reference| AssignationEvent::critical(reference, message))
    }

    /// Ends every live queue with a synthetic `CANCELLED` event.
    ///
    /// Used on shutdown. Returns the number of queues that were ended.
    pub fn cancel_all(&self) -> usize {
        self.drain_with(AssignationEvent::cancelled)
    }

    fn drain_with(&self, make: impl Fn(Reference) -> AssignationEvent) -> usize {
        let mut table = self.table.lock();
        let references: Vec<Reference> = table.slots.keys().copied().collect();
        for reference in &references {
            if let Some(slot) = table.remove(reference) {
                let _ = slot.tx.send(make(*reference));
            }
        }
        references.len()
    }

    /// Returns `true` if `reference` has a live entry.
    #[must_use]
    pub fn contains(&self, reference: &Reference) -> bool {
        self.table.lock().slots.contains_key(reference)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_event::EventKind;
    use serde_json::json;

    fn drain(rx: &mut EventReceiver) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[test]
    fn duplicate_register_fails() {
        let c = Correlator::new();
        let r = Reference::new();
        let _rx = c.register(r).expect("first register");
        assert!(matches!(c.register(r), Err(AssignError::Postman(_))));
    }

    #[test]
    fn events_routed_by_reference() {
        let c = Correlator::new();
        let (a, b) = (Reference::new(), Reference::new());
        let mut rx_a = c.register(a).expect("register a");
        let mut rx_b = c.register(b).expect("register b");

        c.deliver(AssignationEvent::yielded(a, vec![json!(1)]));
        c.deliver(AssignationEvent::yielded(b, vec![json!(2)]));
        c.deliver(AssignationEvent::done(a));

        let first = rx_a.try_recv().expect("a yield");
        assert_eq!(first.returns, Some(vec![json!(1)]));
        assert_eq!(rx_a.try_recv().expect("a done").kind, EventKind::Done);
        assert_eq!(rx_b.try_recv().expect("b yield").returns, Some(vec![json!(2)]));
        assert!(rx_b.try_recv().is_err());

        assert!(!c.contains(&a));
        assert!(c.contains(&b));
    }

    #[test]
    fn unknown_and_late_events() {
        let c = Correlator::new();
        assert_eq!(c.deliver(AssignationEvent::done(Reference::new())), Delivery::Unknown);

        let r = Reference::new();
        let _rx = c.register(r).expect("register");
        c.unregister(&r);
        assert_eq!(c.deliver(AssignationEvent::log(r, "x")), Delivery::Late);
    }

    #[test]
    fn dropped_receiver_abandons_entry() {
        let c = Correlator::new();
        let r = Reference::new();
        drop(c.register(r).expect("register"));
        assert_eq!(c.deliver(AssignationEvent::log(r, "x")), Delivery::Abandoned);
        assert!(c.is_empty());
    }

    #[test]
    fn bind_and_unregister_return_id() {
        let c = Correlator::new();
        let r = Reference::new();
        let _rx = c.register(r).expect("register");

        assert!(c.bind(&r, AssignationId::from("A1")));
        assert_eq!(c.assignation(&r), Some(AssignationId::from("A1")));
        assert_eq!(c.unregister(&r), Some(AssignationId::from("A1")));
        assert_eq!(c.unregister(&r), None);
        assert!(!c.bind(&r, AssignationId::from("A2")));
    }

    #[test]
    fn poison_ends_every_queue() {
        let c = Correlator::new();
        let refs: Vec<_> = (0..3).map(|_| Reference::new()).collect();
        let mut rxs: Vec<_> = refs.iter().map(|r| c.register(*r).expect("register")).collect();

        assert_eq!(c.poison("subscription lost"), 3);
        assert!(c.is_empty());
        for rx in &mut rxs {
            let ev = rx.try_recv().expect("synthetic event");
            assert_eq!(ev.kind, EventKind::Critical);
            assert_eq!(ev.message.as_deref(), Some("subscription lost"));
        }
    }

    #[test]
    fn cancel_all_sends_cancelled() {
        let c = Correlator::new();
        let r = Reference::new();
        let mut rx = c.register(r).expect("register");
        assert_eq!(c.cancel_all(), 1);
        assert_eq!(drain(&mut rx), vec![EventKind::Cancelled]);
    }

    #[test]
    fn reregistering_retired_reference_is_live_again() {
        let c = Correlator::new();
        let r = Reference::new();
        let _old = c.register(r).expect("register");
        c.unregister(&r);
        let mut rx = c.register(r).expect("register again");
        assert_eq!(c.deliver(AssignationEvent::done(r)), Delivery::Completed);
        assert_eq!(drain(&mut rx), vec![EventKind::Done]);
    }

    // ─── Property-Based Tests ─────────────────────────────────────

    mod proptest_correlator {
        use super::*;
        use proptest::prelude::*;

        fn kind_strategy() -> impl Strategy<Value = EventKind> {
            (0..EventKind::ALL.len()).prop_map(|i| EventKind::ALL[i])
        }

        proptest! {
            /// A queue sees the delivered kinds in order, up to and including
            /// the first terminal one, and nothing after it.
            #[test]
            fn queue_stops_at_first_terminal(kinds in prop::collection::vec(kind_strategy(), 1..40)) {
                let c = Correlator::new();
                let r = Reference::new();
                let mut rx = c.register(r).expect("register");

                for kind in &kinds {
                    c.deliver(AssignationEvent::new(r, *kind));
                }

                let expected: Vec<EventKind> = match kinds.iter().position(EventKind::is_terminal) {
                    Some(end) => kinds[..=end].to_vec(),
                    None => kinds.clone(),
                };
                prop_assert_eq!(drain(&mut rx), expected.clone());
                prop_assert_eq!(c.contains(&r), !expected.iter().any(EventKind::is_terminal));
            }

            /// Interleaved deliveries never cross between references.
            #[test]
            fn interleaved_references_stay_separate(
                script in prop::collection::vec((0..4usize, kind_strategy()), 1..60)
            ) {
                let c = Correlator::new();
                let refs: Vec<Reference> = (0..4).map(|_| Reference::new()).collect();
                let mut rxs: Vec<EventReceiver> =
                    refs.iter().map(|r| c.register(*r).expect("register")).collect();

                let mut expected: Vec<Vec<EventKind>> = vec![Vec::new(); refs.len()];
                let mut finished = [false; 4];
                for (idx, kind) in &script {
                    c.deliver(AssignationEvent::new(refs[*idx], *kind));
                    if !finished[*idx] {
                        expected[*idx].push(*kind);
                        finished[*idx] = kind.is_terminal();
                    }
                }

                for (rx, want) in rxs.iter_mut().zip(expected) {
                    prop_assert_eq!(drain(rx), want);
                }
            }
        }
    }
}
