//! Target designator resolution.

use super::port::NodeRef;
use courier_event::Target;
use courier_types::ReservationId;

/// Picks the designator for a call on `node`.
///
/// Order: active reservation, then template, then node id, then hash.
#[must_use]
pub fn resolve_target(reservation: Option<&ReservationId>, node: &NodeRef) -> Target {
    if let Some(reservation) = reservation {
        return Target::Reservation(reservation.clone());
    }
    if let Some(template) = &node.template {
        return Target::Template(template.clone());
    }
    if let Some(id) = &node.id {
        return Target::Node(id.clone());
    }
    Target::Hash(node.hash.clone())
}
