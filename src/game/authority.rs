//! Host authority checks and fire request routing
//!
//! Exactly one participant is host. Every mutation of a host-owned registry or
//! of another participant's counters requires a [`HostToken`], and the only
//! way to get one is [`host_token`], which asks the room transport at the time
//! of the call.

use serde_json::Value;
use tracing::{debug, warn};

use crate::room::{keys, RoomTransport};

use super::dedup::FireDeduplicator;
use super::error::SyncError;
use super::roster::Roster;
use super::types::{ParticipantId, Projectile};

/// Proof that host authority was checked for the current operation
#[derive(Debug)]
pub struct HostToken {
    _checked: (),
}

/// Issue a [`HostToken`] if this process is currently host
pub fn host_token(transport: &dyn RoomTransport) -> Result<HostToken, SyncError> {
    if transport.is_host() {
        Ok(HostToken { _checked: () })
    } else {
        Err(SyncError::NotAuthoritative)
    }
}

/// What happened to a locally fired projectile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Host: inserted straight into the authoritative registry
    Authoritative,
    /// Non-host: written to the pending slot for the host to pick up
    Forwarded,
    /// Non-host: an earlier request is still unconsumed, so this one is shown
    /// locally but never reaches the host
    Throttled,
    /// The id was already seen; nothing happened
    Duplicate,
}

/// Write `projectile` into the local participant's pending slot if it is
/// empty. Returns `false` when an unconsumed request is already there.
pub fn forward_to_host(transport: &dyn RoomTransport, projectile: &Projectile) -> bool {
    let me = transport.local_participant();

    if transport.participant_state(&me, keys::PENDING_BULLET).is_some() {
        debug!(participant = %me, projectile = %projectile.id, "Pending slot occupied, fire throttled");
        return false;
    }

    match serde_json::to_value(projectile) {
        Ok(value) => {
            transport.set_participant_state(&me, keys::PENDING_BULLET, value);
            true
        }
        Err(e) => {
            warn!(projectile = %projectile.id, error = %e, "Failed to encode fire request");
            false
        }
    }
}

/// Read and clear a participant's pending fire request
pub fn take_pending_request(
    transport: &dyn RoomTransport,
    _token: &HostToken,
    participant: &ParticipantId,
) -> Result<Option<Projectile>, SyncError> {
    let Some(value) = transport.participant_state(participant, keys::PENDING_BULLET) else {
        return Ok(None);
    };
    transport.set_participant_state(participant, keys::PENDING_BULLET, Value::Null);

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| SyncError::malformed(keys::PENDING_BULLET, e))
}

/// Drain every non-host participant's pending slot.
///
/// Requests whose id the host has already seen are cleared without being
/// accepted, so a duplicate can never wedge a participant's slot. Accepted
/// projectiles are handed to `accept` in roster order, which defines the
/// global creation order.
///
/// `created_at` of an accepted projectile is restamped with `accepted_at`
/// (host clock); the sender's clock is not comparable with the host's.
pub fn drain_pending_requests(
    transport: &dyn RoomTransport,
    token: &HostToken,
    roster: &Roster,
    dedup: &mut FireDeduplicator,
    accepted_at: u64,
    mut accept: impl FnMut(Projectile),
) -> usize {
    let mut accepted = 0;

    for participant in roster.others() {
        match take_pending_request(transport, token, participant) {
            Ok(Some(mut projectile)) => {
                if dedup.request_fire(&projectile.id) {
                    projectile.created_at = accepted_at;
                    accept(projectile);
                    accepted += 1;
                } else {
                    debug!(
                        participant = %participant,
                        projectile = %projectile.id,
                        "Dropping already-seen fire request"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(participant = %participant, error = %e, "Discarding malformed fire request");
            }
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::Vec3;
    use crate::room::LocalRoom;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn shot(owner: &ParticipantId, id: &str) -> Projectile {
        let mut projectile = Projectile::new(owner.clone(), Vec3::default(), 0.0, 20.0, 0);
        projectile.id = crate::game::types::ProjectileId::new(id);
        projectile
    }

    #[test]
    fn token_only_for_host() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");

        assert_ok!(host_token(&host));
        assert_eq!(assert_err!(host_token(&guest)), SyncError::NotAuthoritative);
    }

    #[test]
    fn second_forward_is_throttled_until_drained() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");
        let me = guest.local_participant();

        assert!(forward_to_host(&guest, &shot(&me, "a")));
        assert!(!forward_to_host(&guest, &shot(&me, "b")));

        let token = host_token(&host).unwrap();
        let taken = take_pending_request(&host, &token, &me).unwrap().unwrap();
        assert_eq!(taken.id.0, "a");

        assert!(forward_to_host(&guest, &shot(&me, "c")));
    }

    #[test]
    fn drain_accepts_new_and_clears_duplicates() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");
        let me = guest.local_participant();

        let mut roster = Roster::new(host.local_participant());
        roster.join(me.clone());

        let token = host_token(&host).unwrap();
        let mut dedup = FireDeduplicator::new(100);
        let mut accepted = Vec::new();

        forward_to_host(&guest, &shot(&me, "a"));
        let n = drain_pending_requests(&host, &token, &roster, &mut dedup, 7, |p| accepted.push(p));
        assert_eq!(n, 1);
        // Restamped with the host's acceptance time
        assert_eq!(accepted[0].created_at, 7);

        // Same id again: cleared but not accepted
        forward_to_host(&guest, &shot(&me, "a"));
        let n = drain_pending_requests(&host, &token, &roster, &mut dedup, 7, |p| accepted.push(p));
        assert_eq!(n, 0);
        assert_eq!(accepted.len(), 1);
        assert_eq!(host.participant_state(&me, keys::PENDING_BULLET), None);
    }

    #[test]
    fn malformed_request_is_cleared() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");
        let me = guest.local_participant();

        guest.set_participant_state(&me, keys::PENDING_BULLET, json!({"nonsense": true}));

        let token = host_token(&host).unwrap();
        let err = take_pending_request(&host, &token, &me).unwrap_err();
        assert!(matches!(err, SyncError::Malformed { .. }));
        assert_eq!(host.participant_state(&me, keys::PENDING_BULLET), None);
    }
}
