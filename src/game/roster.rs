//! Identity and roster
//!
//! Tracks who is connected, which of them is this process, and seeds each
//! participant's replicated counters and loadout.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::room::{keys, RoomTransport};

use super::authority::HostToken;
use super::types::{Counters, Loadout, ParticipantId, DEFAULT_SKIN};

/// A connected peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub is_local: bool,
}

/// Participants known to this process, in join order
#[derive(Debug)]
pub struct Roster {
    local: ParticipantId,
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new(local: ParticipantId) -> Self {
        let me = Participant {
            id: local.clone(),
            is_local: true,
        };
        Self {
            local,
            participants: vec![me],
        }
    }

    /// Add a participant. Returns `false` if it was already known.
    pub fn join(&mut self, id: ParticipantId) -> bool {
        if self.contains(&id) {
            return false;
        }
        let is_local = id == self.local;
        self.participants.push(Participant { id, is_local });
        true
    }

    pub fn quit(&mut self, id: &ParticipantId) -> Option<Participant> {
        let pos = self.participants.iter().position(|p| &p.id == id)?;
        Some(self.participants.remove(pos))
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants.iter().map(|p| &p.id)
    }

    /// Every participant except this process
    pub fn others(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants
            .iter()
            .filter(|p| !p.is_local)
            .map(|p| &p.id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Reset a participant's counters to their defaults and make sure it has a
/// loadout. Host only.
pub fn init_participant(transport: &dyn RoomTransport, _token: &HostToken, id: &ParticipantId) {
    let counters = Counters::default();
    transport.set_participant_state(id, keys::HEALTH, json!(counters.health));
    transport.set_participant_state(id, keys::DEATHS, json!(counters.deaths));
    transport.set_participant_state(id, keys::KILLS, json!(counters.kills));

    if transport.participant_state(id, keys::CHARACTER).is_none() {
        let loadout = Loadout {
            skin: profile_color(transport, id).unwrap_or_else(|| DEFAULT_SKIN.to_string()),
            ..Loadout::default()
        };
        write_loadout(transport, id, &loadout);
    }
    debug!(participant = %id, "Participant counters initialized");
}

/// Publish this process's own loadout, taking the skin from the room
/// profile color when the room service provides one
pub fn publish_own_loadout(transport: &dyn RoomTransport, weapon: &str) {
    let me = transport.local_participant();
    let loadout = Loadout {
        weapon: weapon.to_string(),
        skin: profile_color(transport, &me).unwrap_or_else(|| DEFAULT_SKIN.to_string()),
    };
    write_loadout(transport, &me, &loadout);
}

/// Read a participant's loadout, if it has published a valid one
pub fn loadout(transport: &dyn RoomTransport, id: &ParticipantId) -> Option<Loadout> {
    let value = transport.participant_state(id, keys::CHARACTER)?;
    match serde_json::from_value(value) {
        Ok(loadout) => Some(loadout),
        Err(e) => {
            warn!(participant = %id, error = %e, "Ignoring malformed loadout");
            None
        }
    }
}

/// Read a participant's current counters from its replicated slot
pub fn counters(transport: &dyn RoomTransport, id: &ParticipantId) -> Counters {
    let defaults = Counters::default();
    Counters {
        health: read_u32(transport, id, keys::HEALTH).unwrap_or(defaults.health),
        deaths: read_u32(transport, id, keys::DEATHS).unwrap_or(defaults.deaths),
        kills: read_u32(transport, id, keys::KILLS).unwrap_or(defaults.kills),
    }
}

pub(crate) fn read_u32(transport: &dyn RoomTransport, id: &ParticipantId, key: &str) -> Option<u32> {
    transport
        .participant_state(id, key)
        .and_then(|v| v.as_u64())
        .map(|v| v.min(u32::MAX as u64) as u32)
}

fn profile_color(transport: &dyn RoomTransport, id: &ParticipantId) -> Option<String> {
    transport
        .participant_state(id, keys::PROFILE)
        .and_then(|profile| profile.get("color").and_then(Value::as_str).map(str::to_string))
}

fn write_loadout(transport: &dyn RoomTransport, id: &ParticipantId, loadout: &Loadout) {
    match serde_json::to_value(loadout) {
        Ok(value) => transport.set_participant_state(id, keys::CHARACTER, value),
        Err(e) => warn!(participant = %id, error = %e, "Failed to encode loadout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::host_token;
    use crate::room::LocalRoom;

    #[test]
    fn join_is_idempotent_and_others_excludes_local() {
        let mut roster = Roster::new(ParticipantId::new("me"));
        assert!(roster.join(ParticipantId::new("a")));
        assert!(!roster.join(ParticipantId::new("a")));
        assert!(!roster.join(ParticipantId::new("me")));

        let others: Vec<_> = roster.others().cloned().collect();
        assert_eq!(others, vec![ParticipantId::new("a")]);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn quit_removes_participant() {
        let mut roster = Roster::new(ParticipantId::new("me"));
        roster.join(ParticipantId::new("a"));

        assert!(roster.quit(&ParticipantId::new("a")).is_some());
        assert!(roster.quit(&ParticipantId::new("a")).is_none());
        assert!(!roster.contains(&ParticipantId::new("a")));
    }

    #[test]
    fn init_resets_counters_and_defaults_loadout() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");
        let token = host_token(&host).unwrap();

        host.set_participant_state(guest.id(), keys::KILLS, json!(9));
        host.set_participant_state(
            guest.id(),
            keys::PROFILE,
            json!({"name": "g", "color": "#ff6b6b"}),
        );
        init_participant(&host, &token, guest.id());

        assert_eq!(counters(&host, guest.id()), Counters::default());
        let loadout = loadout(&host, guest.id()).unwrap();
        assert_eq!(loadout.weapon, "AK");
        assert_eq!(loadout.skin, "#ff6b6b");
    }

    #[test]
    fn init_keeps_a_published_loadout() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let guest = room.join("guest");
        let token = host_token(&host).unwrap();

        publish_own_loadout(&guest, "Sniper");
        init_participant(&host, &token, guest.id());

        assert_eq!(loadout(&host, guest.id()).unwrap().weapon, "Sniper");
    }
}
