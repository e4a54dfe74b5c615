//! In-process room transport
//!
//! Every peer shares the same stores, so replication is immediate. Used by the
//! local simulation and by tests.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::game::types::ParticipantId;

use super::{RoomEvent, RoomTransport};

const EVENT_CAPACITY: usize = 1024;

/// Shared room: roster, replicated stores and the notification channel
pub struct LocalRoom {
    participants: RwLock<Vec<ParticipantId>>,
    host: RwLock<Option<ParticipantId>>,
    participant_state: DashMap<ParticipantId, HashMap<String, Value>>,
    room_state: DashMap<String, Value>,
    events: broadcast::Sender<RoomEvent>,
}

impl LocalRoom {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            participants: RwLock::new(Vec::new()),
            host: RwLock::new(None),
            participant_state: DashMap::new(),
            room_state: DashMap::new(),
            events,
        })
    }

    /// Join the room. The first participant to join becomes host.
    pub fn join(self: &Arc<Self>, id: impl Into<String>) -> LocalPeer {
        let id = ParticipantId::new(id);

        {
            let mut participants = self.participants.write();
            if !participants.contains(&id) {
                participants.push(id.clone());
            }
        }
        {
            let mut host = self.host.write();
            if host.is_none() {
                *host = Some(id.clone());
            }
        }
        self.participant_state.entry(id.clone()).or_default();

        info!(participant = %id, "Participant joined room");
        let _ = self.events.send(RoomEvent::ParticipantJoined(id.clone()));

        LocalPeer {
            room: Arc::clone(self),
            id,
        }
    }

    /// Remove a participant and its replicated state. Host authority is not
    /// migrated.
    pub fn quit(&self, id: &ParticipantId) {
        let removed = {
            let mut participants = self.participants.write();
            let before = participants.len();
            participants.retain(|p| p != id);
            participants.len() != before
        };
        if !removed {
            return;
        }
        self.participant_state.remove(id);

        info!(participant = %id, "Participant quit room");
        let _ = self.events.send(RoomEvent::ParticipantQuit(id.clone()));
    }

    pub fn host(&self) -> Option<ParticipantId> {
        self.host.read().clone()
    }

    fn notify(&self, event: RoomEvent) {
        // No subscribers is fine
        if self.events.send(event).is_err() {
            debug!("Room event dropped, no subscribers");
        }
    }
}

/// One participant's handle on a [`LocalRoom`]
#[derive(Clone)]
pub struct LocalPeer {
    room: Arc<LocalRoom>,
    id: ParticipantId,
}

impl LocalPeer {
    pub fn room(&self) -> &Arc<LocalRoom> {
        &self.room
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }
}

impl RoomTransport for LocalPeer {
    fn is_host(&self) -> bool {
        self.room.host.read().as_ref() == Some(&self.id)
    }

    fn local_participant(&self) -> ParticipantId {
        self.id.clone()
    }

    fn participants(&self) -> Vec<ParticipantId> {
        self.room.participants.read().clone()
    }

    fn participant_state(&self, participant: &ParticipantId, key: &str) -> Option<Value> {
        self.room
            .participant_state
            .get(participant)
            .and_then(|state| state.get(key).cloned())
    }

    fn set_participant_state(&self, participant: &ParticipantId, key: &str, value: Value) {
        {
            let Some(mut state) = self.room.participant_state.get_mut(participant) else {
                debug!(participant = %participant, key, "Write to departed participant ignored");
                return;
            };
            if value.is_null() {
                state.remove(key);
            } else {
                state.insert(key.to_string(), value);
            }
        }
        self.room.notify(RoomEvent::ParticipantStateChanged {
            participant: participant.clone(),
            key: key.to_string(),
        });
    }

    fn room_state(&self, key: &str) -> Option<Value> {
        self.room.room_state.get(key).map(|v| v.value().clone())
    }

    fn set_room_state(&self, key: &str, value: Value) {
        if value.is_null() {
            self.room.room_state.remove(key);
        } else {
            self.room.room_state.insert(key.to_string(), value);
        }
        self.room.notify(RoomEvent::RoomStateChanged {
            key: key.to_string(),
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.room.events.subscribe()
    }
}
