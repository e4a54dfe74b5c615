//! Room transport seam
//!
//! Peer discovery, raw message delivery and key/value replication are provided
//! by an external room service. The sync core only talks to it through
//! [`RoomTransport`]: an authority flag, the roster, a per-participant state
//! store, a room-wide state store, and a stream of change notifications.

pub mod local;

pub use local::{LocalPeer, LocalRoom};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::game::types::ParticipantId;

/// Well-known replicated state keys
pub mod keys {
    /// Room-wide: authoritative projectile snapshot
    pub const BULLETS: &str = "bullets";
    /// Room-wide: authoritative hit snapshot
    pub const HITS: &str = "hits";

    /// Per participant: single-slot fire request awaiting host pickup
    pub const PENDING_BULLET: &str = "pendingBullet";
    pub const HEALTH: &str = "health";
    pub const DEATHS: &str = "deaths";
    pub const KILLS: &str = "kills";
    /// Per participant: weapon and skin
    pub const CHARACTER: &str = "character";
    /// Per participant: profile published by the room service (name, color)
    pub const PROFILE: &str = "profile";
}

/// Change notification emitted by the room transport
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantJoined(ParticipantId),
    ParticipantQuit(ParticipantId),
    RoomStateChanged {
        key: String,
    },
    ParticipantStateChanged {
        participant: ParticipantId,
        key: String,
    },
}

/// Interface the sync core consumes from the room service.
///
/// Writing [`Value::Null`] clears a key; readers never observe `Some(Null)`.
pub trait RoomTransport: Send + Sync + 'static {
    /// Whether this process currently holds host authority
    fn is_host(&self) -> bool;

    fn local_participant(&self) -> ParticipantId;

    /// Participants currently connected, in join order
    fn participants(&self) -> Vec<ParticipantId>;

    fn participant_state(&self, participant: &ParticipantId, key: &str) -> Option<Value>;

    fn set_participant_state(&self, participant: &ParticipantId, key: &str, value: Value);

    fn room_state(&self, key: &str) -> Option<Value>;

    fn set_room_state(&self, key: &str, value: Value);

    /// Subscribe to join/quit and state change notifications
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;
}
