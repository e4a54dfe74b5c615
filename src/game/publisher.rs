//! State publisher
//!
//! Pushes the host's full registry snapshots into the room-wide replicated
//! state. Always whole snapshots, so a late joiner reads a complete view.

use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::room::{keys, RoomTransport};

use super::authority::HostToken;
use super::registry::{Entry, HitRegistry, ProjectileRegistry, Registry};

/// Which snapshots were pushed by a [`StatePublisher::publish`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Published {
    pub bullets: bool,
    pub hits: bool,
}

#[derive(Debug, Default)]
pub struct StatePublisher {
    bullets_revision: Option<u64>,
    hits_revision: Option<u64>,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish whichever registries changed since the last call.
    ///
    /// Hits go out before bullets: a peer applying them in order may briefly
    /// see a resolved projectile next to its hit, but never neither.
    pub fn publish(
        &mut self,
        transport: &dyn RoomTransport,
        _token: &HostToken,
        projectiles: &ProjectileRegistry,
        hits: &HitRegistry,
    ) -> Published {
        let hits_sent = push_if_changed(transport, keys::HITS, hits, &mut self.hits_revision);
        let bullets_sent = push_if_changed(
            transport,
            keys::BULLETS,
            projectiles,
            &mut self.bullets_revision,
        );

        Published {
            bullets: bullets_sent,
            hits: hits_sent,
        }
    }

    /// Force the next [`publish`](Self::publish) to push both snapshots
    pub fn invalidate(&mut self) {
        self.bullets_revision = None;
        self.hits_revision = None;
    }
}

fn push_if_changed<T: Entry + Serialize>(
    transport: &dyn RoomTransport,
    key: &str,
    registry: &Registry<T>,
    last: &mut Option<u64>,
) -> bool {
    if *last == Some(registry.revision()) {
        return false;
    }

    match serde_json::to_value(registry.list()) {
        Ok(value) => {
            let len = match &value {
                Value::Array(items) => items.len(),
                _ => 0,
            };
            transport.set_room_state(key, value);
            *last = Some(registry.revision());
            trace!(key, len, "Published snapshot");
            true
        }
        Err(e) => {
            warn!(key, error = %e, "Failed to encode snapshot");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::host_token;
    use crate::game::types::{Hit, ParticipantId, Projectile, ProjectileId, Vec3};
    use crate::room::LocalRoom;
    use serde_json::json;

    #[test]
    fn publishes_only_changed_registries() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let token = host_token(&host).unwrap();

        let mut projectiles = ProjectileRegistry::new();
        let hits = HitRegistry::new();
        let mut publisher = StatePublisher::new();

        let first = publisher.publish(&host, &token, &projectiles, &hits);
        assert_eq!(first, Published { bullets: true, hits: true });
        assert_eq!(host.room_state(keys::BULLETS), Some(json!([])));

        let again = publisher.publish(&host, &token, &projectiles, &hits);
        assert_eq!(again, Published::default());

        projectiles.add(
            &token,
            Projectile::new(ParticipantId::new("host"), Vec3::default(), 0.0, 1.0, 0),
        );
        let after_fire = publisher.publish(&host, &token, &projectiles, &hits);
        assert_eq!(after_fire, Published { bullets: true, hits: false });
    }

    #[test]
    fn snapshot_is_full_list() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let token = host_token(&host).unwrap();

        let projectiles = ProjectileRegistry::new();
        let mut hits = HitRegistry::new();
        for id in ["a", "b"] {
            hits.add(
                &token,
                Hit {
                    id: ProjectileId::new(id),
                    position: Vec3::default(),
                    created_at: 0,
                },
            );
        }

        let mut publisher = StatePublisher::new();
        publisher.publish(&host, &token, &projectiles, &hits);

        let published = host.room_state(keys::HITS).unwrap();
        assert_eq!(published.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn invalidate_forces_republish() {
        let room = LocalRoom::new();
        let host = room.join("host");
        let token = host_token(&host).unwrap();
        let (projectiles, hits) = (ProjectileRegistry::new(), HitRegistry::new());

        let mut publisher = StatePublisher::new();
        publisher.publish(&host, &token, &projectiles, &hits);
        publisher.invalidate();

        let forced = publisher.publish(&host, &token, &projectiles, &hits);
        assert_eq!(forced, Published { bullets: true, hits: true });
    }
}
