//! Replicated wire types shared by every peer

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a connected peer, assigned by the room transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique projectile identifier. Never reused; a hit carries the id of the
/// projectile that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectileId(pub String);

impl ProjectileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id scoped to the firing participant
    pub fn generate(owner: &ParticipantId) -> Self {
        Self(format!("{}-{}", owner, Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A fired shot. Kinematics are owned by the physics collaborator and are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projectile {
    pub id: ProjectileId,
    /// Owning participant
    #[serde(rename = "player")]
    pub owner: ParticipantId,
    pub position: Vec3,
    /// Heading in radians
    pub angle: f32,
    pub speed: f32,
    /// Unix millis at creation
    pub created_at: u64,
}

impl Projectile {
    pub fn new(
        owner: ParticipantId,
        position: Vec3,
        angle: f32,
        speed: f32,
        created_at: u64,
    ) -> Self {
        Self {
            id: ProjectileId::generate(&owner),
            owner,
            position,
            angle,
            speed,
            created_at,
        }
    }
}

/// A transient impact effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    /// Id of the projectile that produced this hit
    pub id: ProjectileId,
    pub position: Vec3,
    #[serde(default)]
    pub created_at: u64,
}

/// Weapon and skin chosen by a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub weapon: String,
    pub skin: String,
}

pub const DEFAULT_WEAPON: &str = "AK";
pub const DEFAULT_SKIN: &str = "#4ecdc4";

impl Default for Loadout {
    fn default() -> Self {
        Self {
            weapon: DEFAULT_WEAPON.to_string(),
            skin: DEFAULT_SKIN.to_string(),
        }
    }
}

/// Starting health of a freshly joined or respawned participant
pub const MAX_HEALTH: u32 = 100;

/// Mutable per-participant counters, stored in the participant's own
/// replicated slot but written only by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub health: u32,
    pub deaths: u32,
    pub kills: u32,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            deaths: 0,
            kills: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projectile_uses_replicated_field_names() {
        let projectile = Projectile {
            id: ProjectileId::new("p1"),
            owner: ParticipantId::new("alice"),
            position: Vec3::new(1.0, 0.0, 2.0),
            angle: 0.5,
            speed: 20.0,
            created_at: 7,
        };

        let value = serde_json::to_value(&projectile).unwrap();
        assert_eq!(value["id"], json!("p1"));
        assert_eq!(value["player"], json!("alice"));
        assert_eq!(value["createdAt"], json!(7));
    }

    #[test]
    fn hit_without_timestamp_still_parses() {
        let hit: Hit =
            serde_json::from_value(json!({"id": "p1", "position": {"x": 3.0, "y": 0.0, "z": 5.0}}))
                .unwrap();
        assert_eq!(hit.position, Vec3::new(3.0, 0.0, 5.0));
        assert_eq!(hit.created_at, 0);
    }

    #[test]
    fn generated_ids_are_unique_and_owner_scoped() {
        let owner = ParticipantId::new("bob");
        let a = ProjectileId::generate(&owner);
        let b = ProjectileId::generate(&owner);
        assert_ne!(a, b);
        assert!(a.0.starts_with("bob-"));
    }
}
