//! Non-host reconciliation of replicated snapshots with local predictions

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

use super::error::SyncError;
use super::types::{Hit, ParticipantId, Projectile, ProjectileId};

/// Merges the host's projectile snapshot with projectiles this peer fired
/// but the host has not broadcast yet.
///
/// An id that has appeared in a snapshot is acknowledged; once the host drops
/// it again (it was resolved) the local copy is not resurrected.
#[derive(Debug, Default)]
pub struct Reconciler {
    acknowledged: HashSet<ProjectileId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `network ∪ {own, unacknowledged entries of current missing from network}`
    pub fn merge_projectiles(
        &mut self,
        current: &[Projectile],
        network: Vec<Projectile>,
        me: &ParticipantId,
    ) -> Vec<Projectile> {
        let network_ids: HashSet<&ProjectileId> = network.iter().map(|p| &p.id).collect();

        let pending: Vec<Projectile> = current
            .iter()
            .filter(|p| {
                &p.owner == me
                    && !network_ids.contains(&p.id)
                    && !self.acknowledged.contains(&p.id)
            })
            .cloned()
            .collect();

        self.acknowledged = network_ids.into_iter().cloned().collect();

        let mut merged = network;
        merged.extend(pending);
        merged
    }

    /// Whether the host has ever broadcast `id` while it was still in view
    pub fn is_acknowledged(&self, id: &ProjectileId) -> bool {
        self.acknowledged.contains(id)
    }

    /// Hits are never predicted; the network snapshot is the view
    pub fn mirror_hits(&self, network: Vec<Hit>) -> Vec<Hit> {
        network
    }
}

/// Decode a replicated snapshot; an absent key is an empty list
pub fn decode_snapshot<T: DeserializeOwned>(
    key: &str,
    value: Option<Value>,
) -> Result<Vec<T>, SyncError> {
    match value {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(|e| SyncError::malformed(key, e)),
    }
}
