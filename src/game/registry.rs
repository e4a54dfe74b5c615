//! Projectile and hit registries
//!
//! On the host these are the single source of truth and every mutation needs
//! a [`HostToken`]. On other peers the same structure holds the read-only
//! mirror (plus local predictions), written only through the crate-internal
//! mirror methods used by the reconciler.

use tracing::warn;

use super::authority::HostToken;
use super::types::{Hit, Projectile, ProjectileId};

/// An entry keyed by projectile id
pub trait Entry: Clone {
    fn id(&self) -> &ProjectileId;
    fn created_at(&self) -> u64;
}

impl Entry for Projectile {
    fn id(&self) -> &ProjectileId {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

impl Entry for Hit {
    fn id(&self) -> &ProjectileId {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Ordered list with at most one entry per id
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    revision: u64,
}

pub type ProjectileRegistry = Registry<Projectile>;
pub type HitRegistry = Registry<Hit>;

impl<T: Entry> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            revision: 0,
        }
    }

    /// Append an entry. Returns `false` if its id is already present.
    pub fn add(&mut self, _token: &HostToken, entry: T) -> bool {
        self.insert(entry)
    }

    /// Remove by id. Removing an absent id is a no-op.
    pub fn remove(&mut self, _token: &HostToken, id: &ProjectileId) -> Option<T> {
        self.take(id)
    }

    /// Remove every entry for which `keep` returns false
    pub fn retain(&mut self, _token: &HostToken, keep: impl FnMut(&T) -> bool) -> Vec<T> {
        self.prune(keep)
    }

    pub fn list(&self) -> &[T] {
        &self.entries
    }

    /// Owned copy for readers outside the owning lock
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.clone()
    }

    pub fn contains(&self, id: &ProjectileId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    pub fn get(&self, id: &ProjectileId) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every change; used by the publisher to skip unchanged lists
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Add a locally predicted entry to a non-host view
    pub(crate) fn predict(&mut self, entry: T) -> bool {
        self.insert(entry)
    }

    /// Replace a non-host view wholesale
    pub(crate) fn mirror(&mut self, entries: Vec<T>) {
        if self.entries.len() == entries.len()
            && self.entries.iter().zip(&entries).all(|(a, b)| a.id() == b.id())
        {
            self.entries = entries;
            return;
        }
        self.entries = entries;
        self.revision += 1;
    }

    pub(crate) fn prune(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if keep(e) {
                true
            } else {
                removed.push(e.clone());
                false
            }
        });
        if !removed.is_empty() {
            self.revision += 1;
        }
        removed
    }

    fn insert(&mut self, entry: T) -> bool {
        if self.contains(entry.id()) {
            warn!(id = %entry.id(), "Registry already holds this id");
            return false;
        }
        self.entries.push(entry);
        self.revision += 1;
        true
    }

    fn take(&mut self, id: &ProjectileId) -> Option<T> {
        let pos = self.entries.iter().position(|e| e.id() == id)?;
        self.revision += 1;
        Some(self.entries.remove(pos))
    }
}

impl<T: Entry> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::host_token;
    use crate::game::types::{ParticipantId, Vec3};
    use crate::room::LocalRoom;

    fn projectile(id: &str, created_at: u64) -> Projectile {
        Projectile {
            id: ProjectileId::new(id),
            owner: ParticipantId::new("host"),
            position: Vec3::default(),
            angle: 0.0,
            speed: 20.0,
            created_at,
        }
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let room = LocalRoom::new();
        let token = host_token(&room.join("host")).unwrap();
        let mut registry = ProjectileRegistry::new();

        assert!(registry.add(&token, projectile("p1", 0)));
        assert!(!registry.add(&token, projectile("p1", 5)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let room = LocalRoom::new();
        let token = host_token(&room.join("host")).unwrap();
        let mut registry = ProjectileRegistry::new();
        registry.add(&token, projectile("p1", 0));
        let revision = registry.revision();

        assert!(registry.remove(&token, &ProjectileId::new("nope")).is_none());
        assert_eq!(registry.revision(), revision);
        assert!(registry.remove(&token, &ProjectileId::new("p1")).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let room = LocalRoom::new();
        let token = host_token(&room.join("host")).unwrap();
        let mut registry = ProjectileRegistry::new();
        for id in ["c", "a", "b"] {
            registry.add(&token, projectile(id, 0));
        }

        let ids: Vec<_> = registry.list().iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn retain_reports_removed_entries() {
        let room = LocalRoom::new();
        let token = host_token(&room.join("host")).unwrap();
        let mut registry = ProjectileRegistry::new();
        registry.add(&token, projectile("old", 0));
        registry.add(&token, projectile("new", 100));

        let removed = registry.retain(&token, |p| p.created_at >= 50);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id.0, "old");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn mirror_with_same_ids_keeps_revision() {
        let mut registry = ProjectileRegistry::new();
        registry.mirror(vec![projectile("p1", 0)]);
        let revision = registry.revision();

        registry.mirror(vec![projectile("p1", 0)]);
        assert_eq!(registry.revision(), revision);

        registry.mirror(Vec::new());
        assert!(registry.revision() > revision);
    }
}
