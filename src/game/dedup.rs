//! Fire request deduplication
//!
//! Duplicate network notifications must never render the same shot twice, so
//! every process keeps a bounded record of the projectile ids it has already
//! accepted.

use std::collections::{HashSet, VecDeque};

use super::types::ProjectileId;

/// Bounded set of recently accepted projectile ids.
///
/// Once more than `capacity` ids are held, the oldest half (by insertion
/// order) is discarded.
#[derive(Debug)]
pub struct FireDeduplicator {
    capacity: usize,
    order: VecDeque<ProjectileId>,
    seen: HashSet<ProjectileId>,
}

impl FireDeduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
        }
    }

    /// Returns `true` and records the id if it has not been seen, `false` otherwise
    pub fn request_fire(&mut self, id: &ProjectileId) -> bool {
        if self.seen.contains(id) {
            return false;
        }

        self.seen.insert(id.clone());
        self.order.push_back(id.clone());

        if self.order.len() > self.capacity {
            self.trim();
        }
        true
    }

    /// Whether `id` is currently remembered
    pub fn contains(&self, id: &ProjectileId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keep only the newest `capacity / 2` ids
    fn trim(&mut self) {
        let keep = self.capacity / 2;
        while self.order.len() > keep {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ProjectileId {
        ProjectileId::new(format!("p{n}"))
    }

    #[test]
    fn rejects_repeated_ids() {
        let mut dedup = FireDeduplicator::new(100);
        assert!(dedup.request_fire(&id(1)));
        assert!(!dedup.request_fire(&id(1)));
        assert!(dedup.request_fire(&id(2)));
    }

    #[test]
    fn trims_oldest_half_by_insertion_order() {
        let mut dedup = FireDeduplicator::new(100);
        for n in 0..=100 {
            assert!(dedup.request_fire(&id(n)));
        }

        // 101 inserted, trimmed down to the newest 50
        assert_eq!(dedup.len(), 50);
        assert!(!dedup.contains(&id(0)));
        assert!(!dedup.contains(&id(50)));
        assert!(dedup.contains(&id(51)));
        assert!(dedup.contains(&id(100)));
    }

    #[test]
    fn re_requesting_an_old_id_does_not_refresh_it() {
        let mut dedup = FireDeduplicator::new(4);
        for n in 0..4 {
            dedup.request_fire(&id(n));
        }
        // Duplicate of the oldest entry is rejected and keeps its position
        assert!(!dedup.request_fire(&id(0)));
        dedup.request_fire(&id(4));

        assert!(!dedup.contains(&id(0)));
        assert!(dedup.contains(&id(4)));
    }

    #[test]
    fn never_accepts_twice_and_stays_bounded() {
        let mut dedup = FireDeduplicator::new(10);
        let mut accepted = std::collections::HashSet::new();

        // Ids repeat with a short period so duplicates arrive while still remembered
        for step in 0..1_000usize {
            let candidate = id(step / 3);
            if dedup.request_fire(&candidate) {
                assert!(accepted.insert(candidate), "id accepted twice");
            }
            assert!(dedup.len() <= dedup.capacity() * 2);
        }
    }
}
