//! Kill ledger and combat counters
//!
//! Counters live in each participant's replicated slot. Only the host writes
//! them, always as a read-modify-write against the value currently in the
//! slot. Kill totals of participants with a linked external identity are
//! written to persistence through a single-slot debounce: one pending value
//! and one timer per participant, so only the latest total is ever sent.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::room::{keys, RoomTransport};
use crate::store::supabase::SupabaseError;

use super::authority::HostToken;
use super::error::SyncError;
use super::roster::{read_u32, Roster};
use super::types::{ParticipantId, MAX_HEALTH};

/// Result of a persistence write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub accepted: bool,
    pub is_new_highscore: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Highscore store error: {0}")]
    Store(#[from] SupabaseError),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

/// Durable kill totals, keyed by external identity (wallet address)
pub trait KillPersistence: Send + Sync + 'static {
    fn persist_kill_count<'a>(
        &'a self,
        identity: &'a str,
        total_kills: u32,
    ) -> BoxFuture<'a, Result<PersistOutcome, PersistError>>;
}

/// Outcome of [`KillLedger::apply_damage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub health: u32,
    pub killed: bool,
    /// Attacker's kill total after this hit, if it was a kill
    pub killer_kills: Option<u32>,
}

#[derive(Debug, Default)]
struct DebounceSlot {
    identity: String,
    latest: u32,
    last_saved: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

type Slots = Arc<Mutex<HashMap<ParticipantId, DebounceSlot>>>;

pub struct KillLedger {
    persistence: Option<Arc<dyn KillPersistence>>,
    debounce: Duration,
    slots: Slots,
}

impl KillLedger {
    pub fn new(persistence: Option<Arc<dyn KillPersistence>>, debounce: Duration) -> Self {
        Self {
            persistence,
            debounce,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Increment the killer's replicated kill counter by one. Host only.
    pub fn record_kill(
        &self,
        transport: &dyn RoomTransport,
        _token: &HostToken,
        roster: &Roster,
        killer: &ParticipantId,
    ) -> Result<u32, SyncError> {
        if !roster.contains(killer) {
            warn!(killer = %killer, "Could not find killer in roster, kill not recorded");
            return Err(SyncError::UnknownParticipant(killer.clone()));
        }

        let kills = read_u32(transport, killer, keys::KILLS).unwrap_or(0).saturating_add(1);
        transport.set_participant_state(killer, keys::KILLS, json!(kills));

        info!(killer = %killer, kills, "Kill registered");

        if killer == roster.local() {
            self.observe_kills(killer, kills);
        }
        Ok(kills)
    }

    /// Subtract `damage` from the victim's health. At zero the victim's
    /// deaths go up by one and the attacker, if any, is credited a kill.
    /// Host only.
    pub fn apply_damage(
        &self,
        transport: &dyn RoomTransport,
        token: &HostToken,
        roster: &Roster,
        victim: &ParticipantId,
        damage: u32,
        attacker: Option<&ParticipantId>,
    ) -> Result<DamageOutcome, SyncError> {
        if !roster.contains(victim) {
            warn!(victim = %victim, "Damage to unknown participant ignored");
            return Err(SyncError::UnknownParticipant(victim.clone()));
        }

        let health = read_u32(transport, victim, keys::HEALTH).unwrap_or(MAX_HEALTH);
        if health == 0 {
            // Already dead, waiting for respawn
            return Ok(DamageOutcome {
                health: 0,
                killed: false,
                killer_kills: None,
            });
        }

        let health = health.saturating_sub(damage);
        transport.set_participant_state(victim, keys::HEALTH, json!(health));

        if health > 0 {
            return Ok(DamageOutcome {
                health,
                killed: false,
                killer_kills: None,
            });
        }

        let deaths = read_u32(transport, victim, keys::DEATHS).unwrap_or(0).saturating_add(1);
        transport.set_participant_state(victim, keys::DEATHS, json!(deaths));
        debug!(victim = %victim, deaths, "Participant died");

        let killer_kills = match attacker {
            Some(attacker) if attacker != victim => {
                self.record_kill(transport, token, roster, attacker).ok()
            }
            _ => None,
        };

        Ok(DamageOutcome {
            health: 0,
            killed: true,
            killer_kills,
        })
    }

    /// Restore a participant to full health. Host only.
    pub fn respawn(
        &self,
        transport: &dyn RoomTransport,
        _token: &HostToken,
        roster: &Roster,
        participant: &ParticipantId,
    ) -> Result<(), SyncError> {
        if !roster.contains(participant) {
            warn!(participant = %participant, "Respawn of unknown participant ignored");
            return Err(SyncError::UnknownParticipant(participant.clone()));
        }
        transport.set_participant_state(participant, keys::HEALTH, json!(MAX_HEALTH));
        Ok(())
    }

    /// Associate an external identity with a participant so its kill total
    /// gets persisted
    pub fn link_identity(&self, participant: &ParticipantId, identity: impl Into<String>) {
        let identity = identity.into();
        info!(participant = %participant, identity = %identity, "External identity linked");

        let mut slots = self.slots.lock();
        let slot = slots.entry(participant.clone()).or_default();
        slot.identity = identity;
    }

    pub fn is_linked(&self, participant: &ParticipantId) -> bool {
        self.slots.lock().contains_key(participant)
    }

    /// Feed the participant's latest kill total into its debounce slot.
    /// No-op unless an identity is linked and persistence is configured.
    pub fn observe_kills(&self, participant: &ParticipantId, kills: u32) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };

        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(participant) else {
            return;
        };

        slot.latest = slot.latest.max(kills);
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }

        let generation = slot.generation;
        let task = PersistTask {
            slots: Arc::clone(&self.slots),
            persistence,
            participant: participant.clone(),
            generation,
            delay: self.debounce,
        };
        slot.timer = Some(tokio::spawn(task.run()));
    }

    /// Cancel any pending write for a participant and forget its slot
    pub fn cancel(&self, participant: &ParticipantId) {
        if let Some(slot) = self.slots.lock().remove(participant) {
            if let Some(timer) = slot.timer {
                timer.abort();
                debug!(participant = %participant, "Pending kill persistence cancelled");
            }
        }
    }

    /// Cancel every pending write
    pub fn cancel_all(&self) {
        for (_, slot) in self.slots.lock().drain() {
            if let Some(timer) = slot.timer {
                timer.abort();
            }
        }
    }

    /// Last total successfully persisted for a participant
    pub fn last_saved(&self, participant: &ParticipantId) -> Option<u32> {
        self.slots.lock().get(participant).map(|s| s.last_saved)
    }
}

impl Drop for KillLedger {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct PersistTask {
    slots: Slots,
    persistence: Arc<dyn KillPersistence>,
    participant: ParticipantId,
    generation: u64,
    delay: Duration,
}

impl PersistTask {
    async fn run(self) {
        tokio::time::sleep(self.delay).await;

        let (identity, total) = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(&self.participant) else {
                return;
            };
            if slot.generation != self.generation {
                return;
            }
            // Past this point a newer kill must not abort the in-flight write
            slot.timer = None;
            if slot.latest <= slot.last_saved {
                return;
            }
            (slot.identity.clone(), slot.latest)
        };

        match self.persistence.persist_kill_count(&identity, total).await {
            Ok(outcome) => {
                if let Some(slot) = self.slots.lock().get_mut(&self.participant) {
                    slot.last_saved = slot.last_saved.max(total);
                }
                if outcome.is_new_highscore {
                    info!(participant = %self.participant, kills = total, "New highscore saved");
                } else {
                    debug!(participant = %self.participant, kills = total, "Kill total persisted");
                }
            }
            Err(e) => {
                // Retried with the latest total on the next debounce window
                warn!(participant = %self.participant, kills = total, error = %e, "Failed to persist kill total");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::authority::host_token;
    use crate::room::LocalRoom;

    /// Records every persistence call
    #[derive(Default)]
    pub(crate) struct RecordingPersistence {
        pub calls: Mutex<Vec<(String, u32)>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl RecordingPersistence {
        pub fn totals(&self) -> Vec<u32> {
            self.calls.lock().iter().map(|(_, k)| *k).collect()
        }
    }

    impl KillPersistence for RecordingPersistence {
        fn persist_kill_count<'a>(
            &'a self,
            identity: &'a str,
            total_kills: u32,
        ) -> BoxFuture<'a, Result<PersistOutcome, PersistError>> {
            Box::pin(async move {
                self.calls.lock().push((identity.to_string(), total_kills));
                if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(PersistError::Unavailable("offline".to_string()));
                }
                Ok(PersistOutcome {
                    accepted: true,
                    is_new_highscore: true,
                })
            })
        }
    }

    fn ledger_with(persistence: &Arc<RecordingPersistence>) -> KillLedger {
        let persistence: Arc<dyn KillPersistence> = persistence.clone();
        KillLedger::new(Some(persistence), Duration::from_millis(2_000))
    }

    fn room_with_roster() -> (Arc<LocalRoom>, crate::room::LocalPeer, Roster) {
        let room = LocalRoom::new();
        let host = room.join("a");
        room.join("b");
        let mut roster = Roster::new(ParticipantId::new("a"));
        roster.join(ParticipantId::new("b"));
        (room, host, roster)
    }

    #[test]
    fn record_kill_reads_current_replicated_value() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let ledger = KillLedger::new(None, Duration::from_millis(2_000));
        let a = ParticipantId::new("a");

        host.set_participant_state(&a, keys::KILLS, json!(4));
        assert_eq!(ledger.record_kill(&host, &token, &roster, &a), Ok(5));
        assert_eq!(ledger.record_kill(&host, &token, &roster, &a), Ok(6));
        assert_eq!(read_u32(&host, &a, keys::KILLS), Some(6));
    }

    #[test]
    fn record_kill_for_unknown_participant_is_rejected() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let ledger = KillLedger::new(None, Duration::from_millis(2_000));

        let ghost = ParticipantId::new("ghost");
        assert_eq!(
            ledger.record_kill(&host, &token, &roster, &ghost),
            Err(SyncError::UnknownParticipant(ghost))
        );
    }

    #[test]
    fn lethal_damage_credits_attacker_once() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let ledger = KillLedger::new(None, Duration::from_millis(2_000));
        let (a, b) = (ParticipantId::new("a"), ParticipantId::new("b"));

        let hit = ledger.apply_damage(&host, &token, &roster, &b, 60, Some(&a)).unwrap();
        assert_eq!(hit.health, 40);
        assert!(!hit.killed);

        let lethal = ledger.apply_damage(&host, &token, &roster, &b, 60, Some(&a)).unwrap();
        assert!(lethal.killed);
        assert_eq!(lethal.killer_kills, Some(1));
        assert_eq!(read_u32(&host, &b, keys::DEATHS), Some(1));

        // Corpse hits do nothing until respawn
        let corpse = ledger.apply_damage(&host, &token, &roster, &b, 60, Some(&a)).unwrap();
        assert!(!corpse.killed);
        assert_eq!(read_u32(&host, &a, keys::KILLS), Some(1));

        ledger.respawn(&host, &token, &roster, &b).unwrap();
        assert_eq!(read_u32(&host, &b, keys::HEALTH), Some(MAX_HEALTH));
    }

    #[tokio::test(start_paused = true)]
    async fn unlinked_killer_is_never_persisted() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let persistence = Arc::new(RecordingPersistence::default());
        let ledger = ledger_with(&persistence);

        ledger
            .record_kill(&host, &token, &roster, &ParticipantId::new("a"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5_000)).await;

        assert!(persistence.totals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_kill_persists_after_window() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let persistence = Arc::new(RecordingPersistence::default());
        let ledger = ledger_with(&persistence);
        let a = ParticipantId::new("a");
        ledger.link_identity(&a, "wallet-a");

        ledger.record_kill(&host, &token, &roster, &a).unwrap();

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(persistence.totals().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            *persistence.calls.lock(),
            vec![("wallet-a".to_string(), 1)]
        );
        assert_eq!(ledger.last_saved(&a), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn kills_within_window_coalesce_to_latest() {
        let (_room, host, roster) = room_with_roster();
        let token = host_token(&host).unwrap();
        let persistence = Arc::new(RecordingPersistence::default());
        let ledger = ledger_with(&persistence);
        let a = ParticipantId::new("a");
        ledger.link_identity(&a, "wallet-a");

        ledger.record_kill(&host, &token, &roster, &a).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        ledger.record_kill(&host, &token, &roster, &a).unwrap();

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(persistence.totals(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_totals_never_decrease() {
        let persistence = Arc::new(RecordingPersistence::default());
        let ledger = ledger_with(&persistence);
        let a = ParticipantId::new("a");
        ledger.link_identity(&a, "wallet-a");

        ledger.observe_kills(&a, 3);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        // A stale, lower observation must not be sent
        ledger.observe_kills(&a, 2);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        ledger.observe_kills(&a, 4);
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(persistence.totals(), vec![3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried_on_next_window() {
        let persistence = Arc::new(RecordingPersistence::default());
        persistence.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let ledger = ledger_with(&persistence);
        let a = ParticipantId::new("a");
        ledger.link_identity(&a, "wallet-a");

        ledger.observe_kills(&a, 1);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(ledger.last_saved(&a), Some(0));

        persistence.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        ledger.observe_kills(&a, 2);
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(persistence.totals(), vec![1, 2]);
        assert_eq!(ledger.last_saved(&a), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_write() {
        let persistence = Arc::new(RecordingPersistence::default());
        let ledger = ledger_with(&persistence);
        let a = ParticipantId::new("a");
        ledger.link_identity(&a, "wallet-a");

        ledger.observe_kills(&a, 1);
        ledger.cancel(&a);
        tokio::time::sleep(Duration::from_millis(5_000)).await;

        assert!(persistence.totals().is_empty());
        assert!(!ledger.is_linked(&a));
    }
}
