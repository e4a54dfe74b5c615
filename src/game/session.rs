//! Per-process arena session
//!
//! One `ArenaSession` per participant process owns the deduplicator, the
//! registries, the reconciler and the kill ledger. All registry mutation is
//! serialized through a single lock, and readers get owned snapshots taken
//! under that same lock, so a collision (projectile out, hit in) is atomic
//! for them.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::room::{keys, RoomEvent, RoomTransport};
use crate::util::time::{age_millis, unix_millis};

use super::authority::{self, host_token, FireOutcome, HostToken};
use super::dedup::FireDeduplicator;
use super::error::SyncError;
use super::kills::{DamageOutcome, KillLedger, KillPersistence};
use super::publisher::StatePublisher;
use super::reconcile::{decode_snapshot, Reconciler};
use super::registry::{HitRegistry, ProjectileRegistry};
use super::roster::{self, read_u32, Roster};
use super::types::{Hit, ParticipantId, Projectile, ProjectileId, Vec3};

/// Consistent read-only view for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArenaView {
    pub projectiles: Vec<Projectile>,
    pub hits: Vec<Hit>,
}

/// Mutable state guarded by the session lock
struct SyncState {
    roster: Roster,
    dedup: FireDeduplicator,
    projectiles: ProjectileRegistry,
    hits: HitRegistry,
    publisher: StatePublisher,
    reconciler: Reconciler,
}

pub struct ArenaSession {
    transport: Arc<dyn RoomTransport>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    ledger: KillLedger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ArenaSession {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        config: SyncConfig,
        persistence: Option<Arc<dyn KillPersistence>>,
    ) -> Arc<Self> {
        let local = transport.local_participant();
        let mut roster = Roster::new(local);
        for participant in transport.participants() {
            roster.join(participant);
        }

        let state = SyncState {
            roster,
            dedup: FireDeduplicator::new(config.dedup_capacity),
            projectiles: ProjectileRegistry::new(),
            hits: HitRegistry::new(),
            publisher: StatePublisher::new(),
            reconciler: Reconciler::new(),
        };

        Arc::new(Self {
            ledger: KillLedger::new(persistence, config.persist_debounce),
            transport,
            config,
            state: Mutex::new(state),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Announce this participant and spawn the poll and event loops
    pub fn start(self: &Arc<Self>, weapon: &str) {
        let events = self.transport.subscribe();

        roster::publish_own_loadout(self.transport.as_ref(), weapon);

        match host_token(self.transport.as_ref()) {
            Ok(token) => {
                let mut state = self.state.lock();
                let ids: Vec<ParticipantId> = state.roster.ids().cloned().collect();
                for id in &ids {
                    roster::init_participant(self.transport.as_ref(), &token, id);
                }
                state.publisher.invalidate();
                self.publish_locked(&mut state, &token);
            }
            Err(_) => self.resync(),
        }

        info!(
            participant = %self.local_participant(),
            host = self.is_host(),
            "Arena session started"
        );

        let poll = tokio::spawn(poll_loop(Arc::downgrade(self), self.config.poll_interval));
        let event = tokio::spawn(event_loop(Arc::downgrade(self), events));
        self.tasks.lock().extend([poll, event]);
    }

    /// Stop background loops and cancel pending persistence writes
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.ledger.cancel_all();
        info!(participant = %self.local_participant(), "Arena session stopped");
    }

    pub fn is_host(&self) -> bool {
        self.transport.is_host()
    }

    pub fn local_participant(&self) -> ParticipantId {
        self.transport.local_participant()
    }

    pub fn transport(&self) -> &Arc<dyn RoomTransport> {
        &self.transport
    }

    // ------------------------------------------------------------------
    // Fire path
    // ------------------------------------------------------------------

    /// Fire a new projectile owned by this participant
    pub fn fire_at(&self, position: Vec3, angle: f32, speed: f32) -> (ProjectileId, FireOutcome) {
        let projectile = Projectile::new(self.local_participant(), position, angle, speed, unix_millis());
        let id = projectile.id.clone();
        (id, self.fire(projectile))
    }

    /// Route a locally fired projectile. Every peer shows it immediately; the
    /// host makes it authoritative, others forward it through their pending
    /// slot if that slot is free.
    pub fn fire(&self, projectile: Projectile) -> FireOutcome {
        let mut state = self.state.lock();

        if !state.dedup.request_fire(&projectile.id) {
            debug!(projectile = %projectile.id, "Duplicate fire ignored");
            return FireOutcome::Duplicate;
        }

        match host_token(self.transport.as_ref()) {
            Ok(token) => {
                state.projectiles.add(&token, projectile);
                self.publish_locked(&mut state, &token);
                FireOutcome::Authoritative
            }
            Err(_) => {
                let forwarded = authority::forward_to_host(self.transport.as_ref(), &projectile);
                state.projectiles.predict(projectile);
                if forwarded {
                    FireOutcome::Forwarded
                } else {
                    FireOutcome::Throttled
                }
            }
        }
    }

    /// Host: move every participant's pending fire request into the registry
    pub fn poll_pending(&self) -> Result<usize, SyncError> {
        let token = host_token(self.transport.as_ref())?;
        let mut state = self.state.lock();
        let SyncState {
            roster,
            dedup,
            projectiles,
            ..
        } = &mut *state;

        let accepted = authority::drain_pending_requests(
            self.transport.as_ref(),
            &token,
            roster,
            dedup,
            unix_millis(),
            |projectile| {
                projectiles.add(&token, projectile);
            },
        );

        if accepted > 0 {
            self.publish_locked(&mut state, &token);
        }
        Ok(accepted)
    }

    // ------------------------------------------------------------------
    // Physics / effect callbacks
    // ------------------------------------------------------------------

    /// Host: a projectile hit something. Removes the projectile and records
    /// a hit with the same id in one step.
    pub fn on_collision(&self, id: &ProjectileId, position: Vec3) -> Result<(), SyncError> {
        let token = self.require_host("collision")?;
        let mut state = self.state.lock();

        if state.projectiles.remove(&token, id).is_none() {
            warn!(projectile = %id, "Collision for unknown projectile ignored");
            return Err(SyncError::UnknownProjectile(id.clone()));
        }
        state.hits.add(
            &token,
            Hit {
                id: id.clone(),
                position,
                created_at: unix_millis(),
            },
        );

        self.publish_locked(&mut state, &token);
        Ok(())
    }

    /// Host: the visual effect of a hit finished
    pub fn on_hit_effect_done(&self, id: &ProjectileId) -> Result<(), SyncError> {
        let token = self.require_host("hit effect completion")?;
        let mut state = self.state.lock();

        if state.hits.remove(&token, id).is_none() {
            warn!(hit = %id, "Completion for unknown hit ignored");
            return Err(SyncError::UnknownHit(id.clone()));
        }

        self.publish_locked(&mut state, &token);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    /// Host: credit `killer` with one kill
    pub fn record_kill(&self, killer: &ParticipantId) -> Result<u32, SyncError> {
        let token = self.require_host("kill")?;
        let state = self.state.lock();
        self.ledger
            .record_kill(self.transport.as_ref(), &token, &state.roster, killer)
    }

    /// Host: apply damage to `victim`, crediting `attacker` on a kill
    pub fn apply_damage(
        &self,
        victim: &ParticipantId,
        damage: u32,
        attacker: Option<&ParticipantId>,
    ) -> Result<DamageOutcome, SyncError> {
        let token = self.require_host("damage")?;
        let state = self.state.lock();
        self.ledger.apply_damage(
            self.transport.as_ref(),
            &token,
            &state.roster,
            victim,
            damage,
            attacker,
        )
    }

    /// Host: restore a participant to full health
    pub fn respawn(&self, participant: &ParticipantId) -> Result<(), SyncError> {
        let token = self.require_host("respawn")?;
        let state = self.state.lock();
        self.ledger
            .respawn(self.transport.as_ref(), &token, &state.roster, participant)
    }

    /// Link this participant to an external identity (wallet) so its kill
    /// total is persisted
    pub fn link_identity(&self, identity: impl Into<String>) {
        self.ledger.link_identity(&self.local_participant(), identity);
    }

    pub fn ledger(&self) -> &KillLedger {
        &self.ledger
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn projectiles(&self) -> Vec<Projectile> {
        self.state.lock().projectiles.snapshot()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.lock().hits.snapshot()
    }

    /// Projectiles and hits read under one lock
    pub fn view(&self) -> ArenaView {
        let state = self.state.lock();
        ArenaView {
            projectiles: state.projectiles.snapshot(),
            hits: state.hits.snapshot(),
        }
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.state.lock().roster.ids().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    /// Apply one room notification
    pub fn handle_event(&self, event: RoomEvent) {
        match event {
            RoomEvent::ParticipantJoined(id) => self.handle_join(id),
            RoomEvent::ParticipantQuit(id) => self.handle_quit(&id),
            RoomEvent::RoomStateChanged { key } => {
                if self.is_host() {
                    return;
                }
                match key.as_str() {
                    keys::BULLETS => self.reconcile_projectiles(),
                    keys::HITS => self.reconcile_hits(),
                    _ => {}
                }
            }
            RoomEvent::ParticipantStateChanged { participant, key } => {
                // The host feeds its own kills to the ledger directly
                if key == keys::KILLS && !self.is_host() && participant == self.local_participant() {
                    if let Some(kills) = read_u32(self.transport.as_ref(), &participant, keys::KILLS) {
                        self.ledger.observe_kills(&participant, kills);
                    }
                }
            }
        }
    }

    /// Rebuild roster and mirrors from the transport's current state
    pub fn resync(&self) {
        {
            let mut state = self.state.lock();
            let current = self.transport.participants();
            let departed: Vec<ParticipantId> = state
                .roster
                .others()
                .filter(|id| !current.contains(id))
                .cloned()
                .collect();
            for id in departed {
                state.roster.quit(&id);
                self.ledger.cancel(&id);
            }
            for id in current {
                state.roster.join(id);
            }
        }

        if !self.is_host() {
            self.reconcile_projectiles();
            self.reconcile_hits();
        }
    }

    fn handle_join(&self, id: ParticipantId) {
        let mut state = self.state.lock();
        if !state.roster.join(id.clone()) {
            return;
        }
        info!(participant = %id, "Participant joined arena");

        if let Ok(token) = host_token(self.transport.as_ref()) {
            roster::init_participant(self.transport.as_ref(), &token, &id);
        }
    }

    fn handle_quit(&self, id: &ParticipantId) {
        let mut state = self.state.lock();
        if state.roster.quit(id).is_none() {
            return;
        }
        self.ledger.cancel(id);

        match host_token(self.transport.as_ref()) {
            Ok(token) => {
                // Forget any unconsumed request; the roster no longer polls it
                self.transport
                    .set_participant_state(id, keys::PENDING_BULLET, Value::Null);
                let purged = state.projectiles.retain(&token, |p| &p.owner != id);
                if !purged.is_empty() {
                    self.publish_locked(&mut state, &token);
                }
            }
            Err(_) => {
                state.projectiles.prune(|p| &p.owner != id);
            }
        }
        info!(participant = %id, "Participant left arena");
    }

    fn reconcile_projectiles(&self) {
        let value = self.transport.room_state(keys::BULLETS);
        let network: Vec<Projectile> = match decode_snapshot(keys::BULLETS, value) {
            Ok(network) => network,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed projectile snapshot");
                return;
            }
        };

        let me = self.local_participant();
        let mut state = self.state.lock();
        let SyncState {
            projectiles,
            reconciler,
            ..
        } = &mut *state;

        let merged = reconciler.merge_projectiles(projectiles.list(), network, &me);
        projectiles.mirror(merged);
    }

    fn reconcile_hits(&self) {
        let value = self.transport.room_state(keys::HITS);
        let network: Vec<Hit> = match decode_snapshot(keys::HITS, value) {
            Ok(network) => network,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed hit snapshot");
                return;
            }
        };

        let mut state = self.state.lock();
        let hits = state.reconciler.mirror_hits(network);
        state.hits.mirror(hits);
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Drop projectiles and hits that outlived their TTL as of `now`
    /// (unix millis). The host expires authoritative entries and
    /// republishes; other peers only drop their own unacknowledged
    /// predictions.
    pub fn sweep_expired(&self, now: u64) {
        let projectile_ttl = self.config.projectile_ttl.as_millis() as u64;
        let hit_ttl = self.config.hit_ttl.as_millis() as u64;
        let mut state = self.state.lock();

        match host_token(self.transport.as_ref()) {
            Ok(token) => {
                let expired = state
                    .projectiles
                    .retain(&token, |p| age_millis(p.created_at, now) < projectile_ttl);
                let faded = state
                    .hits
                    .retain(&token, |h| age_millis(h.created_at, now) < hit_ttl);

                if !expired.is_empty() || !faded.is_empty() {
                    debug!(
                        projectiles = expired.len(),
                        hits = faded.len(),
                        "Expired authoritative entries"
                    );
                    self.publish_locked(&mut state, &token);
                }
            }
            Err(_) => {
                let SyncState {
                    projectiles,
                    reconciler,
                    ..
                } = &mut *state;
                let dropped = projectiles.prune(|p| {
                    reconciler.is_acknowledged(&p.id)
                        || age_millis(p.created_at, now) < projectile_ttl
                });
                if !dropped.is_empty() {
                    debug!(count = dropped.len(), "Dropped unconfirmed predictions");
                }
            }
        }
    }

    fn require_host(&self, operation: &'static str) -> Result<HostToken, SyncError> {
        host_token(self.transport.as_ref()).map_err(|e| {
            debug!(operation, "Rejected host-only operation on non-host peer");
            e
        })
    }

    fn publish_locked(&self, state: &mut SyncState, token: &HostToken) {
        state
            .publisher
            .publish(self.transport.as_ref(), token, &state.projectiles, &state.hits);
    }
}

impl Drop for ArenaSession {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Host drains pending requests on a fixed interval; every peer sweeps
/// expired entries on the same tick
async fn poll_loop(session: Weak<ArenaSession>, period: std::time::Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };

        if session.is_host() {
            if let Err(e) = session.poll_pending() {
                debug!(error = %e, "Pending request poll skipped");
            }
        }
        session.sweep_expired(unix_millis());
    }
}

async fn event_loop(session: Weak<ArenaSession>, mut events: broadcast::Receiver<RoomEvent>) {
    loop {
        let event = events.recv().await;
        let Some(session) = session.upgrade() else {
            break;
        };

        match event {
            Ok(event) => session.handle_event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged = n, "Room events lagged, resyncing");
                session.resync();
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Room event channel closed");
                break;
            }
        }
    }
}
