//! Bot-driven local arena
//!
//! Runs several sessions over one [`LocalRoom`]. Bots fire at random; the
//! host bot also plays the physics and effect collaborators, reporting
//! collisions, damage and effect completions.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::room::LocalRoom;
use crate::util::time::{age_millis, unix_millis};

use super::kills::KillPersistence;
use super::roster;
use super::session::ArenaSession;
use super::types::{ParticipantId, Vec3};

const WEAPONS: [&str; 4] = ["AK", "Sniper", "Shotgun", "Pistol"];
const ARENA_HALF_EXTENT: f32 = 20.0;
const PROJECTILE_SPEED: f32 = 20.0;
const DAMAGE_PER_HIT: u32 = 25;
/// A projectile must fly this long before the referee may resolve it
const MIN_FLIGHT_MS: u64 = 300;
/// A hit effect plays this long before completing
const HIT_EFFECT_MS: u64 = 200;

/// Where bot kill totals are saved, and the identity prefix each bot is
/// linked under (`{wallet_prefix}-bot-{n}`)
#[derive(Clone)]
pub struct SimPersistence {
    pub store: Arc<dyn KillPersistence>,
    pub wallet_prefix: String,
}

pub struct Simulation {
    room: Arc<LocalRoom>,
    sessions: Vec<Arc<ArenaSession>>,
    bots: Vec<JoinHandle<()>>,
}

impl Simulation {
    /// Join `peers` bots to a fresh room and start them. The first bot is host.
    pub fn start(
        peers: usize,
        config: &SyncConfig,
        tick: Duration,
        persistence: Option<SimPersistence>,
        seed: u64,
    ) -> Self {
        let room = LocalRoom::new();
        let mut sessions = Vec::with_capacity(peers);
        let mut bots = Vec::with_capacity(peers);
        let store = persistence.as_ref().map(|p| Arc::clone(&p.store));

        for index in 0..peers {
            let name = format!("bot-{index}");
            let peer = room.join(name.as_str());
            let session = ArenaSession::new(Arc::new(peer), config.clone(), store.clone());
            if let Some(persistence) = &persistence {
                session.link_identity(format!("{}-{}", persistence.wallet_prefix, name));
            }
            session.start(WEAPONS[index % WEAPONS.len()]);

            let rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64));
            bots.push(tokio::spawn(run_bot(Arc::clone(&session), tick, rng)));
            sessions.push(session);
        }

        info!(peers, persisted = persistence.is_some(), "Local arena simulation started");
        Self {
            room,
            sessions,
            bots,
        }
    }

    pub fn sessions(&self) -> &[Arc<ArenaSession>] {
        &self.sessions
    }

    pub fn host(&self) -> Option<&Arc<ArenaSession>> {
        self.sessions.iter().find(|s| s.is_host())
    }

    pub fn participant_count(&self) -> usize {
        self.room
            .host()
            .and_then(|host| self.sessions.iter().find(|s| s.local_participant() == host))
            .map(|host| host.participants().len())
            .unwrap_or(0)
    }

    /// Stop every bot and session
    pub fn shutdown(&self) {
        for bot in &self.bots {
            bot.abort();
        }
        for session in &self.sessions {
            session.shutdown();
        }
        info!("Local arena simulation stopped");
    }
}

async fn run_bot(session: Arc<ArenaSession>, tick: Duration, mut rng: ChaCha8Rng) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if rng.gen_bool(0.5) {
            let position = Vec3::new(
                rng.gen_range(-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT),
                0.0,
                rng.gen_range(-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT),
            );
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let (id, outcome) = session.fire_at(position, angle, PROJECTILE_SPEED);
            debug!(projectile = %id, ?outcome, "Bot fired");
        }

        if session.is_host() {
            referee_step(&session, &mut rng, unix_millis());
        }
    }
}

/// Stand in for physics and effects on the host: resolve some in-flight
/// projectiles, damage a random victim, finish old hit effects and respawn
/// the dead.
pub fn referee_step(session: &ArenaSession, rng: &mut impl Rng, now: u64) {
    let view = session.view();
    let participants = session.participants();

    for projectile in &view.projectiles {
        if age_millis(projectile.created_at, now) < MIN_FLIGHT_MS || !rng.gen_bool(0.3) {
            continue;
        }
        if session.on_collision(&projectile.id, projectile.position).is_err() {
            continue;
        }

        let victims: Vec<&ParticipantId> =
            participants.iter().filter(|p| **p != projectile.owner).collect();
        if victims.is_empty() || !rng.gen_bool(0.5) {
            continue;
        }
        let victim = victims[rng.gen_range(0..victims.len())];

        if let Ok(outcome) = session.apply_damage(victim, DAMAGE_PER_HIT, Some(&projectile.owner)) {
            if outcome.killed {
                info!(
                    killer = %projectile.owner,
                    victim = %victim,
                    kills = outcome.killer_kills.unwrap_or(0),
                    "Bot eliminated"
                );
            }
        }
    }

    for hit in &view.hits {
        if age_millis(hit.created_at, now) >= HIT_EFFECT_MS {
            if let Err(e) = session.on_hit_effect_done(&hit.id) {
                debug!(hit = %hit.id, error = %e, "Hit effect completion skipped");
            }
        }
    }

    let transport = session.transport();
    for participant in &participants {
        if roster::counters(transport.as_ref(), participant).health == 0 {
            if let Err(e) = session.respawn(participant) {
                debug!(participant = %participant, error = %e, "Respawn skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::kills::tests::RecordingPersistence;
    use crate::game::types::Projectile;
    use crate::room::{keys, RoomTransport};
    use std::collections::HashSet;

    #[tokio::test(start_paused = true)]
    async fn bots_converge_on_host_registry() {
        let sim = Simulation::start(3, &SyncConfig::default(), Duration::from_millis(50), None, 7);
        // Off the bot and poll tick grid so every peer has caught up
        tokio::time::sleep(Duration::from_millis(2_025)).await;

        let host = sim.host().expect("first bot hosts");
        assert_eq!(host.participants().len(), 3);

        let projectiles = host.projectiles();
        let unique: HashSet<_> = projectiles.iter().map(|p| p.id.clone()).collect();
        assert_eq!(unique.len(), projectiles.len());

        // Every authoritative projectile is visible to every peer
        for session in sim.sessions() {
            let seen: HashSet<_> = session.projectiles().into_iter().map(|p| p.id).collect();
            assert!(unique.is_subset(&seen));
        }

        sim.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn linked_bots_persist_their_kills() {
        let recorder = Arc::new(RecordingPersistence::default());
        let persistence = SimPersistence {
            store: recorder.clone(),
            wallet_prefix: "arena".to_string(),
        };
        // One bot decision at start, the next an hour later
        let sim = Simulation::start(
            2,
            &SyncConfig::default(),
            Duration::from_secs(3_600),
            Some(persistence),
            1,
        );

        for session in sim.sessions() {
            assert!(session.ledger().is_linked(&session.local_participant()));
        }

        // Let the host see bot-1 join
        tokio::time::sleep(Duration::from_millis(10)).await;

        let host = sim.host().expect("first bot hosts");
        host.record_kill(&ParticipantId::new("bot-1")).unwrap();
        host.record_kill(&ParticipantId::new("bot-0")).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let mut calls = recorder.calls.lock().clone();
        calls.sort();
        assert_eq!(
            calls,
            [
                ("arena-bot-0".to_string(), 1),
                ("arena-bot-1".to_string(), 1)
            ]
        );

        sim.shutdown();
    }

    #[test]
    fn referee_resolves_and_damages() {
        let room = LocalRoom::new();
        let host_peer = room.join("host");
        room.join("guest");
        let host = ArenaSession::new(Arc::new(host_peer.clone()), SyncConfig::default(), None);

        let mut projectile = Projectile::new(
            ParticipantId::new("host"),
            Vec3::default(),
            0.0,
            PROJECTILE_SPEED,
            0,
        );
        projectile.created_at = 1_000;
        host.fire(projectile);
        host_peer.set_participant_state(
            &ParticipantId::new("guest"),
            keys::HEALTH,
            serde_json::json!(100),
        );

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..64 {
            referee_step(&host, &mut rng, 2_000);
            if host.projectiles().is_empty() {
                break;
            }
        }
        assert!(host.projectiles().is_empty());

        // The hit effect finished once it was old enough
        referee_step(&host, &mut rng, unix_millis() + HIT_EFFECT_MS);
        assert!(host.hits().is_empty());

        let health = host_peer
            .participant_state(&ParticipantId::new("guest"), keys::HEALTH)
            .and_then(|v| v.as_u64());
        assert!(matches!(health, Some(75) | Some(100)));
    }
}
