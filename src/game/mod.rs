//! Host-authoritative state synchronization
//!
//! One peer (the host) owns the projectile and hit registries and the
//! participants' counters. Everyone else predicts locally, forwards fire
//! requests through a single pending slot, and reconciles against the
//! snapshots the host publishes.

pub mod authority;
pub mod dedup;
pub mod error;
pub mod kills;
pub mod publisher;
pub mod reconcile;
pub mod registry;
pub mod roster;
pub mod session;
pub mod sim;
pub mod types;

pub use authority::{FireOutcome, HostToken};
pub use dedup::FireDeduplicator;
pub use error::SyncError;
pub use kills::{DamageOutcome, KillLedger, KillPersistence, PersistError, PersistOutcome};
pub use registry::{HitRegistry, ProjectileRegistry};
pub use session::{ArenaSession, ArenaView};
pub use sim::{SimPersistence, Simulation};
pub use types::{Hit, Loadout, ParticipantId, Projectile, ProjectileId, Vec3};
