//! Arena Sync - host-authoritative state synchronization for a peer-hosted
//! multiplayer arena
//!
//! - `room`: the room transport seam and an in-process implementation
//! - `game`: deduplication, authority, registries, kill ledger, publishing
//!   and reconciliation
//! - `store`: Supabase-backed highscores
//! - `http`: leaderboard and health endpoints

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod room;
pub mod store;
pub mod util;
