//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::util::time::{
    HIT_TTL_MS, HOST_POLL_INTERVAL_MS, PERSIST_DEBOUNCE_MS, PROJECTILE_TTL_MS,
};

/// Default bound of the fire deduplicator
pub const DEFAULT_DEDUP_CAPACITY: usize = 100;

/// Tunables of the host-authoritative sync core
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// How often the host drains pending fire requests
    pub poll_interval: Duration,
    /// Deduplicator bound; the oldest half is discarded once exceeded
    pub dedup_capacity: usize,
    /// Quiet period before a kill total is persisted
    pub persist_debounce: Duration,
    /// Lifetime of a projectile that never collides
    pub projectile_ttl: Duration,
    /// Lifetime of a hit whose effect never reports completion
    pub hit_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(HOST_POLL_INTERVAL_MS),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            persist_debounce: Duration::from_millis(PERSIST_DEBOUNCE_MS),
            projectile_ttl: Duration::from_millis(PROJECTILE_TTL_MS),
            hit_ttl: Duration::from_millis(HIT_TTL_MS),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL
    pub supabase_url: Option<String>,
    /// Supabase anonymous key, the highscores table is writable with it
    pub supabase_anon_key: Option<String>,

    /// Sync core tunables
    pub sync: SyncConfig,

    /// Number of bot peers in the local simulation (0 disables it)
    pub sim_peers: usize,
    /// Bot decision interval
    pub sim_tick: Duration,
    /// Bots are linked to `{prefix}-bot-{n}` and their kills persisted; unset
    /// keeps simulated kills out of the highscores table
    pub sim_wallet_prefix: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let sync = SyncConfig {
            poll_interval: Duration::from_millis(parse_or(
                "HOST_POLL_INTERVAL_MS",
                HOST_POLL_INTERVAL_MS,
            )?),
            dedup_capacity: parse_or("DEDUP_CAPACITY", DEFAULT_DEDUP_CAPACITY)?,
            persist_debounce: Duration::from_millis(parse_or(
                "PERSIST_DEBOUNCE_MS",
                PERSIST_DEBOUNCE_MS,
            )?),
            projectile_ttl: Duration::from_millis(parse_or("PROJECTILE_TTL_MS", PROJECTILE_TTL_MS)?),
            hit_ttl: Duration::from_millis(parse_or("HIT_TTL_MS", HIT_TTL_MS)?),
        };

        if sync.dedup_capacity < 2 {
            return Err(ConfigError::Invalid("DEDUP_CAPACITY"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY").ok(),

            sync,

            sim_peers: parse_or("SIM_PEERS", 0)?,
            sim_tick: Duration::from_millis(parse_or("SIM_TICK_MS", 100)?),
            sim_wallet_prefix: env::var("SIM_WALLET_PREFIX")
                .ok()
                .filter(|prefix| !prefix.trim().is_empty()),
        })
    }

    /// Persistence is only wired up when both Supabase settings are present
    pub fn persistence_enabled(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
