//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::Simulation;
use crate::store::{HighscoreStore, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Absent when Supabase is not configured
    pub highscores: Option<HighscoreStore>,
    pub simulation: Option<Arc<Simulation>>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let highscores = match (&config.supabase_url, &config.supabase_anon_key) {
            (Some(url), Some(key)) => Some(HighscoreStore::new(SupabaseClient::new(
                url.as_str(),
                key.as_str(),
            ))),
            _ => None,
        };

        Self {
            highscores,
            simulation: None,
        }
    }

    pub fn with_simulation(mut self, simulation: Arc<Simulation>) -> Self {
        self.simulation = Some(simulation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            sync: SyncConfig::default(),
            sim_peers: 0,
            sim_tick: Duration::from_millis(100),
            sim_wallet_prefix: None,
        }
    }

    #[test]
    fn store_requires_both_supabase_settings() {
        let mut config = test_config();
        config.supabase_url = Some("https://example.supabase.co".to_string());
        assert!(AppState::new(&config).highscores.is_none());

        config.supabase_anon_key = Some("anon".to_string());
        assert!(AppState::new(&config).highscores.is_some());
    }
}
