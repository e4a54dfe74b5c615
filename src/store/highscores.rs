//! Highscores keyed by wallet address

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game::kills::{KillPersistence, PersistError, PersistOutcome};

use super::supabase::{SupabaseClient, SupabaseError};

const TABLE: &str = "highscores";
const WALLET_COLUMN: &str = "wallet_address";

/// Default number of leaderboard rows
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
/// Upper bound on leaderboard rows per request
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Highscore row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highscore {
    pub wallet_address: String,
    pub total_kills: u32,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// New highscore for insertion
#[derive(Debug, Clone, Serialize)]
struct NewHighscore<'a> {
    wallet_address: &'a str,
    total_kills: u32,
}

/// Highscore update
#[derive(Debug, Clone, Serialize)]
struct HighscoreUpdate {
    total_kills: u32,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// A wallet's standing on the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    /// 1-based
    pub rank: u64,
    pub highscore: Highscore,
}

/// Highscore store operations
#[derive(Clone)]
pub struct HighscoreStore {
    client: SupabaseClient,
}

impl HighscoreStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Save a wallet's kill total. Stored totals only ever go up: a total not
    /// above the stored one is accepted without writing.
    pub async fn save_highscore(
        &self,
        wallet: &str,
        kills: u32,
    ) -> Result<PersistOutcome, SupabaseError> {
        match self.get_highscore(wallet).await? {
            Some(existing) if kills > existing.total_kills => {
                let filter = wallet_filter(wallet);
                let update = HighscoreUpdate {
                    total_kills: kills,
                    updated_at: chrono::Utc::now(),
                };
                self.client.update(TABLE, &[(WALLET_COLUMN, filter.as_str())], &update).await?;
                info!(wallet, kills, previous = existing.total_kills, "Highscore raised");
                Ok(PersistOutcome {
                    accepted: true,
                    is_new_highscore: true,
                })
            }
            Some(_) => Ok(PersistOutcome {
                accepted: true,
                is_new_highscore: false,
            }),
            None => {
                let row = NewHighscore {
                    wallet_address: wallet,
                    total_kills: kills,
                };
                let _: Highscore = self.client.insert(TABLE, &row).await?;
                info!(wallet, kills, "First highscore recorded");
                Ok(PersistOutcome {
                    accepted: true,
                    is_new_highscore: true,
                })
            }
        }
    }

    /// Get a wallet's highscore, if it has one
    pub async fn get_highscore(&self, wallet: &str) -> Result<Option<Highscore>, SupabaseError> {
        let filter = wallet_filter(wallet);
        self.client.get_one(TABLE, &[(WALLET_COLUMN, filter.as_str())]).await
    }

    /// Get a wallet's total kills, 0 when it has never scored
    pub async fn total_kills(&self, wallet: &str) -> Result<u32, SupabaseError> {
        Ok(self
            .get_highscore(wallet)
            .await?
            .map(|h| h.total_kills)
            .unwrap_or(0))
    }

    /// Top highscores ordered by total kills, highest first
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Highscore>, SupabaseError> {
        let limit = clamp_limit(limit).to_string();
        let query = [
            ("select", "*"),
            ("order", "total_kills.desc"),
            ("limit", limit.as_str()),
        ];
        self.client.get(TABLE, &query).await
    }

    /// A wallet's rank: one more than the number of wallets with more kills
    pub async fn user_rank(&self, wallet: &str) -> Result<Option<Ranking>, SupabaseError> {
        let Some(highscore) = self.get_highscore(wallet).await? else {
            return Ok(None);
        };

        let more_kills = format!("gt.{}", highscore.total_kills);
        let ahead = self
            .client
            .count(TABLE, &[("total_kills", more_kills.as_str())])
            .await?;

        Ok(Some(Ranking {
            rank: ahead + 1,
            highscore,
        }))
    }
}

impl KillPersistence for HighscoreStore {
    fn persist_kill_count<'a>(
        &'a self,
        identity: &'a str,
        total_kills: u32,
    ) -> BoxFuture<'a, Result<PersistOutcome, PersistError>> {
        Box::pin(async move {
            self.save_highscore(identity, total_kills)
                .await
                .map_err(PersistError::from)
        })
    }
}

/// PostgREST equality filter on the wallet column
fn wallet_filter(wallet: &str) -> String {
    format!("eq.{}", wallet)
}

/// Clamp a requested leaderboard size into `1..=MAX_LEADERBOARD_LIMIT`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LEADERBOARD_LIMIT)
}
