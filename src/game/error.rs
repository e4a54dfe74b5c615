//! Sync core errors
//!
//! None of these are fatal. Callers log and carry on; they exist so that
//! rejections are observable.

use super::types::{ParticipantId, ProjectileId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Mutation requires host authority")]
    NotAuthoritative,

    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    #[error("Unknown projectile: {0}")]
    UnknownProjectile(ProjectileId),

    #[error("Unknown hit: {0}")]
    UnknownHit(ProjectileId),

    #[error("Malformed replicated value for key {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl SyncError {
    pub(crate) fn malformed(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}
