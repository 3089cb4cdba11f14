use super::profile_models::{PlayerStats, Region};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Player not found")]
    PlayerNotFound,

    #[error("Stats provider request failed: {0}")]
    Http(String),

    #[error("Unexpected stats provider response: {0}")]
    Decode(String),
}

/// The game-side part of a profile, as reported by the external provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedStats {
    pub rating: Option<i64>,
    pub heroes: BTreeMap<String, u64>,
    pub stats: PlayerStats,
}

/// External game-stats source.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// `handle` is already in stored form (see `encode_nick`).
    async fn fetch_profile(&self, region: Region, handle: &str)
        -> Result<FetchedStats, ProviderError>;
}
