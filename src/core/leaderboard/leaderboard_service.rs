// Leaderboard views on top of the rank index: who is on top, and where am I.

use crate::core::profiles::{
    with_timeout, Partition, ProfileError, ProfileStore, RankIndex, RankResult,
};
use std::sync::Arc;
use std::time::Duration;

/// One display row of a top list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub rating: i64,
}

pub struct LeaderboardService<S: ProfileStore + RankIndex> {
    store: Arc<S>,
    store_timeout: Duration,
}

impl<S: ProfileStore + RankIndex> LeaderboardService<S> {
    pub fn new(store: Arc<S>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Top `limit` players of a partition with display-ready nicks.
    pub async fn render_top(
        &self,
        partition: Partition,
        limit: usize,
        group: Option<u64>,
    ) -> Result<Vec<LeaderboardEntry>, ProfileError> {
        let top = with_timeout(
            self.store_timeout,
            self.store.top_n(partition, limit, group),
        )
        .await?;

        Ok(top
            .into_iter()
            .filter_map(|profile| {
                let rating = profile.rating?;
                Some(LeaderboardEntry {
                    display_name: profile.display_nick(),
                    rating,
                })
            })
            .collect())
    }

    /// Rank of a stored player within their own partition.
    pub async fn render_self(&self, id: &str) -> Result<RankResult, ProfileError> {
        let profile = with_timeout(self.store_timeout, self.store.get(id)).await?;
        if profile.rating.is_none() {
            return Err(ProfileError::NotFound);
        }

        with_timeout(
            self.store_timeout,
            self.store.place_of(id, profile.partition()),
        )
        .await
    }
}
