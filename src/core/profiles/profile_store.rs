// Storage ports for profiles.
// The core says WHAT it needs from storage; infra/ decides HOW
// (Postgres in production, DashMap in tests).

use super::profile_models::{Partition, Profile, ProfileDraft, RankResult};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile not found")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

/// What a successful write did to the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Replaced,
    Updated,
}

/// Durable keyed storage of profile documents.
///
/// Every successful write must be observable on the store's change feed,
/// in commit order.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Profile, ProfileError>;

    /// Full-document replace keyed by `draft.id`. Nothing from a previous
    /// document survives; `date` is assigned by the store.
    async fn upsert(&self, draft: ProfileDraft) -> Result<WriteOutcome, ProfileError>;

    /// Set only the `chat` field of an existing profile.
    async fn attach_chat(&self, id: &str, chat: u64) -> Result<WriteOutcome, ProfileError>;
}

/// Ranking view derived from the stored `rating` field at query time.
///
/// Only profiles with a rating take part. Order is rating descending, then
/// id ascending (see [`rank_order`]).
#[async_trait]
pub trait RankIndex: Send + Sync {
    /// Top `limit` ranked profiles of a partition, optionally only those
    /// attached to `group`.
    async fn top_n(
        &self,
        partition: Partition,
        limit: usize,
        group: Option<u64>,
    ) -> Result<Vec<Profile>, ProfileError>;

    /// Place and percentile of `id` within its partition. `NotFound` when the
    /// profile is missing, unranked, or outside `partition`.
    async fn place_of(&self, id: &str, partition: Partition) -> Result<RankResult, ProfileError>;
}

/// Rating descending, then id ascending.
pub fn rank_order(a: &Profile, b: &Profile) -> Ordering {
    b.rating.cmp(&a.rating).then_with(|| a.id.cmp(&b.id))
}

/// Bound a store call so a partitioned network fails instead of hanging.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProfileError>
where
    F: Future<Output = Result<T, ProfileError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ProfileError::Timeout(limit))?
}
