// In-memory implementation of every profile port: storage, ranking and the
// change feed. Used by tests and for running the bot without Postgres.
//
// Writes go through a single gate so change events leave in the same order
// the writes were applied.

use crate::core::profiles::{
    rank_order, Partition, Profile, ProfileDraft, ProfileError, ProfileStore, RankIndex,
    RankResult, WriteOutcome,
};
use crate::core::sessions::{ChangeEvent, ChangeFeed, ChangeKind, ChangeStream, StreamError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

/// How many unconsumed change events a slow subscriber may fall behind by
/// before it starts losing them.
const CHANGE_BUFFER: usize = 256;

pub struct InMemoryProfileStore {
    profiles: DashMap<String, Profile>,
    changes: broadcast::Sender<ChangeEvent>,
    write_gate: Mutex<()>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            profiles: DashMap::new(),
            changes,
            write_gate: Mutex::new(()),
        }
    }

    fn publish(&self, kind: ChangeKind, before: Option<Profile>, after: Profile) {
        // No subscribers is fine; the event is simply not observed.
        let _ = self.changes.send(ChangeEvent {
            kind,
            before,
            after,
        });
    }

    /// Ranked members of a partition in rank order.
    fn ranked(&self, partition: Partition, group: Option<u64>) -> Vec<Profile> {
        let mut ranked: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|entry| {
                let profile = entry.value();
                profile.rating.is_some()
                    && partition.contains(profile.region)
                    && group.map_or(true, |chat| profile.chat == Some(chat))
            })
            .map(|entry| entry.value().clone())
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, id: &str) -> Result<Profile, ProfileError> {
        self.profiles
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(ProfileError::NotFound)
    }

    async fn upsert(&self, draft: ProfileDraft) -> Result<WriteOutcome, ProfileError> {
        let _gate = self.write_gate.lock().await;

        let profile = draft.into_profile(Utc::now());
        let before = self.profiles.insert(profile.id.clone(), profile.clone());

        let (kind, outcome) = match before {
            Some(_) => (ChangeKind::Update, WriteOutcome::Replaced),
            None => (ChangeKind::Insert, WriteOutcome::Inserted),
        };
        self.publish(kind, before, profile);
        Ok(outcome)
    }

    async fn attach_chat(&self, id: &str, chat: u64) -> Result<WriteOutcome, ProfileError> {
        let _gate = self.write_gate.lock().await;

        let (before, after) = {
            let mut entry = self.profiles.get_mut(id).ok_or(ProfileError::NotFound)?;
            let before = entry.clone();
            entry.chat = Some(chat);
            (before, entry.clone())
        };

        self.publish(ChangeKind::Update, Some(before), after);
        Ok(WriteOutcome::Updated)
    }
}

#[async_trait]
impl RankIndex for InMemoryProfileStore {
    async fn top_n(
        &self,
        partition: Partition,
        limit: usize,
        group: Option<u64>,
    ) -> Result<Vec<Profile>, ProfileError> {
        let mut ranked = self.ranked(partition, group);
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn place_of(&self, id: &str, partition: Partition) -> Result<RankResult, ProfileError> {
        let ranked = self.ranked(partition, None);
        let offset = ranked
            .iter()
            .position(|profile| profile.id == id)
            .ok_or(ProfileError::NotFound)?;

        RankResult::from_offset(offset as u64, ranked.len() as u64).ok_or(ProfileError::NotFound)
    }
}

pub struct InMemoryChangeStream {
    receiver: broadcast::Receiver<ChangeEvent>,
}

#[async_trait]
impl ChangeStream for InMemoryChangeStream {
    async fn next_change(&mut self) -> Result<ChangeEvent, StreamError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Change subscriber fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(StreamError::ConnectionLost),
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for InMemoryProfileStore {
    type Stream = InMemoryChangeStream;

    async fn subscribe(&self) -> Result<InMemoryChangeStream, StreamError> {
        Ok(InMemoryChangeStream {
            receiver: self.changes.subscribe(),
        })
    }
}
