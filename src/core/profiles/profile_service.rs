// Profile use-cases: save from the stats provider, look up, join a group.
// Works on primitive ids so the Discord layer stays a thin translation.

use super::profile_models::{encode_nick, profile_id, Profile, ProfileDraft, Region};
use super::profile_store::{with_timeout, ProfileError, ProfileStore, WriteOutcome};
use super::stats_provider::{ProviderError, StatsProvider};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

pub struct ProfileService<S: ProfileStore, P: StatsProvider> {
    store: Arc<S>,
    provider: P,
    /// Upper bound on every store call.
    store_timeout: Duration,
}

impl<S: ProfileStore, P: StatsProvider> ProfileService<S, P> {
    pub fn new(store: Arc<S>, provider: P, store_timeout: Duration) -> Self {
        Self {
            store,
            provider,
            store_timeout,
        }
    }

    /// Fetch the player's stats and store them as their profile.
    ///
    /// The store replaces the whole document, so a group the player already
    /// joined is carried over here.
    pub async fn save(
        &self,
        user_id: u64,
        region: Region,
        handle: &str,
    ) -> Result<WriteOutcome, SaveError> {
        let nick = encode_nick(region, handle.trim());
        let fetched = self.provider.fetch_profile(region, &nick).await?;

        let id = profile_id(user_id);
        let chat = match self.get(&id).await {
            Ok(existing) => existing.chat,
            Err(ProfileError::NotFound) => None,
            Err(err) => return Err(err.into()),
        };

        let draft = ProfileDraft {
            id,
            region,
            nick,
            rating: fetched.rating,
            chat,
            heroes: fetched.heroes,
            stats: fetched.stats,
        };

        Ok(with_timeout(self.store_timeout, self.store.upsert(draft)).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Profile, ProfileError> {
        with_timeout(self.store_timeout, self.store.get(id)).await
    }

    pub async fn get_for_user(&self, user_id: u64) -> Result<Profile, ProfileError> {
        self.get(&profile_id(user_id)).await
    }

    /// Scope the player into a group leaderboard.
    pub async fn join_group(&self, user_id: u64, chat: u64) -> Result<WriteOutcome, ProfileError> {
        let id = profile_id(user_id);
        with_timeout(self.store_timeout, self.store.attach_chat(&id, chat)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profiles::stats_provider::FetchedStats;
    use crate::core::profiles::PlayerStats;
    use crate::infra::profiles::InMemoryProfileStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed rating and remembers the handles it was asked for.
    struct FixedProvider {
        rating: Option<i64>,
        requested: Mutex<Vec<String>>,
    }

    impl FixedProvider {
        fn new(rating: Option<i64>) -> Self {
            Self {
                rating,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StatsProvider for FixedProvider {
        async fn fetch_profile(
            &self,
            _region: Region,
            handle: &str,
        ) -> Result<FetchedStats, ProviderError> {
            self.requested.lock().unwrap().push(handle.to_string());
            if handle.starts_with("Ghost") {
                return Err(ProviderError::PlayerNotFound);
            }
            Ok(FetchedStats {
                rating: self.rating,
                heroes: [("Mercy".to_string(), 3600)].into_iter().collect(),
                stats: PlayerStats {
                    level: 120,
                    games_played: 40,
                    games_won: 22,
                },
            })
        }
    }

    fn make_service(rating: Option<i64>) -> ProfileService<InMemoryProfileStore, FixedProvider> {
        ProfileService::new(
            Arc::new(InMemoryProfileStore::new()),
            FixedProvider::new(rating),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn save_stores_escaped_nick_and_fetched_stats() {
        let service = make_service(Some(2750));

        let outcome = service.save(7, Region::Eu, "Kraso#2150").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Inserted);
        assert_eq!(
            service.provider.requested.lock().unwrap().as_slice(),
            ["Kraso-2150"]
        );

        let profile = service.get_for_user(7).await.unwrap();
        assert_eq!(profile.id, "dc7");
        assert_eq!(profile.nick, "Kraso-2150");
        assert_eq!(profile.display_nick(), "Kraso#2150");
        assert_eq!(profile.rating, Some(2750));
        assert_eq!(profile.stats.games_won, 22);
    }

    #[tokio::test]
    async fn resave_keeps_joined_group() {
        let service = make_service(Some(2750));
        service.save(7, Region::Eu, "Kraso#2150").await.unwrap();
        service.join_group(7, 99).await.unwrap();

        let outcome = service.save(7, Region::Eu, "Kraso#2150").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Replaced);
        assert_eq!(service.get_for_user(7).await.unwrap().chat, Some(99));
    }

    #[tokio::test]
    async fn provider_miss_stores_nothing() {
        let service = make_service(Some(2750));
        let err = service.save(8, Region::Us, "Ghost#1").await.unwrap_err();
        assert!(matches!(err, SaveError::Provider(ProviderError::PlayerNotFound)));
        assert!(matches!(
            service.get_for_user(8).await,
            Err(ProfileError::NotFound)
        ));
    }

    #[tokio::test]
    async fn joining_without_profile_is_not_found() {
        let service = make_service(None);
        assert!(matches!(
            service.join_group(9, 1).await,
            Err(ProfileError::NotFound)
        ));
    }
}
