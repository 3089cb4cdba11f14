pub mod profile_models;
pub mod profile_service;
pub mod profile_store;
pub mod stats_provider;

pub use profile_models::{
    decode_nick, encode_nick, profile_id, user_id_from_profile_id, Partition, PlayerStats,
    Profile, ProfileDraft, RankResult, Region, PROFILE_ID_PREFIX,
};
pub use profile_service::{ProfileService, SaveError};
pub use profile_store::{rank_order, with_timeout, ProfileError, ProfileStore, RankIndex, WriteOutcome};
pub use stats_provider::{FetchedStats, ProviderError, StatsProvider};
