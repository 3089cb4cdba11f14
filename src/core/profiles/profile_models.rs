// Domain models for stored player profiles.
// No Discord or database types in here, only plain data and the pure rules
// that go with it (partitioning, nick escaping, rank arithmetic).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Every profile saved through the chat transport carries this id prefix.
/// The change listener only reacts to ids in this namespace.
pub const PROFILE_ID_PREFIX: &str = "dc";

/// Character players type in a BattleTag (`Name#1234`).
pub const DISPLAY_SEPARATOR: char = '#';

/// Character the BattleTag separator is stored as (`Name-1234`).
pub const STORED_SEPARATOR: char = '-';

pub fn profile_id(user_id: u64) -> String {
    format!("{PROFILE_ID_PREFIX}{user_id}")
}

/// Recover the chat-transport user id from a profile id.
pub fn user_id_from_profile_id(id: &str) -> Option<u64> {
    id.strip_prefix(PROFILE_ID_PREFIX)?.parse().ok()
}

// ============================================================================
// PLATFORM / PARTITION
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown region: {0}")]
pub struct UnknownRegion(pub String);

/// Region tag a profile was saved with. Determines the leaderboard partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Eu,
    Us,
    Kr,
    Psn,
    Xbl,
}

impl Region {
    pub const ALL: [Region; 5] = [Region::Eu, Region::Us, Region::Kr, Region::Psn, Region::Xbl];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Eu => "eu",
            Region::Us => "us",
            Region::Kr => "kr",
            Region::Psn => "psn",
            Region::Xbl => "xbl",
        }
    }

    pub fn partition(&self) -> Partition {
        match self {
            Region::Psn | Region::Xbl => Partition::Console,
            Region::Eu | Region::Us | Region::Kr => Partition::Pc,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Region::ALL
            .into_iter()
            .find(|region| region.as_str() == tag)
            .ok_or(UnknownRegion(s.to_string()))
    }
}

/// Disjoint leaderboard population. Every region maps to exactly one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Pc,
    Console,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Pc => "pc",
            Partition::Console => "console",
        }
    }

    pub fn contains(&self, region: Region) -> bool {
        region.partition() == *self
    }

    /// Region tags that make up the console partition. Stores filter with
    /// `(region IN console_tags) == (partition == Console)`.
    pub fn console_tags() -> Vec<&'static str> {
        Region::ALL
            .into_iter()
            .filter(|region| region.partition() == Partition::Console)
            .map(|region| region.as_str())
            .collect()
    }
}

impl FromStr for Partition {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pc" => Ok(Partition::Pc),
            "console" => Ok(Partition::Console),
            _ => Err(UnknownRegion(s.to_string())),
        }
    }
}

// ============================================================================
// NICK ESCAPING
// ============================================================================
// BattleTags contain '#', which the stats provider wants as '-' in URLs.
// PC nicks are stored escaped and decoded for display. Console logins are
// stored verbatim.

pub fn encode_nick(region: Region, display: &str) -> String {
    match region.partition() {
        Partition::Console => display.to_string(),
        Partition::Pc => display.replace(DISPLAY_SEPARATOR, &STORED_SEPARATOR.to_string()),
    }
}

pub fn decode_nick(region: Region, stored: &str) -> String {
    match region.partition() {
        Partition::Console => stored.to_string(),
        Partition::Pc => stored.replace(STORED_SEPARATOR, &DISPLAY_SEPARATOR.to_string()),
    }
}

// ============================================================================
// PROFILE
// ============================================================================

/// Game counters captured alongside the rating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub level: u32,
    pub games_played: u32,
    pub games_won: u32,
}

/// A stored player profile. One per player, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub region: Region,
    /// Stored form; see [`decode_nick`] for display.
    pub nick: String,
    /// Competitive skill rating. `None` while unranked; unranked profiles
    /// never appear in leaderboards.
    pub rating: Option<i64>,
    /// Guild the player joined, scoping them into a group leaderboard.
    #[serde(default)]
    pub chat: Option<u64>,
    /// Last write, assigned by the store.
    pub date: DateTime<Utc>,
    /// Hero name -> seconds played.
    #[serde(default)]
    pub heroes: BTreeMap<String, u64>,
    #[serde(default)]
    pub stats: PlayerStats,
}

impl Profile {
    pub fn partition(&self) -> Partition {
        self.region.partition()
    }

    pub fn display_nick(&self) -> String {
        decode_nick(self.region, &self.nick)
    }

    /// Heroes ordered by descending time played (name breaks ties).
    pub fn heroes_by_time(&self) -> Vec<(&str, u64)> {
        let mut heroes: Vec<(&str, u64)> = self
            .heroes
            .iter()
            .map(|(name, seconds)| (name.as_str(), *seconds))
            .collect();
        heroes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        heroes
    }
}

/// A profile as written by callers. The store assigns `date` on upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDraft {
    pub id: String,
    pub region: Region,
    pub nick: String,
    pub rating: Option<i64>,
    pub chat: Option<u64>,
    pub heroes: BTreeMap<String, u64>,
    pub stats: PlayerStats,
}

impl ProfileDraft {
    pub fn into_profile(self, date: DateTime<Utc>) -> Profile {
        Profile {
            id: self.id,
            region: self.region,
            nick: self.nick,
            rating: self.rating,
            chat: self.chat,
            date,
            heroes: self.heroes,
            stats: self.stats,
        }
    }
}

// ============================================================================
// RANK
// ============================================================================

/// Where a player stands in their partition.
///
/// `percentile` follows the bot's convention: `place / population * 100`,
/// so lower is better (the leader of a 200-player partition sits at 0.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankResult {
    pub place: u64,
    pub percentile: f64,
}

impl RankResult {
    /// Build from a 0-based offset in the rating-descending order and the
    /// number of ranked profiles in the partition. `None` when the offset is
    /// outside the population (including an empty partition).
    pub fn from_offset(offset: u64, population: u64) -> Option<Self> {
        if offset >= population {
            return None;
        }
        let place = offset + 1;
        Some(Self {
            place,
            percentile: place as f64 / population as f64 * 100.0,
        })
    }
}
