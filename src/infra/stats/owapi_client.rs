use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::profiles::{FetchedStats, Partition, PlayerStats, ProviderError, Region, StatsProvider};

const OWAPI_BASE_URL: &str = "https://ow-api.com/v1/stats";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the public ow-api.com "complete" stats endpoint.
pub struct OwApiClient {
    client: Client,
    base_url: Url,
}

impl OwApiClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(OWAPI_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("OverStatsBot/1.0"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        let base_url = Url::parse(base_url).map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// `/{platform}/{region}/{handle}/complete`; consoles have no region.
    fn profile_url(&self, region: Region, handle: &str) -> Result<Url, ProviderError> {
        let (platform, area) = match region.partition() {
            Partition::Pc => ("pc", region.as_str()),
            Partition::Console => (region.as_str(), "global"),
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Http(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend([platform, area, handle, "complete"]);
        Ok(url)
    }
}

#[async_trait]
impl StatsProvider for OwApiClient {
    async fn fetch_profile(
        &self,
        region: Region,
        handle: &str,
    ) -> Result<FetchedStats, ProviderError> {
        let url = self.profile_url(region, handle)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::PlayerNotFound);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Http(format!(
                "ow-api returned {}",
                resp.status()
            )));
        }

        let body: ApiProfile = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        map_profile(body)
    }
}

// ============================================================================
// RESPONSE SHAPE
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiProfile {
    error: Option<String>,
    level: u32,
    prestige: u32,
    rating: i64,
    competitive_stats: Option<ApiCompetitiveStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiCompetitiveStats {
    games: Option<ApiGames>,
    top_heroes: Option<BTreeMap<String, ApiHeroStats>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiGames {
    played: u32,
    won: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiHeroStats {
    time_played: Option<String>,
}

fn map_profile(api: ApiProfile) -> Result<FetchedStats, ProviderError> {
    if let Some(error) = api.error {
        tracing::debug!(%error, "ow-api reported an error body");
        return Err(ProviderError::PlayerNotFound);
    }

    let competitive = api.competitive_stats.unwrap_or_default();
    let games = competitive.games.unwrap_or_default();
    let heroes = competitive
        .top_heroes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, hero)| {
            let seconds = parse_time_played(hero.time_played.as_deref()?)?;
            (seconds > 0).then_some((name, seconds))
        })
        .collect();

    Ok(FetchedStats {
        // ow-api reports 0 for players without placement.
        rating: (api.rating > 0).then_some(api.rating),
        heroes,
        stats: PlayerStats {
            level: api.prestige * 100 + api.level,
            games_played: games.played,
            games_won: games.won,
        },
    })
}

/// `"HH:MM:SS"`, `"MM:SS"` or `"SS"` to seconds. `None` for anything else
/// (ow-api uses `"--"` for heroes never played).
fn parse_time_played(value: &str) -> Option<u64> {
    let mut seconds = 0u64;
    let mut parts = 0;
    for part in value.trim().split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_played_parses_all_widths() {
        assert_eq!(parse_time_played("1:02:03"), Some(3723));
        assert_eq!(parse_time_played("45:10"), Some(2710));
        assert_eq!(parse_time_played("59"), Some(59));
        assert_eq!(parse_time_played("--"), None);
        assert_eq!(parse_time_played("1:1:1:1"), None);
    }

    #[test]
    fn pc_and_console_urls_differ() {
        let client = OwApiClient::new().unwrap();
        assert_eq!(
            client.profile_url(Region::Eu, "Kraso-2150").unwrap().as_str(),
            "https://ow-api.com/v1/stats/pc/eu/Kraso-2150/complete"
        );
        assert_eq!(
            client.profile_url(Region::Xbl, "Some Login").unwrap().as_str(),
            "https://ow-api.com/v1/stats/xbl/global/Some%20Login/complete"
        );
    }

    #[test]
    fn complete_payload_maps_to_stats() {
        let body = r#"{
            "name": "Kraso#2150",
            "level": 37,
            "prestige": 2,
            "rating": 3120,
            "competitiveStats": {
                "games": {"played": 120, "won": 64},
                "topHeroes": {
                    "mercy": {"timePlayed": "12:30:00", "gamesWon": 40},
                    "ana": {"timePlayed": "45:00"},
                    "genji": {"timePlayed": "--"}
                }
            }
        }"#;

        let stats = map_profile(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(stats.rating, Some(3120));
        assert_eq!(stats.stats.level, 237);
        assert_eq!(stats.stats.games_played, 120);
        assert_eq!(stats.stats.games_won, 64);
        assert_eq!(stats.heroes.get("mercy"), Some(&45_000));
        assert_eq!(stats.heroes.get("ana"), Some(&2_700));
        assert!(!stats.heroes.contains_key("genji"));
    }

    #[test]
    fn unranked_and_error_bodies() {
        let unranked = map_profile(serde_json::from_str(r#"{"level": 5, "rating": 0}"#).unwrap())
            .unwrap();
        assert_eq!(unranked.rating, None);
        assert!(unranked.heroes.is_empty());

        let missing = map_profile(serde_json::from_str(r#"{"error": "Player not found"}"#).unwrap());
        assert!(matches!(missing, Err(ProviderError::PlayerNotFound)));
    }
}
