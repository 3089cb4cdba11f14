//! Text summaries for profiles, heroes, top lists and session reports.
//!
//! Output is Discord markdown. Everything here is a pure function over data
//! that has already been fetched and ranked.

use crate::core::leaderboard::LeaderboardEntry;
use crate::core::profiles::{Partition, Profile, RankResult};

/// How many heroes the self summary lists.
const TOP_HEROES: usize = 5;

/// `3723` -> `"1h 2m"`, `95` -> `"1m"`, `20` -> `"20s"`.
pub fn format_play_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, m) => format!("{}m", m),
        (h, m) => format!("{}h {}m", h, m),
    }
}

fn rating_line(rating: Option<i64>) -> String {
    match rating {
        Some(rating) => format!("**{}**", rating),
        None => "unranked".to_string(),
    }
}

fn win_rate(profile: &Profile) -> Option<f64> {
    let played = profile.stats.games_played;
    (played > 0).then(|| profile.stats.games_won as f64 / played as f64 * 100.0)
}

/// Summary shown by `/me`.
pub fn format_self(profile: &Profile, rank: Option<&RankResult>) -> String {
    let mut text = format!(
        "**{}** ({})\nRating: {}\n",
        profile.display_nick(),
        profile.region.as_str().to_uppercase(),
        rating_line(profile.rating)
    );

    if let Some(rank) = rank {
        text.push_str(&format!(
            "Place: **#{}** (top {:.2}%)\n",
            rank.place, rank.percentile
        ));
    }

    text.push_str(&format!("Level: {}\n", profile.stats.level));
    if let Some(rate) = win_rate(profile) {
        text.push_str(&format!(
            "Games: {} played, {} won ({:.0}%)\n",
            profile.stats.games_played, profile.stats.games_won, rate
        ));
    }

    let heroes = profile.heroes_by_time();
    if !heroes.is_empty() {
        text.push_str("\n**Top heroes:**\n");
        for (name, seconds) in heroes.iter().take(TOP_HEROES) {
            text.push_str(&format!("- {} ({})\n", name, format_play_time(*seconds)));
        }
        text.push_str("_Use /hero <name> for details._\n");
    }

    text
}

/// Summary shown by `/hero <name>`. Hero names match case-insensitively.
pub fn format_hero(hero: &str, profile: &Profile) -> String {
    let found = profile
        .heroes
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(hero.trim()));

    match found {
        Some((name, seconds)) => format!(
            "**{}** on **{}**\nTime played: {}",
            profile.display_nick(),
            name,
            format_play_time(*seconds)
        ),
        None => format!(
            "No competitive time on **{}** for {} yet.",
            hero.trim(),
            profile.display_nick()
        ),
    }
}

/// Top list shown by `/ratingtop`.
pub fn format_top(partition: Partition, entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return format!("No ranked {} players yet.", partition.as_str().to_uppercase());
    }

    let mut text = format!("**Rating Top ({}):**\n", partition.as_str().to_uppercase());
    for (index, entry) in entries.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({})\n",
            index + 1,
            entry.display_name,
            entry.rating
        ));
    }
    text
}

fn signed(delta: i64) -> String {
    if delta > 0 {
        format!("+{}", delta)
    } else {
        delta.to_string()
    }
}

/// Report sent after a play session: what moved between two saves.
pub fn format_session_report(before: &Profile, after: &Profile) -> String {
    let mut text = format!("**Session report for {}**\n", after.display_nick());

    match (before.rating, after.rating) {
        (Some(old), Some(new)) => text.push_str(&format!(
            "Rating: {} -> **{}** ({})\n",
            old,
            new,
            signed(new - old)
        )),
        (None, Some(new)) => text.push_str(&format!("Placed at **{}**\n", new)),
        (_, None) => text.push_str("Rating: unranked\n"),
    }

    let played = after
        .stats
        .games_played
        .saturating_sub(before.stats.games_played);
    let won = after.stats.games_won.saturating_sub(before.stats.games_won);
    if played > 0 {
        text.push_str(&format!(
            "Games: {} played, {} won, {} not won\n",
            played,
            won,
            played.saturating_sub(won)
        ));
    }

    let mut hero_deltas: Vec<(&str, u64)> = after
        .heroes
        .iter()
        .filter_map(|(name, seconds)| {
            let previous = before.heroes.get(name).copied().unwrap_or(0);
            let delta = seconds.saturating_sub(previous);
            (delta > 0).then_some((name.as_str(), delta))
        })
        .collect();
    hero_deltas.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    if !hero_deltas.is_empty() {
        text.push_str("\n**Played this session:**\n");
        for (name, seconds) in hero_deltas.iter().take(TOP_HEROES) {
            text.push_str(&format!("- {} ({})\n", name, format_play_time(*seconds)));
        }
    }

    text
}
