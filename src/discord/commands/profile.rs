// Discord commands for player profiles.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// Errors never reach the user verbatim: they get a fixed message and the
// details go to the log.

use crate::core::leaderboard::LeaderboardService;
use crate::core::profiles::{ProfileError, ProfileService, ProviderError, Region, SaveError};
use crate::core::summary::{format_hero, format_self};
use crate::infra::profiles::PostgresProfileStore;
use crate::infra::stats::OwApiClient;
use std::sync::Arc;

pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";
const NO_PROFILE: &str = "You have no saved profile yet. Use `/save` first!";

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RegionChoice {
    #[name = "eu"]
    Eu,
    #[name = "us"]
    Us,
    #[name = "kr"]
    Kr,
    #[name = "psn"]
    Psn,
    #[name = "xbl"]
    Xbl,
}

impl From<RegionChoice> for Region {
    fn from(value: RegionChoice) -> Self {
        match value {
            RegionChoice::Eu => Region::Eu,
            RegionChoice::Us => Region::Us,
            RegionChoice::Kr => Region::Kr,
            RegionChoice::Psn => Region::Psn,
            RegionChoice::Xbl => Region::Xbl,
        }
    }
}

/// Save your game profile.
#[poise::command(slash_command)]
pub async fn save(
    ctx: Context<'_>,
    #[description = "PC region or console platform"] region: RegionChoice,
    #[description = "BattleTag#1337 or console login"] handle: String,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let region = Region::from(region);

    if handle.trim().is_empty() {
        ctx.say("Example: `/save eu BattleTag#1337` or `/save psn ConsoleLogin`")
            .await?;
        return Ok(());
    }

    // The stats provider can take a few seconds.
    ctx.defer().await?;

    let text = match ctx.data().profiles.save(user_id, region, &handle).await {
        Ok(outcome) => {
            tracing::info!(user_id, ?outcome, "/save command executed successful");
            "Saved!"
        }
        Err(SaveError::Provider(ProviderError::PlayerNotFound)) => {
            tracing::warn!(user_id, %region, handle = %handle, "Player not found at stats provider");
            "Player not found!"
        }
        Err(err) => {
            tracing::warn!(user_id, error = %err, "/save command failed");
            GENERIC_FAILURE
        }
    };

    ctx.say(text).await?;
    Ok(())
}

/// Show your stats and leaderboard place.
#[poise::command(slash_command)]
pub async fn me(ctx: Context<'_>) -> Result<(), Error> {
    let user_id = ctx.author().id.get();

    let profile = match ctx.data().profiles.get_for_user(user_id).await {
        Ok(profile) => profile,
        Err(err) => return reply_profile_error(ctx, "/me", &err).await,
    };

    // Unranked players still get a summary, just without a place.
    let rank = match ctx.data().leaderboard.render_self(&profile.id).await {
        Ok(rank) => Some(rank),
        Err(ProfileError::NotFound) => None,
        Err(err) => return reply_profile_error(ctx, "/me", &err).await,
    };

    tracing::info!(user_id, "/me command executed successful");
    ctx.say(format_self(&profile, rank.as_ref())).await?;
    Ok(())
}

/// Show your time on a single hero.
#[poise::command(slash_command)]
pub async fn hero(
    ctx: Context<'_>,
    #[description = "Hero name, e.g. Mercy"] name: String,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();

    let profile = match ctx.data().profiles.get_for_user(user_id).await {
        Ok(profile) => profile,
        Err(err) => return reply_profile_error(ctx, "/hero", &err).await,
    };

    tracing::info!(user_id, hero = %name, "/hero command executed successful");
    ctx.say(format_hero(&name, &profile)).await?;
    Ok(())
}

/// Join this server's leaderboard.
#[poise::command(slash_command, guild_only)]
pub async fn join(ctx: Context<'_>) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    match ctx.data().profiles.join_group(user_id, guild_id).await {
        Ok(_) => {
            tracing::info!(user_id, guild_id, "/join command executed successful");
            ctx.say("You are now on this server's leaderboard!").await?;
            Ok(())
        }
        Err(err) => reply_profile_error(ctx, "/join", &err).await,
    }
}

/// Turn a store error into a user-facing reply.
pub async fn reply_profile_error(
    ctx: Context<'_>,
    command: &str,
    err: &ProfileError,
) -> Result<(), Error> {
    let text = match err {
        ProfileError::NotFound => {
            tracing::warn!(user_id = ctx.author().id.get(), command, "No stored profile");
            NO_PROFILE
        }
        other => {
            tracing::error!(command, error = %other, "Profile store call failed");
            GENERIC_FAILURE
        }
    };
    ctx.say(text).await?;
    Ok(())
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
/// The store behind both services is the same process-wide pool.
pub struct Data {
    pub profiles: Arc<ProfileService<PostgresProfileStore, OwApiClient>>,
    pub leaderboard: Arc<LeaderboardService<PostgresProfileStore>>,
}
