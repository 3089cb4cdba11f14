// Discord command for the rating top lists.

use crate::core::profiles::Partition;
use crate::core::summary::format_top;
use crate::discord::{Context, Error};

use super::profile::GENERIC_FAILURE;

/// How many players a top list shows.
const RATING_TOP_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PlatformChoice {
    #[name = "pc"]
    Pc,
    #[name = "console"]
    Console,
}

impl From<PlatformChoice> for Partition {
    fn from(value: PlatformChoice) -> Self {
        match value {
            PlatformChoice::Pc => Partition::Pc,
            PlatformChoice::Console => Partition::Console,
        }
    }
}

/// Show the best rated players.
#[poise::command(slash_command)]
pub async fn ratingtop(
    ctx: Context<'_>,
    #[description = "pc or console"] platform: PlatformChoice,
    #[description = "Only players who joined this server (default: false)"] group: Option<bool>,
) -> Result<(), Error> {
    let partition = Partition::from(platform);

    let group = if group.unwrap_or(false) {
        match ctx.guild_id() {
            Some(guild_id) => Some(guild_id.get()),
            None => {
                ctx.say("Server leaderboards only work in servers.").await?;
                return Ok(());
            }
        }
    } else {
        None
    };

    match ctx
        .data()
        .leaderboard
        .render_top(partition, RATING_TOP_LIMIT, group)
        .await
    {
        Ok(entries) => {
            tracing::info!(
                platform = partition.as_str(),
                ?group,
                entries = entries.len(),
                "/ratingtop command executed successful"
            );
            ctx.say(format_top(partition, &entries)).await?;
        }
        Err(err) => {
            tracing::error!(platform = partition.as_str(), error = %err, "/ratingtop command failed");
            ctx.say(GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}
