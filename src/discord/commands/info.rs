use crate::discord::{Context, Error};

const DONATE_URL: &str = "https://paypal.me/krasovsky";

/// How to use the bot.
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Simple bot for Overwatch stats\n\n\
         **How to use:**\n\
         1. Use `/save` to save your game profile.\n\
         2. Use `/me` to see your stats.\n\
         3. Use `/join` in a server to show up on its leaderboard.\n\n\
         **Features:**\n\
         - Player profile (`/me`)\n\
         - Small summary for heroes (`/hero`)\n\
         - Rating tops for PC and consoles (`/ratingtop`)\n\
         - Reports after every game session, sent to your DMs",
    )
    .await?;

    tracing::info!("/start command executed successful");
    Ok(())
}

/// Help pay the server bills.
#[poise::command(slash_command)]
pub async fn donate(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(format!(
        "If you find this bot helpful, [you can make a small donation]({DONATE_URL}) \
         to help pay the server bills!"
    ))
    .await?;

    tracing::info!("/donate command executed successful");
    Ok(())
}
