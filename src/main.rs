// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (Postgres, stats API)
// - `discord/` = Discord-specific adapters (commands, report delivery)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the change listener and the session report trigger
// 4. Set up the Discord framework and register commands

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::AppConfig;
use crate::core::leaderboard::LeaderboardService;
use crate::core::profiles::{ProfileService, PROFILE_ID_PREFIX};
use crate::core::sessions::{ChangeListener, IdFilter, SessionReportTrigger};
use crate::discord::sessions::DiscordReportDispatcher;
use crate::discord::{Data, Error};
use crate::infra::profiles::{PgChangeFeed, PostgresProfileStore};
use crate::infra::stats::OwApiClient;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Change events waiting for the report trigger.
const CHANGE_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    // ========================================================================
    // SERVICES
    // ========================================================================

    let store = Arc::new(
        PostgresProfileStore::connect(&config)
            .await
            .context("Failed to connect to the profile store")?,
    );
    tracing::info!(database = %config.db_name, "Profile store ready");

    let stats_client = OwApiClient::new()?;
    let profile_service = Arc::new(ProfileService::new(
        Arc::clone(&store),
        stats_client,
        config.store_timeout,
    ));
    let leaderboard_service = Arc::new(LeaderboardService::new(
        Arc::clone(&store),
        config.store_timeout,
    ));

    // ========================================================================
    // CHANGE STREAM
    // ========================================================================
    // The listener is subscribed before the gateway connects so no write
    // made after start-up goes unobserved.

    let feed = Arc::new(PgChangeFeed::new(store.pool().clone()));
    let listener = ChangeListener::new(
        feed,
        IdFilter::prefix(PROFILE_ID_PREFIX),
        config.reconnect,
    );
    let (changes_tx, changes_rx) = mpsc::channel(CHANGE_QUEUE);
    let listener_task = listener
        .start(changes_tx)
        .await
        .context("Failed to subscribe to profile changes")?;

    tokio::spawn(async move {
        match listener_task.await {
            Ok(Ok(())) => tracing::info!("Change listener stopped"),
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Change stream lost, shutting down");
                std::process::exit(1);
            }
            Err(err) => {
                tracing::error!(error = %err, "Change listener task crashed, shutting down");
                std::process::exit(1);
            }
        }
    });

    let data = Data {
        profiles: Arc::clone(&profile_service),
        leaderboard: Arc::clone(&leaderboard_service),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Slash commands only, so the non-privileged intents are enough.

    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![
                discord::commands::info::start(),
                discord::commands::info::donate(),
                discord::commands::profile::save(),
                discord::commands::profile::me(),
                discord::commands::profile::hero(),
                discord::commands::profile::join(),
                discord::commands::leaderboard::ratingtop(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!(user = %ready.user.name, "Commands registered, bot is ready");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    // Reports go out over the same HTTP client the gateway uses.
    let trigger = SessionReportTrigger::with_default_policy(DiscordReportDispatcher::new(
        Arc::clone(&client.http),
    ));
    tokio::spawn(trigger.run(changes_rx));

    client.start().await.context("Error running bot")?;
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(command = %ctx.command().name, error = %error, "Command failed");
            if let Err(err) = ctx.say(discord::commands::profile::GENERIC_FAILURE).await {
                tracing::warn!(error = %err, "Could not report the failure to the user");
            }
        }
        other => {
            if let Err(err) = poise::builtins::on_error(other).await {
                tracing::error!(error = %err, "Error while handling error");
            }
        }
    }
}
