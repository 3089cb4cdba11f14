// Delivers session reports as direct messages to the player who owns the
// profile.

use crate::core::profiles::{user_id_from_profile_id, Profile};
use crate::core::sessions::{ReportDispatcher, ReportError};
use crate::core::summary::format_session_report;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct DiscordReportDispatcher {
    http: Arc<serenity::Http>,
}

impl DiscordReportDispatcher {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReportDispatcher for DiscordReportDispatcher {
    async fn dispatch(&self, before: &Profile, after: &Profile) -> Result<(), ReportError> {
        let user_id = user_id_from_profile_id(&after.id)
            .filter(|id| *id != 0)
            .ok_or_else(|| ReportError::InvalidTarget(after.id.clone()))?;

        let text = format_session_report(before, after);

        let channel = serenity::UserId::new(user_id)
            .create_dm_channel(&*self.http)
            .await
            .map_err(|e| ReportError::Delivery(e.to_string()))?;
        channel
            .say(&*self.http, text)
            .await
            .map_err(|e| ReportError::Delivery(e.to_string()))?;

        Ok(())
    }
}
