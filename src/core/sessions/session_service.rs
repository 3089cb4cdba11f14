// Session reports: decide which profile changes are worth telling the player
// about, and hand those to a dispatcher.
//
// The trigger is the only consumer of the listener's channel, so events are
// handled one at a time in commit order.

use super::change_stream::ChangeEvent;
use crate::core::profiles::Profile;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report delivery failed: {0}")]
    Delivery(String),

    #[error("No report recipient for profile {0}")]
    InvalidTarget(String),
}

/// Delivers one session report.
#[async_trait]
pub trait ReportDispatcher: Send + Sync {
    async fn dispatch(&self, before: &Profile, after: &Profile) -> Result<(), ReportError>;
}

/// Decides whether a `(before, after)` pair is a session worth reporting.
pub type ReportablePredicate = Box<dyn Fn(&Profile, &Profile) -> bool + Send + Sync>;

/// Default policy: something game-related moved. Group joins and re-saves
/// with identical numbers are not sessions.
pub fn rating_or_games_changed(before: &Profile, after: &Profile) -> bool {
    before.rating != after.rating || before.stats.games_played != after.stats.games_played
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Not a session (first save, or the predicate said no).
    Skipped,
    Dispatched,
    /// Dispatch was attempted and failed. Logged, never propagated.
    Failed,
}

pub struct SessionReportTrigger<D: ReportDispatcher> {
    dispatcher: D,
    is_reportable: ReportablePredicate,
}

impl<D: ReportDispatcher> SessionReportTrigger<D> {
    pub fn new(
        dispatcher: D,
        is_reportable: impl Fn(&Profile, &Profile) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            dispatcher,
            is_reportable: Box::new(is_reportable),
        }
    }

    pub fn with_default_policy(dispatcher: D) -> Self {
        Self::new(dispatcher, rating_or_games_changed)
    }

    pub async fn handle(&self, event: &ChangeEvent) -> TriggerOutcome {
        // Inserts have nothing to compare against.
        let Some(before) = event.before.as_ref() else {
            return TriggerOutcome::Skipped;
        };
        if !(self.is_reportable)(before, &event.after) {
            return TriggerOutcome::Skipped;
        }

        match self.dispatcher.dispatch(before, &event.after).await {
            Ok(()) => {
                tracing::info!(profile_id = %event.after.id, "Session report sent");
                TriggerOutcome::Dispatched
            }
            Err(err) => {
                tracing::warn!(profile_id = %event.after.id, error = %err, "Session report failed");
                TriggerOutcome::Failed
            }
        }
    }

    /// Consume events until the listener side of the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<ChangeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        tracing::info!("Change channel closed, session report trigger stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profiles::{PlayerStats, ProfileDraft, Region};
    use crate::core::sessions::ChangeKind;
    use std::sync::{Arc, Mutex};

    /// Records every dispatch; fails for ids listed in `failing`.
    #[derive(Default, Clone)]
    struct RecordingDispatcher {
        sent: Arc<Mutex<Vec<(Option<i64>, Option<i64>)>>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl ReportDispatcher for RecordingDispatcher {
        async fn dispatch(&self, before: &Profile, after: &Profile) -> Result<(), ReportError> {
            if self.failing.contains(&after.id) {
                return Err(ReportError::Delivery("dm closed".into()));
            }
            self.sent.lock().unwrap().push((before.rating, after.rating));
            Ok(())
        }
    }

    fn profile(id: &str, rating: i64, chat: Option<u64>) -> Profile {
        ProfileDraft {
            id: id.to_string(),
            region: Region::Eu,
            nick: "Nick-1".into(),
            rating: Some(rating),
            chat,
            heroes: Default::default(),
            stats: PlayerStats::default(),
        }
        .into_profile(chrono::Utc::now())
    }

    fn update(before: Profile, after: Profile) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Update,
            before: Some(before),
            after,
        }
    }

    #[tokio::test]
    async fn rating_change_dispatches_once_with_the_pair() {
        let dispatcher = RecordingDispatcher::default();
        let trigger = SessionReportTrigger::with_default_policy(dispatcher.clone());

        let event = update(profile("dc1", 3000, None), profile("dc1", 3200, None));
        assert_eq!(trigger.handle(&event).await, TriggerOutcome::Dispatched);
        assert_eq!(*dispatcher.sent.lock().unwrap(), vec![(Some(3000), Some(3200))]);
    }

    #[tokio::test]
    async fn chat_only_update_is_not_a_session() {
        let dispatcher = RecordingDispatcher::default();
        let trigger = SessionReportTrigger::with_default_policy(dispatcher.clone());

        let event = update(profile("dc1", 3000, None), profile("dc1", 3000, Some(42)));
        assert_eq!(trigger.handle(&event).await, TriggerOutcome::Skipped);
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inserts_are_never_reported() {
        let dispatcher = RecordingDispatcher::default();
        let trigger = SessionReportTrigger::new(dispatcher.clone(), |_, _| true);

        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            before: None,
            after: profile("dc1", 3000, None),
        };
        assert_eq!(trigger.handle(&event).await, TriggerOutcome::Skipped);
    }

    #[tokio::test]
    async fn injected_predicate_overrides_the_default() {
        let dispatcher = RecordingDispatcher::default();
        let trigger = SessionReportTrigger::new(dispatcher.clone(), |before, after| {
            after.rating.unwrap_or(0) - before.rating.unwrap_or(0) >= 100
        });

        let small = update(profile("dc1", 3000, None), profile("dc1", 3050, None));
        let big = update(profile("dc1", 3050, None), profile("dc1", 3200, None));
        assert_eq!(trigger.handle(&small).await, TriggerOutcome::Skipped);
        assert_eq!(trigger.handle(&big).await, TriggerOutcome::Dispatched);
    }

    #[tokio::test]
    async fn failed_dispatch_does_not_stop_the_loop() {
        let dispatcher = RecordingDispatcher {
            failing: vec!["dc1".to_string()],
            ..Default::default()
        };
        let trigger = SessionReportTrigger::with_default_policy(dispatcher.clone());

        let (tx, rx) = mpsc::channel(8);
        tx.send(update(profile("dc1", 1, None), profile("dc1", 2, None)))
            .await
            .unwrap();
        tx.send(update(profile("dc2", 5, None), profile("dc2", 6, None)))
            .await
            .unwrap();
        drop(tx);

        trigger.run(rx).await;
        assert_eq!(*dispatcher.sent.lock().unwrap(), vec![(Some(5), Some(6))]);
    }
}
