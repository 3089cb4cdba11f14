// Live feed of profile writes, and the single listener task that pumps it
// into the session report trigger.
//
// Delivery is at-most-once: a dropped subscription loses whatever was in
// flight, and a new subscription starts fresh with no checkpoint.

use crate::core::profiles::Profile;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_JITTER_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// One committed write. `before` is `None` for inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub before: Option<Profile>,
    pub after: Profile,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("could not open change stream: {0}")]
    Connect(String),

    #[error("change stream connection lost")]
    ConnectionLost,

    /// A single event could not be decoded. The stream itself is still usable.
    #[error("undecodable change event: {0}")]
    Decode(String),
}

/// Which ids the listener forwards.
#[derive(Debug, Clone)]
pub struct IdFilter {
    prefix: String,
}

impl IdFilter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        id.starts_with(&self.prefix)
    }
}

/// What the listener does once its subscription is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Stop and report the loss. The process is expected to exit.
    Exit,
    /// Open a brand-new subscription, backing off up to `max_backoff`.
    Retry { max_backoff: Duration },
}

/// An open subscription. Each call waits for the next committed write.
#[async_trait]
pub trait ChangeStream: Send {
    async fn next_change(&mut self) -> Result<ChangeEvent, StreamError>;
}

/// Something that can open change subscriptions.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    type Stream: ChangeStream + 'static;

    async fn subscribe(&self) -> Result<Self::Stream, StreamError>;
}

/// Owns the one long-lived subscription and forwards matching events
/// over an mpsc channel.
pub struct ChangeListener<F: ChangeFeed> {
    feed: Arc<F>,
    filter: IdFilter,
    policy: ReconnectPolicy,
}

impl<F: ChangeFeed + 'static> ChangeListener<F> {
    pub fn new(feed: Arc<F>, filter: IdFilter, policy: ReconnectPolicy) -> Self {
        Self {
            feed,
            filter,
            policy,
        }
    }

    /// Open the subscription and spawn the pump task.
    ///
    /// Failing to subscribe here is returned to the caller (start-up is
    /// fatal). The task resolves `Ok` once the receiving side hangs up, or
    /// `Err` when the subscription is lost under [`ReconnectPolicy::Exit`].
    pub async fn start(
        self,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<JoinHandle<Result<(), StreamError>>, StreamError> {
        let stream = self.feed.subscribe().await?;
        tracing::info!(policy = ?self.policy, "Change stream subscribed");
        Ok(tokio::spawn(self.run(stream, events)))
    }

    async fn run(
        self,
        mut stream: F::Stream,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<(), StreamError> {
        loop {
            match stream.next_change().await {
                Ok(event) => {
                    if !self.filter.matches(&event.after.id) {
                        continue;
                    }
                    tracing::debug!(profile_id = %event.after.id, kind = ?event.kind, "Profile changed");
                    if events.send(event).await.is_err() {
                        tracing::info!("Session report trigger is gone, stopping change listener");
                        return Ok(());
                    }
                }
                Err(StreamError::Decode(reason)) => {
                    tracing::warn!(%reason, "Skipping undecodable change event");
                }
                Err(err) => match self.policy {
                    ReconnectPolicy::Exit => return Err(err),
                    ReconnectPolicy::Retry { max_backoff } => {
                        tracing::warn!(error = %err, "Change stream lost, resubscribing");
                        stream = self.resubscribe(max_backoff).await;
                    }
                },
            }
        }
    }

    async fn resubscribe(&self, max_backoff: Duration) -> F::Stream {
        let mut backoff = INITIAL_BACKOFF.min(max_backoff);
        loop {
            tokio::time::sleep(with_jitter(backoff)).await;
            match self.feed.subscribe().await {
                Ok(stream) => {
                    tracing::info!("Change stream resubscribed; writes during the gap are not replayed");
                    return stream;
                }
                Err(err) => {
                    tracing::warn!(error = %err, ?backoff, "Change stream resubscribe failed");
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }
}

fn with_jitter(backoff: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
    backoff + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profiles::{PlayerStats, ProfileDraft, ProfileStore, Region};
    use crate::infra::profiles::InMemoryProfileStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn draft(id: &str, rating: i64) -> ProfileDraft {
        ProfileDraft {
            id: id.to_string(),
            region: Region::Eu,
            nick: format!("{id}-1"),
            rating: Some(rating),
            chat: None,
            heroes: Default::default(),
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn filter_matches_on_prefix() {
        let filter = IdFilter::prefix("dc");
        assert!(filter.matches("dc123"));
        assert!(!filter.matches("tg123"));
        assert!(!filter.matches(""));
    }

    #[tokio::test]
    async fn forwards_only_matching_ids_in_commit_order() {
        let store = Arc::new(InMemoryProfileStore::new());
        let listener = ChangeListener::new(
            Arc::clone(&store),
            IdFilter::prefix("dc"),
            ReconnectPolicy::Exit,
        );
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = listener.start(tx).await.unwrap();

        store.upsert(draft("dc1", 3000)).await.unwrap();
        store.upsert(draft("other", 9000)).await.unwrap();
        store.upsert(draft("dc1", 3200)).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Insert);
        assert_eq!(first.before, None);
        assert_eq!(first.after.rating, Some(3000));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Update);
        assert_eq!(second.before.unwrap().rating, Some(3000));
        assert_eq!(second.after.rating, Some(3200));
    }

    /// A feed that hands out streams from a script; each stream replays its
    /// items then reports a lost connection.
    struct ScriptedFeed {
        scripts: Mutex<Vec<Vec<Result<ChangeEvent, StreamError>>>>,
        subscriptions: AtomicUsize,
    }

    struct ScriptedStream {
        /// `None` models a healthy connection with no traffic.
        items: Option<std::vec::IntoIter<Result<ChangeEvent, StreamError>>>,
    }

    #[async_trait]
    impl ChangeStream for ScriptedStream {
        async fn next_change(&mut self) -> Result<ChangeEvent, StreamError> {
            let Some(items) = self.items.as_mut() else {
                return std::future::pending().await;
            };
            match items.next() {
                Some(item) => item,
                None => Err(StreamError::ConnectionLost),
            }
        }
    }

    #[async_trait]
    impl ChangeFeed for ScriptedFeed {
        type Stream = ScriptedStream;

        async fn subscribe(&self) -> Result<ScriptedStream, StreamError> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            let items = if scripts.is_empty() {
                None
            } else {
                Some(scripts.remove(0).into_iter())
            };
            Ok(ScriptedStream { items })
        }
    }

    fn update_event(id: &str, from: i64, to: i64) -> ChangeEvent {
        let before = draft(id, from).into_profile(chrono::Utc::now());
        let after = draft(id, to).into_profile(chrono::Utc::now());
        ChangeEvent {
            kind: ChangeKind::Update,
            before: Some(before),
            after,
        }
    }

    #[tokio::test]
    async fn exit_policy_surfaces_lost_connection() {
        let feed = Arc::new(ScriptedFeed {
            scripts: Mutex::new(vec![vec![
                Ok(update_event("dc1", 1, 2)),
                Err(StreamError::Decode("garbage".into())),
            ]]),
            subscriptions: AtomicUsize::new(0),
        });
        let listener = ChangeListener::new(feed, IdFilter::prefix("dc"), ReconnectPolicy::Exit);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = listener.start(tx).await.unwrap();

        // The decode failure is skipped, the lost connection ends the task.
        assert_eq!(rx.recv().await.unwrap().after.rating, Some(2));
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(StreamError::ConnectionLost)));
    }

    #[tokio::test]
    async fn retry_policy_opens_a_fresh_subscription() {
        let feed = Arc::new(ScriptedFeed {
            scripts: Mutex::new(vec![
                vec![Ok(update_event("dc1", 1, 2))],
                vec![Ok(update_event("dc1", 2, 3))],
            ]),
            subscriptions: AtomicUsize::new(0),
        });
        let listener = ChangeListener::new(
            Arc::clone(&feed),
            IdFilter::prefix("dc"),
            ReconnectPolicy::Retry {
                max_backoff: Duration::from_millis(10),
            },
        );
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = listener.start(tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().after.rating, Some(2));
        assert_eq!(rx.recv().await.unwrap().after.rating, Some(3));
        assert!(feed.subscriptions.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn listener_stops_when_receiver_hangs_up() {
        let feed = Arc::new(ScriptedFeed {
            scripts: Mutex::new(vec![vec![Ok(update_event("dc1", 1, 2))]]),
            subscriptions: AtomicUsize::new(0),
        });
        let listener = ChangeListener::new(feed, IdFilter::prefix("dc"), ReconnectPolicy::Exit);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = listener.start(tx).await.unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
