// Postgres implementation of the profile ports.
//
// Profiles live in one table keyed by id with a descending rating index.
// A row trigger publishes every insert/update on the `profile_changes`
// channel, which `PgChangeFeed` listens to.

use crate::config::AppConfig;
use crate::core::profiles::{
    Partition, PlayerStats, Profile, ProfileDraft, ProfileError, ProfileStore, RankIndex,
    RankResult, Region, WriteOutcome,
};
use crate::core::sessions::{ChangeEvent, ChangeFeed, ChangeStream, StreamError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Notification channel the row trigger publishes to.
pub const CHANGE_CHANNEL: &str = "profile_changes";

const PROFILE_COLUMNS: &str = "id, region, nick, rating, chat, date, heroes, stats";

pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let options = connect_options(&config.db_address)?
            .password(&config.db_password)
            .database(&config.db_name);

        let pool = PgPoolOptions::new()
            .max_connections(config.db_pool_size)
            .acquire_timeout(config.store_timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                region TEXT NOT NULL,
                nick TEXT NOT NULL,
                rating BIGINT,
                chat BIGINT,
                date TIMESTAMPTZ NOT NULL DEFAULT now(),
                heroes JSONB NOT NULL DEFAULT '{}',
                stats JSONB NOT NULL DEFAULT '{}'
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS profiles_rating_idx ON profiles (rating DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE OR REPLACE FUNCTION notify_profile_change() RETURNS trigger AS $$
            BEGIN
                PERFORM pg_notify(
                    'profile_changes',
                    json_build_object(
                        'kind', lower(TG_OP),
                        'before', CASE WHEN TG_OP = 'UPDATE' THEN row_to_json(OLD) END,
                        'after', row_to_json(NEW)
                    )::text
                );
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql;
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("DROP TRIGGER IF EXISTS profiles_notify ON profiles")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER profiles_notify
            AFTER INSERT OR UPDATE ON profiles
            FOR EACH ROW EXECUTE FUNCTION notify_profile_change();
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Accepts a full `postgres://` URL or a bare `host[:port]`.
fn connect_options(address: &str) -> anyhow::Result<PgConnectOptions> {
    if address.starts_with("postgres://") || address.starts_with("postgresql://") {
        return Ok(PgConnectOptions::from_str(address)?);
    }

    let options = match address.rsplit_once(':') {
        Some((host, port)) => PgConnectOptions::new()
            .host(host)
            .port(port.parse()?),
        None => PgConnectOptions::new().host(address),
    };
    Ok(options)
}

fn storage_error(err: sqlx::Error) -> ProfileError {
    ProfileError::Storage(err.to_string())
}

fn row_to_profile(row: &PgRow) -> Result<Profile, ProfileError> {
    let region: String = row.try_get("region").map_err(storage_error)?;
    let region = Region::from_str(&region).map_err(|e| ProfileError::Storage(e.to_string()))?;
    let heroes: Json<BTreeMap<String, u64>> = row.try_get("heroes").map_err(storage_error)?;
    let stats: Json<PlayerStats> = row.try_get("stats").map_err(storage_error)?;
    let date: DateTime<Utc> = row.try_get("date").map_err(storage_error)?;

    Ok(Profile {
        id: row.try_get("id").map_err(storage_error)?,
        region,
        nick: row.try_get("nick").map_err(storage_error)?,
        rating: row.try_get("rating").map_err(storage_error)?,
        chat: row
            .try_get::<Option<i64>, _>("chat")
            .map_err(storage_error)?
            .map(|chat| chat as u64),
        date,
        heroes: heroes.0,
        stats: stats.0,
    })
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get(&self, id: &str) -> Result<Profile, ProfileError> {
        let row = sqlx::query(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => row_to_profile(&row),
            None => Err(ProfileError::NotFound),
        }
    }

    async fn upsert(&self, draft: ProfileDraft) -> Result<WriteOutcome, ProfileError> {
        // xmax is 0 only for a freshly inserted tuple.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO profiles (id, region, nick, rating, chat, date, heroes, stats)
            VALUES ($1, $2, $3, $4, $5, now(), $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                region = excluded.region,
                nick = excluded.nick,
                rating = excluded.rating,
                chat = excluded.chat,
                date = excluded.date,
                heroes = excluded.heroes,
                stats = excluded.stats
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&draft.id)
        .bind(draft.region.as_str())
        .bind(&draft.nick)
        .bind(draft.rating)
        .bind(draft.chat.map(|chat| chat as i64))
        .bind(Json(&draft.heroes))
        .bind(Json(&draft.stats))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(if inserted {
            WriteOutcome::Inserted
        } else {
            WriteOutcome::Replaced
        })
    }

    async fn attach_chat(&self, id: &str, chat: u64) -> Result<WriteOutcome, ProfileError> {
        let result = sqlx::query("UPDATE profiles SET chat = $2 WHERE id = $1")
            .bind(id)
            .bind(chat as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ProfileError::NotFound);
        }
        Ok(WriteOutcome::Updated)
    }
}

#[async_trait]
impl RankIndex for PostgresProfileStore {
    async fn top_n(
        &self,
        partition: Partition,
        limit: usize,
        group: Option<u64>,
    ) -> Result<Vec<Profile>, ProfileError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE rating IS NOT NULL
              AND (region = ANY($1)) = $2
              AND ($3::BIGINT IS NULL OR chat = $3)
            ORDER BY rating DESC, id ASC
            LIMIT $4
            "#
        ))
        .bind(Partition::console_tags())
        .bind(partition == Partition::Console)
        .bind(group.map(|chat| chat as i64))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(row_to_profile).collect()
    }

    async fn place_of(&self, id: &str, partition: Partition) -> Result<RankResult, ProfileError> {
        // Offset and population come from one statement, so one snapshot.
        let row = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT id, rating FROM profiles
                WHERE rating IS NOT NULL AND (region = ANY($2)) = $3
            ),
            me AS (
                SELECT id, rating FROM ranked WHERE id = $1
            )
            SELECT
                (SELECT COUNT(*) FROM ranked, me
                  WHERE ranked.rating > me.rating
                     OR (ranked.rating = me.rating AND ranked.id < me.id)) AS ahead,
                (SELECT COUNT(*) FROM ranked) AS population
            FROM me
            "#,
        )
        .bind(id)
        .bind(Partition::console_tags())
        .bind(partition == Partition::Console)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or(ProfileError::NotFound)?;

        let ahead: i64 = row.try_get("ahead").map_err(storage_error)?;
        let population: i64 = row.try_get("population").map_err(storage_error)?;

        RankResult::from_offset(ahead as u64, population as u64).ok_or(ProfileError::NotFound)
    }
}

// ============================================================================
// CHANGE FEED
// ============================================================================

/// Opens LISTEN subscriptions on [`CHANGE_CHANNEL`] from the store's pool.
pub struct PgChangeFeed {
    pool: PgPool,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    type Stream = PgChangeStream;

    async fn subscribe(&self) -> Result<PgChangeStream, StreamError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(PgChangeStream { listener })
    }
}

pub struct PgChangeStream {
    listener: PgListener,
}

#[async_trait]
impl ChangeStream for PgChangeStream {
    async fn next_change(&mut self) -> Result<ChangeEvent, StreamError> {
        // `try_recv` reports a dropped connection as `Ok(None)` instead of
        // silently reconnecting, which would hide the gap.
        let notification = match self.listener.try_recv().await {
            Ok(Some(notification)) => notification,
            Ok(None) => return Err(StreamError::ConnectionLost),
            Err(err) => {
                tracing::error!(error = %err, "Change listener failed");
                return Err(StreamError::ConnectionLost);
            }
        };

        serde_json::from_str(notification.payload()).map_err(|e| StreamError::Decode(e.to_string()))
    }
}
