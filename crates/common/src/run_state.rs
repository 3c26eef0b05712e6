//! Run state: the timestamp of the last polling cycle, kept under a single
//! Redis key so a restarted process only reports events it has not seen.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::CacheError;
use crate::redis_pool::create_redis_pool;

/// Format shared by the stored run state and the control plane's event filter.
pub const RUN_STATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp (UTC, whole seconds) for storage.
pub fn format_run_state(at: DateTime<Utc>) -> String {
    at.format(RUN_STATE_FORMAT).to_string()
}

/// Parse a stored run state back into a UTC timestamp.
pub fn parse_run_state(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), RUN_STATE_FORMAT).map(|naive| naive.and_utc())
}

/// Storage for the last-run timestamp.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// `Ok(None)` means no cycle has been recorded yet.
    async fn load(&self) -> Result<Option<DateTime<Utc>>, CacheError>;

    async fn save(&self, at: DateTime<Utc>) -> Result<(), CacheError>;
}

/// Redis-backed run state under one key, no expiry.
///
/// The connection is opened on first use, so an unreachable Redis at startup
/// only degrades the first cycle instead of stopping the process.
pub struct RedisRunState {
    client: redis::Client,
    key: String,
    timeout: Duration,
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisRunState {
    pub fn new(client: redis::Client, key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            key: key.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = create_redis_pool(&self.client, self.timeout).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
            .map_err(CacheError::from)
    }
}

#[async_trait]
impl RunStateStore for RedisRunState {
    async fn load(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = self.bounded(conn.get(&self.key)).await?;

        match raw {
            None => Ok(None),
            Some(value) => match parse_run_state(&value) {
                Ok(at) => Ok(Some(at)),
                Err(source) => Err(CacheError::Malformed { value, source }),
            },
        }
    }

    async fn save(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let value = format_run_state(at.trunc_subsecs(0));
        self.bounded(conn.set::<_, _, ()>(&self.key, &value)).await?;

        tracing::debug!(key = %self.key, value = %value, "Run state saved");
        Ok(())
    }
}
