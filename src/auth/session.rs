use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::Result;

/// Persisted session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub data: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Session store backed by SQLite
///
/// Rows are `(<sid_field>, sess, expired)`: the id, the JSON data bag and the
/// expiry as Unix milliseconds. Concurrent writers to the same id are
/// resolved last-write-wins.
#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Sqlite>,
    table: String,
    sid_field: String,
    ttl: Duration,
}

impl SessionStore {
    /// Create a new session store
    ///
    /// Table and column names must already be validated identifiers.
    pub fn new(pool: Pool<Sqlite>, config: &SessionConfig) -> Self {
        Self {
            pool,
            table: config.table_name.clone(),
            sid_field: config.sid_field.clone(),
            ttl: Duration::try_seconds(config.max_age()).unwrap_or(Duration::MAX),
        }
    }

    /// Create the session table if it does not exist
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {sid} TEXT PRIMARY KEY,
                sess TEXT NOT NULL,
                expired INTEGER NOT NULL
            )",
            table = self.table,
            sid = self.sid_field,
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_expired_index ON {table} (expired)",
            table = self.table,
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Allocate a new, unsaved session
    pub fn fresh(&self) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4().to_string(),
            data: Map::new(),
            expires_at: Utc::now() + self.ttl,
        }
    }

    /// Get a live session by ID
    ///
    /// Expired rows are deleted on sight and reported as missing.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(&format!(
            "SELECT {sid}, sess, expired FROM {table} WHERE {sid} = ?1",
            table = self.table,
            sid = self.sid_field,
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, sess, expired)) = row else {
            return Ok(None);
        };

        let data = match serde_json::from_str::<Map<String, Value>>(&sess) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Discarding unreadable session {}: {}", id, e);
                Map::new()
            }
        };
        let session = SessionRecord {
            id,
            data,
            expires_at: from_millis(expired),
        };

        if session.is_expired() {
            self.destroy(&session.id).await?;
            Ok(None)
        } else {
            Ok(Some(session))
        }
    }

    /// Write a session's data and restart its lifetime
    pub async fn save(&self, session_id: &str, data: &Map<String, Value>) -> Result<SessionRecord> {
        let expires_at = Utc::now() + self.ttl;
        let sess = serde_json::to_string(data)?;

        sqlx::query(&format!(
            "INSERT INTO {table} ({sid}, sess, expired) VALUES (?1, ?2, ?3)
             ON CONFLICT({sid}) DO UPDATE SET sess = excluded.sess, expired = excluded.expired",
            table = self.table,
            sid = self.sid_field,
        ))
        .bind(session_id)
        .bind(&sess)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(SessionRecord {
            id: session_id.to_string(),
            data: data.clone(),
            expires_at,
        })
    }

    /// Restart a session's lifetime without rewriting its data
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        let expires_at = Utc::now() + self.ttl;
        sqlx::query(&format!(
            "UPDATE {table} SET expired = ?1 WHERE {sid} = ?2",
            table = self.table,
            sid = self.sid_field,
        ))
        .bind(expires_at.timestamp_millis())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a session
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE {sid} = ?1",
            table = self.table,
            sid = self.sid_field,
        ))
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete all expired sessions
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE expired <= ?1",
            table = self.table,
        ))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Sweep expired sessions every `period` until shutdown
    ///
    /// The first sweep runs immediately.
    pub fn spawn_sweeper(
        &self,
        period: std::time::Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => match store.cleanup_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("Removed {} expired sessions", n),
                        Err(e) => tracing::warn!("Session sweep failed: {}", e),
                    },
                    _ = shutdown.recv() => {
                        tracing::debug!("Session sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    // Out-of-range values count as already expired
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
