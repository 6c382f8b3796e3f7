pub mod lease;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

use crate::models::{FailureKind, NewWatch, Watch, WatchKey};
use crate::utils::error::{AppError, Result};

pub use lease::{KeyedLeases, Lease};

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertChange {
    Created,
    /// Target changed; the watch was re-armed.
    Retargeted,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub watch: Watch,
    pub change: UpsertChange,
}

#[derive(Debug, FromRow)]
struct WatchRow {
    url: String,
    recipient: String,
    target_price: String,
    last_price: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_alert_sent_at: Option<DateTime<Utc>>,
    alert_already_sent: bool,
    last_failure: Option<FailureKind>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| AppError::Parse {
        message: format!("stored {} '{}' is not a decimal: {}", column, value, e),
    })
}

impl TryFrom<WatchRow> for Watch {
    type Error = AppError;

    fn try_from(row: WatchRow) -> Result<Self> {
        Ok(Watch {
            target_price: parse_decimal("target_price", &row.target_price)?,
            last_price: row
                .last_price
                .as_deref()
                .map(|p| parse_decimal("last_price", p))
                .transpose()?,
            url: row.url,
            recipient: row.recipient,
            last_checked_at: row.last_checked_at,
            last_alert_sent_at: row.last_alert_sent_at,
            alert_already_sent: row.alert_already_sent,
            last_failure: row.last_failure,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_WATCH: &str = "SELECT url, recipient, target_price, last_price, last_checked_at, \
     last_alert_sent_at, alert_already_sent, last_failure, created_at, updated_at FROM watches";

/// SQLite-backed record store keyed by `(url, recipient)`.
///
/// The store itself does not serialize writers. Callers mutating a key hold
/// that key's [`Lease`] from [`KeyedLeases`] across read-modify-write.
#[derive(Debug, Clone)]
pub struct WatchStore {
    pool: SqlitePool,
}

impl WatchStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database. Pinned to a single connection so every
    /// query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the watch if absent; otherwise applies the new target,
    /// re-arming only when it differs from the stored one.
    pub async fn upsert(&self, new_watch: NewWatch, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        match self.get(&new_watch.key()).await? {
            Some(mut watch) => {
                if !watch.retarget(new_watch.target_price, now) {
                    return Ok(UpsertOutcome {
                        watch,
                        change: UpsertChange::Unchanged,
                    });
                }

                sqlx::query(
                    "UPDATE watches SET target_price = ?, alert_already_sent = ?, updated_at = ? \
                     WHERE url = ? AND recipient = ?",
                )
                .bind(watch.target_price.to_string())
                .bind(watch.alert_already_sent)
                .bind(watch.updated_at)
                .bind(&watch.url)
                .bind(&watch.recipient)
                .execute(&self.pool)
                .await?;

                tracing::info!(key = %watch.key(), target = %watch.target_price, "watch re-armed with new target");
                Ok(UpsertOutcome {
                    watch,
                    change: UpsertChange::Retargeted,
                })
            }
            None => {
                let watch = Watch::new(new_watch, now);
                sqlx::query(
                    "INSERT INTO watches (url, recipient, target_price, last_price, last_checked_at, \
                     last_alert_sent_at, alert_already_sent, last_failure, created_at, updated_at) \
                     VALUES (?, ?, ?, NULL, NULL, NULL, ?, NULL, ?, ?)",
                )
                .bind(&watch.url)
                .bind(&watch.recipient)
                .bind(watch.target_price.to_string())
                .bind(watch.alert_already_sent)
                .bind(watch.created_at)
                .bind(watch.updated_at)
                .execute(&self.pool)
                .await?;

                tracing::info!(key = %watch.key(), target = %watch.target_price, "watch created");
                Ok(UpsertOutcome {
                    watch,
                    change: UpsertChange::Created,
                })
            }
        }
    }

    pub async fn get(&self, key: &WatchKey) -> Result<Option<Watch>> {
        let row: Option<WatchRow> =
            sqlx::query_as(&format!("{} WHERE url = ? AND recipient = ?", SELECT_WATCH))
                .bind(&key.url)
                .bind(&key.recipient)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Watch::try_from).transpose()
    }

    /// Every stored watch, in insertion order.
    pub async fn list_all(&self) -> Result<Vec<Watch>> {
        let rows: Vec<WatchRow> = sqlx::query_as(&format!("{} ORDER BY rowid", SELECT_WATCH))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Watch::try_from).collect()
    }

    /// Persists the check-cycle fields of `watch`. The target is left alone.
    pub async fn save_check_state(&self, watch: &Watch) -> Result<()> {
        let result = sqlx::query(
            "UPDATE watches SET last_price = ?, last_checked_at = ?, last_alert_sent_at = ?, \
             alert_already_sent = ?, last_failure = ?, updated_at = ? \
             WHERE url = ? AND recipient = ?",
        )
        .bind(watch.last_price.map(|p| p.to_string()))
        .bind(watch.last_checked_at)
        .bind(watch.last_alert_sent_at)
        .bind(watch.alert_already_sent)
        .bind(watch.last_failure)
        .bind(watch.updated_at)
        .bind(&watch.url)
        .bind(&watch.recipient)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("watch {}", watch.key()),
            });
        }
        Ok(())
    }

    /// Returns false when there was nothing to remove.
    pub async fn remove(&self, key: &WatchKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watches WHERE url = ? AND recipient = ?")
            .bind(&key.url)
            .bind(&key.recipient)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM watches")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
