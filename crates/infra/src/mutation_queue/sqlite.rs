//! SQLite-backed mutation queue.
//!
//! Status transitions are single `UPDATE ... WHERE status = ?` statements,
//! so a transition either applies atomically or reports the item's actual
//! status without side effects.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use harbor_core::{HeaderList, ItemId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::r#trait::{MutationQueue, QueueItem, QueueStats, QueueStatus};
use crate::error::{StoreError, map_sqlx_error};

const ITEM_COLUMNS: &str = "seq, id, method, url, headers, body, status, attempts, last_error, submitted_at";

/// SQLite-backed mutation queue.
#[derive(Debug, Clone)]
pub struct SqliteMutationQueue {
    pool: SqlitePool,
}

impl SqliteMutationQueue {
    /// Wrap a pool whose schema has been applied (see [`crate::db`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_by_status(&self, status: QueueStatus) -> Result<Vec<QueueItem>, StoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM mutation_queue WHERE status = ?1 ORDER BY seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue list", e))?;

        rows.iter().map(row_to_item).collect()
    }

    /// Describe why a conditional statement matched nothing.
    async fn transition_error(&self, id: ItemId, expected: QueueStatus) -> StoreError {
        match MutationQueue::get(self, id).await {
            Ok(Some(item)) => StoreError::InvalidTransition {
                id,
                expected: expected.as_str(),
                actual: item.status.as_str().to_string(),
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => e,
        }
    }

    /// `in_flight → {to}` with an attempt recorded.
    async fn finish_attempt(
        &self,
        id: ItemId,
        to: QueueStatus,
        error: &str,
    ) -> Result<QueueItem, StoreError> {
        let sql = format!(
            r#"
            UPDATE mutation_queue
            SET status = ?1,
                attempts = attempts + 1,
                last_error = ?2,
                updated_at = ?3
            WHERE id = ?4
              AND status = ?5
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .bind(QueueStatus::InFlight.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue transition", e))?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(self.transition_error(id, QueueStatus::InFlight).await),
        }
    }

    async fn delete_if(&self, id: ItemId, expected: QueueStatus) -> Result<QueueItem, StoreError> {
        let sql = format!(
            "DELETE FROM mutation_queue WHERE id = ?1 AND status = ?2 RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue delete", e))?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(self.transition_error(id, expected).await),
        }
    }
}

#[async_trait::async_trait]
impl MutationQueue for SqliteMutationQueue {
    #[instrument(skip(self, item), fields(item_id = %item.id, method = %item.method))]
    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem, StoreError> {
        let headers = serde_json::to_string(&item.headers)
            .map_err(|e| StoreError::storage(format!("failed to serialize headers: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO mutation_queue (
                id,
                method,
                url,
                headers,
                body,
                status,
                attempts,
                last_error,
                submitted_at,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?8)
            RETURNING seq
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.method)
        .bind(&item.url)
        .bind(&headers)
        .bind(&item.body)
        .bind(QueueStatus::Pending.as_str())
        .bind(item.submitted_at.to_rfc3339())
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("queue enqueue", e))?;

        Ok(QueueItem {
            seq,
            status: QueueStatus::Pending,
            attempts: 0,
            last_error: None,
            ..item
        })
    }

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM mutation_queue WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue get", e))?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<QueueItem>, StoreError> {
        self.fetch_by_status(QueueStatus::Pending).await
    }

    async fn list_failed(&self) -> Result<Vec<QueueItem>, StoreError> {
        self.fetch_by_status(QueueStatus::FailedTerminal).await
    }

    async fn claim(&self, id: ItemId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE mutation_queue
            SET status = ?1,
                updated_at = ?2
            WHERE id = ?3
              AND status = ?4
            "#,
        )
        .bind(QueueStatus::InFlight.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(QueueStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("queue claim", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn complete(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        let mut item = self.delete_if(id, QueueStatus::InFlight).await?;
        item.status = QueueStatus::Delivered;
        Ok(item)
    }

    async fn release(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError> {
        self.finish_attempt(id, QueueStatus::Pending, error).await
    }

    async fn fail_terminal(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError> {
        self.finish_attempt(id, QueueStatus::FailedTerminal, error).await
    }

    async fn acknowledge_failure(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        self.delete_if(id, QueueStatus::FailedTerminal).await
    }

    async fn requeue(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        let sql = format!(
            r#"
            UPDATE mutation_queue
            SET status = ?1,
                attempts = 0,
                last_error = NULL,
                updated_at = ?2
            WHERE id = ?3
              AND status = ?4
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(QueueStatus::Pending.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .bind(QueueStatus::FailedTerminal.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("queue requeue", e))?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(self.transition_error(id, QueueStatus::FailedTerminal).await),
        }
    }

    async fn recover_in_flight(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE mutation_queue
            SET status = ?1,
                updated_at = ?2
            WHERE status = ?3
            "#,
        )
        .bind(QueueStatus::Pending.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(QueueStatus::InFlight.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("queue recover", e))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n
            FROM mutation_queue
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("queue stats", e))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("queue stats", e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("queue stats", e))?;
            let n = n.max(0) as usize;
            match QueueStatus::from_str(&status)? {
                QueueStatus::Pending => stats.pending = n,
                QueueStatus::InFlight => stats.in_flight = n,
                QueueStatus::FailedTerminal => stats.failed_terminal = n,
                QueueStatus::Delivered => {}
            }
        }
        Ok(stats)
    }
}

fn row_to_item(row: &SqliteRow) -> Result<QueueItem, StoreError> {
    let get_err = |e| map_sqlx_error("queue row", e);

    let seq: i64 = row.try_get("seq").map_err(get_err)?;
    let id: String = row.try_get("id").map_err(get_err)?;
    let method: String = row.try_get("method").map_err(get_err)?;
    let url: String = row.try_get("url").map_err(get_err)?;
    let headers: String = row.try_get("headers").map_err(get_err)?;
    let body: Vec<u8> = row.try_get("body").map_err(get_err)?;
    let status: String = row.try_get("status").map_err(get_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(get_err)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(get_err)?;
    let submitted_at: String = row.try_get("submitted_at").map_err(get_err)?;

    let id = ItemId::from_str(&id)
        .map_err(|e| StoreError::corrupt(format!("invalid queue item id '{id}': {e}")))?;
    let headers: HeaderList = serde_json::from_str(&headers)
        .map_err(|e| StoreError::corrupt(format!("invalid headers for {id}: {e}")))?;
    let submitted_at = DateTime::parse_from_rfc3339(&submitted_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("invalid submitted_at for {id}: {e}")))?;

    Ok(QueueItem {
        id,
        seq,
        method,
        url,
        headers,
        body,
        submitted_at,
        status: QueueStatus::from_str(&status)?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error,
    })
}
