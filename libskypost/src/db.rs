//! Publish log storage

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{PublishAttempt, PublishStatus};

/// Filters for [`Database::query_attempts`]
#[derive(Debug, Clone, Default)]
pub struct AttemptQuery {
    pub post_id: Option<String>,
    pub status: Option<PublishStatus>,
    /// Unix timestamp, inclusive
    pub since: Option<i64>,
    pub limit: usize,
}

/// Attempt counts per terminal state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptCounts {
    pub sent: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl AttemptCounts {
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.aborted
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Append an attempt and return its row id
    pub async fn record_attempt(&self, attempt: &PublishAttempt) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO publish_attempts (post_id, status, record_uri, error_message, attempted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.post_id)
        .bind(attempt.status.as_str())
        .bind(&attempt.record_uri)
        .bind(&attempt.error_message)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Newest first
    pub async fn query_attempts(&self, query: &AttemptQuery) -> Result<Vec<PublishAttempt>> {
        let mut where_clauses = vec!["1=1"];
        if query.post_id.is_some() {
            where_clauses.push("post_id = ?");
        }
        if query.status.is_some() {
            where_clauses.push("status = ?");
        }
        if query.since.is_some() {
            where_clauses.push("attempted_at >= ?");
        }

        let sql = format!(
            r#"
            SELECT id, post_id, status, record_uri, error_message, attempted_at
            FROM publish_attempts
            WHERE {}
            ORDER BY attempted_at DESC, id DESC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut q = sqlx::query(&sql);
        if let Some(post_id) = &query.post_id {
            q = q.bind(post_id);
        }
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(since) = query.since {
            q = q.bind(since);
        }
        let limit = if query.limit == 0 { 20 } else { query.limit };
        q = q.bind(limit as i64);

        let rows = q.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;
        Ok(rows.iter().map(row_to_attempt).collect())
    }

    /// Most recent attempt for a post
    pub async fn latest_attempt(&self, post_id: &str) -> Result<Option<PublishAttempt>> {
        let attempts = self
            .query_attempts(&AttemptQuery {
                post_id: Some(post_id.to_string()),
                limit: 1,
                ..Default::default()
            })
            .await?;
        Ok(attempts.into_iter().next())
    }

    pub async fn count_by_status(&self) -> Result<AttemptCounts> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM publish_attempts GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut counts = AttemptCounts::default();
        for row in rows {
            let n = row.get::<i64, _>("n") as usize;
            match row.get::<String, _>("status").parse::<PublishStatus>() {
                Ok(PublishStatus::Sent) => counts.sent = n,
                Ok(PublishStatus::Failed) => counts.failed = n,
                Ok(PublishStatus::Aborted) => counts.aborted = n,
                Err(e) => tracing::warn!("Skipping unknown status in history: {}", e),
            }
        }
        Ok(counts)
    }
}

fn row_to_attempt(row: &SqliteRow) -> PublishAttempt {
    let status = row
        .get::<String, _>("status")
        .parse()
        .unwrap_or(PublishStatus::Failed);

    PublishAttempt {
        id: row.get("id"),
        post_id: row.get("post_id"),
        status,
        record_uri: row.get("record_uri"),
        error_message: row.get("error_message"),
        attempted_at: row.get("attempted_at"),
    }
}
