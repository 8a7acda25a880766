//! History service for querying the publish log

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{AttemptQuery, Database};
use crate::types::{PublishAttempt, PublishStatus};
use crate::Result;

#[derive(Clone)]
pub struct HistoryService {
    db: Arc<Database>,
}

/// Query parameters for filtering attempts
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub post_id: Option<String>,
    pub status: Option<PublishStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Share of attempts that were sent, 0.0 when there are none
    pub success_rate: f64,
}

impl HistoryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Attempts matching `query`, newest first (default limit 20)
    pub async fn list_attempts(&self, query: HistoryQuery) -> Result<Vec<PublishAttempt>> {
        self.db
            .query_attempts(&AttemptQuery {
                post_id: query.post_id,
                status: query.status,
                since: query.since.map(|dt| dt.timestamp()),
                limit: query.limit.unwrap_or(20),
            })
            .await
    }

    /// Latest attempt for one post
    pub async fn last_attempt(&self, post_id: &str) -> Result<Option<PublishAttempt>> {
        self.db.latest_attempt(post_id).await
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        let counts = self.db.count_by_status().await?;
        let total = counts.total();
        let success_rate = if total == 0 {
            0.0
        } else {
            counts.sent as f64 / total as f64
        };

        Ok(HistoryStats {
            total,
            sent: counts.sent,
            failed: counts.failed,
            aborted: counts.aborted,
            success_rate,
        })
    }
}
