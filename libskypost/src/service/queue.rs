//! Work queue and the sequential worker
//!
//! Producers (stdin reader, refresh timer, embedding code) push
//! [`WorkItem`]s; a single [`Worker`] takes them one at a time, so a refresh
//! and a publish never overlap.

use tokio::sync::mpsc;

use super::posting::PostingService;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// The host published a post
    PostPublished { post_id: String },
    /// Periodic session refresh
    RefreshTick,
}

/// Producer handle for the work queue
#[derive(Clone)]
pub struct WorkQueue {
    sender: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// A queue and the worker that drains it
    pub fn new(posting: PostingService, capacity: usize) -> (Self, Worker) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, Worker { posting, receiver })
    }

    /// Enqueue a published post
    ///
    /// Returns `false` if the worker has stopped.
    pub async fn post_published(&self, post_id: impl Into<String>) -> bool {
        self.push(WorkItem::PostPublished {
            post_id: post_id.into(),
        })
        .await
    }

    pub async fn push(&self, item: WorkItem) -> bool {
        self.sender.send(item).await.is_ok()
    }

    /// Raw sender, for the refresh timer
    pub fn sender(&self) -> mpsc::Sender<WorkItem> {
        self.sender.clone()
    }
}

/// Summary of a worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub sent: usize,
    pub unsent: usize,
    pub refreshes: usize,
    pub refresh_failures: usize,
}

pub struct Worker {
    posting: PostingService,
    receiver: mpsc::Receiver<WorkItem>,
}

impl Worker {
    /// Process items until every [`WorkQueue`] handle is dropped
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Some(item) = self.receiver.recv().await {
            self.handle(item, &mut stats).await;
        }
        tracing::debug!("Work queue closed: {:?}", stats);
        stats
    }

    /// Process whatever is queued right now, then return
    pub async fn drain(&mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Ok(item) = self.receiver.try_recv() {
            self.handle(item, &mut stats).await;
        }
        stats
    }

    async fn handle(&self, item: WorkItem, stats: &mut WorkerStats) {
        match item {
            WorkItem::PostPublished { post_id } => {
                // Failures are already logged and recorded by the posting service
                match self.posting.publish_by_id(&post_id).await {
                    Ok(_) => stats.sent += 1,
                    Err(_) => stats.unsent += 1,
                }
            }
            WorkItem::RefreshTick => match self.posting.refresh_session().await {
                Ok(session) => {
                    stats.refreshes += 1;
                    tracing::info!("Scheduled refresh OK for {}", session.actor_id);
                }
                Err(e) => {
                    stats.refresh_failures += 1;
                    tracing::warn!("Scheduled refresh failed: {}", e);
                }
            },
        }
    }
}
