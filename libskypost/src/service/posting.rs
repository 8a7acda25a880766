//! Posting service
//!
//! One publish is: refresh the session, guard on credentials, submit the
//! record, interpret the status, record the attempt. Nothing is retried.

use std::sync::Arc;
use tracing::{info, warn};

use super::events::{Event, EventBus};
use crate::bluesky::CreateRecordOutput;
use crate::credentials::CredentialManager;
use crate::db::Database;
use crate::error::{PublishError, SkypostError};
use crate::posts::PostSource;
use crate::publisher::{ensure_credentials, Publisher};
use crate::types::{Post, PublishAttempt, PublishStatus, Session};
use crate::Result;

#[derive(Clone)]
pub struct PostingService {
    credentials: CredentialManager,
    publisher: Publisher,
    posts: Arc<dyn PostSource>,
    db: Arc<Database>,
    domain: String,
    event_bus: EventBus,
}

/// A record the server accepted
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub post_id: String,
    /// `None` when a 2xx response carried no parseable body
    pub record: Option<CreateRecordOutput>,
}

impl PublishOutcome {
    pub fn record_uri(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.uri.as_str())
    }
}

impl PostingService {
    pub fn new(
        credentials: CredentialManager,
        publisher: Publisher,
        posts: Arc<dyn PostSource>,
        db: Arc<Database>,
        domain: String,
        event_bus: EventBus,
    ) -> Self {
        Self {
            credentials,
            publisher,
            posts,
            db,
            domain,
            event_bus,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Look a post up and publish it
    ///
    /// # Errors
    ///
    /// `PublishError::PostNotFound` if the source has no such post, otherwise
    /// as [`PostingService::publish_post`].
    pub async fn publish_by_id(&self, post_id: &str) -> Result<PublishOutcome> {
        let post = match self.posts.get(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                let err = PublishError::PostNotFound(post_id.to_string());
                self.abort(post_id, &err.to_string()).await;
                return Err(err.into());
            }
            Err(e) => {
                self.abort(post_id, &e.to_string()).await;
                return Err(e);
            }
        };

        self.publish_post(&post).await
    }

    /// Refresh, then submit `post`
    ///
    /// Every call leaves exactly one row in the history database:
    /// `aborted` when no write call was made, `failed` when the write call
    /// errored or was rejected, `sent` on a 2xx response.
    ///
    /// # Errors
    ///
    /// - `AuthError` / `StoreError` if the session refresh fails (aborted)
    /// - `PublishError::MissingCredentials` or an excerpt error (aborted)
    /// - `TransportError` if the write call got no response (failed)
    /// - `PublishError::Rejected` on a non-2xx response (failed)
    pub async fn publish_post(&self, post: &Post) -> Result<PublishOutcome> {
        self.event_bus.emit(Event::PublishStarted {
            post_id: post.id.clone(),
        });

        let session = match self.refresh().await {
            Ok(session) => session,
            Err(e) => {
                self.abort(&post.id, &e.to_string()).await;
                return Err(e);
            }
        };

        if let Err(e) = ensure_credentials(&session, &self.domain) {
            self.abort(&post.id, &e.to_string()).await;
            return Err(e.into());
        }

        let response = match self.publisher.publish(post, &session, &self.domain).await {
            Ok(response) => response,
            Err(e @ SkypostError::Publish(_)) => {
                self.abort(&post.id, &e.to_string()).await;
                return Err(e);
            }
            Err(e) => {
                self.fail(&post.id, &e.to_string()).await;
                return Err(e);
            }
        };

        if !response.is_success() {
            let err = PublishError::Rejected {
                status: response.status,
                body: response.error_summary(),
            };
            self.fail(&post.id, &err.to_string()).await;
            return Err(err.into());
        }

        let record = match response.json::<CreateRecordOutput>() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(post_id = %post.id, "Record created but response was unreadable: {}", e);
                None
            }
        };

        let outcome = PublishOutcome {
            post_id: post.id.clone(),
            record,
        };

        let mut attempt = PublishAttempt::new(&post.id, PublishStatus::Sent);
        attempt.record_uri = outcome.record_uri().map(str::to_string);
        self.record(&attempt).await;

        info!(
            post_id = %post.id,
            "Published to Bluesky{}",
            outcome
                .record_uri()
                .map(|uri| format!(" as {}", uri))
                .unwrap_or_default()
        );
        self.event_bus.emit(Event::PublishSent {
            post_id: post.id.clone(),
            record_uri: attempt.record_uri.unwrap_or_default(),
        });

        Ok(outcome)
    }

    /// Refresh the stored session outside of a publish
    pub async fn refresh_session(&self) -> Result<Session> {
        match self.refresh().await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.event_bus.emit(Event::RefreshFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn refresh(&self) -> Result<Session> {
        let session = self.credentials.refresh_stored(&self.domain).await?;
        self.event_bus.emit(Event::SessionRefreshed {
            actor_id: session.actor_id.clone(),
        });
        Ok(session)
    }

    async fn abort(&self, post_id: &str, reason: &str) {
        warn!(post_id = %post_id, "Publish aborted: {}", reason);

        let mut attempt = PublishAttempt::new(post_id, PublishStatus::Aborted);
        attempt.error_message = Some(reason.to_string());
        self.record(&attempt).await;

        self.event_bus.emit(Event::PublishAborted {
            post_id: post_id.to_string(),
            reason: reason.to_string(),
        });
    }

    async fn fail(&self, post_id: &str, error: &str) {
        warn!(post_id = %post_id, "Publish failed: {}", error);

        let mut attempt = PublishAttempt::new(post_id, PublishStatus::Failed);
        attempt.error_message = Some(error.to_string());
        self.record(&attempt).await;

        self.event_bus.emit(Event::PublishFailed {
            post_id: post_id.to_string(),
            error: error.to_string(),
        });
    }

    async fn record(&self, attempt: &PublishAttempt) {
        if let Err(e) = self.db.record_attempt(attempt).await {
            tracing::error!(
                post_id = %attempt.post_id,
                "Failed to record {} attempt: {}",
                attempt.status,
                e
            );
        }
    }
}
