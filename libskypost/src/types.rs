//! Core types for Skypost

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A published blog post, as exported by the host CMS
///
/// Read-only input: nothing in this crate mutates a `Post`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Raw post body, may contain markup and HTML entities
    #[serde(default)]
    pub content: String,
    /// Hand-written excerpt; preferred over `content` when non-empty
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Canonical redirect URL appended to every published excerpt
    pub short_link: String,
    pub published_at: DateTime<Utc>,
}

impl Post {
    /// The text the excerpt is built from
    pub fn source_text(&self) -> &str {
        match self.excerpt.as_deref() {
            Some(excerpt) if !excerpt.trim().is_empty() => excerpt,
            _ => &self.content,
        }
    }
}

/// Access/refresh token pair plus the account DID
///
/// Empty strings mean "absent"; a session is only usable when all three
/// fields are non-empty.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub actor_id: String,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            actor_id: actor_id.into(),
        }
    }

    /// Connected means an access token is present
    pub fn is_connected(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty()
            && !self.refresh_token.is_empty()
            && !self.actor_id.is_empty()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &str) -> &'static str {
            if value.is_empty() {
                "<empty>"
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("actor_id", &self.actor_id)
            .finish()
    }
}

/// Terminal state of one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    /// createRecord accepted the post
    Sent,
    /// The remote side rejected the post, or the transport failed
    Failed,
    /// No write call was made (refresh failed or credentials missing)
    Aborted,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Sent => "sent",
            PublishStatus::Failed => "failed",
            PublishStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(PublishStatus::Sent),
            "failed" => Ok(PublishStatus::Failed),
            "aborted" => Ok(PublishStatus::Aborted),
            other => Err(format!(
                "Invalid status: '{}'. Valid options: sent, failed, aborted",
                other
            )),
        }
    }
}

/// A row of the local publish log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishAttempt {
    pub id: Option<i64>,
    pub post_id: String,
    pub status: PublishStatus,
    /// `at://` URI of the created record
    pub record_uri: Option<String>,
    pub error_message: Option<String>,
    /// Unix timestamp (seconds)
    pub attempted_at: i64,
}

impl PublishAttempt {
    pub fn new(post_id: impl Into<String>, status: PublishStatus) -> Self {
        Self {
            id: None,
            post_id: post_id.into(),
            status,
            record_uri: None,
            error_message: None,
            attempted_at: Utc::now().timestamp(),
        }
    }
}
