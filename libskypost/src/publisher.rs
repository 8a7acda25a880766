//! Post publisher
//!
//! Turns a [`Post`] into an `app.bsky.feed.post` record and submits it with
//! `com.atproto.repo.createRecord`. The publisher does not interpret the
//! response status; it hands the raw [`RemoteResponse`] back so the caller
//! decides what counts as sent.

use crate::bluesky::excerpt::{build_excerpt, Excerpt};
use crate::bluesky::record::{CreateRecordRequest, OutboundRecord};
use crate::bluesky::{RemoteResponse, XrpcClient, CREATE_RECORD};
use crate::config::{normalize_domain, DEFAULT_MAX_BYTES};
use crate::error::{PublishError, Result};
use crate::types::{Post, Session};

#[derive(Clone)]
pub struct Publisher {
    client: XrpcClient,
    max_bytes: usize,
    link_card: bool,
}

impl Publisher {
    pub fn new(client: XrpcClient) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
            link_card: false,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_link_card(mut self, link_card: bool) -> Self {
        self.link_card = link_card;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn build_excerpt(&self, post: &Post) -> std::result::Result<Excerpt, PublishError> {
        build_excerpt(post, self.max_bytes)
    }

    /// The `app.bsky.feed.post` record for `post`
    pub fn build_record(&self, post: &Post) -> std::result::Result<OutboundRecord, PublishError> {
        let excerpt = self.build_excerpt(post)?;
        Ok(OutboundRecord::from_excerpt(post, &excerpt, self.link_card))
    }

    /// The `createRecord` body for `post` on behalf of `actor_id`
    pub fn build_request(
        &self,
        post: &Post,
        actor_id: &str,
    ) -> std::result::Result<CreateRecordRequest, PublishError> {
        let record = self.build_record(post)?;
        Ok(CreateRecordRequest::new(actor_id, record))
    }

    /// Submit `post` as a new record
    ///
    /// # Errors
    ///
    /// - `PublishError::MissingCredentials` if the access token, actor id or
    ///   domain is empty; no request is made in that case
    /// - excerpt errors (`LinkTooLong`, `MissingShortLink`)
    /// - `TransportError` if the request never got a response
    pub async fn publish(
        &self,
        post: &Post,
        session: &Session,
        domain: &str,
    ) -> Result<RemoteResponse> {
        ensure_credentials(session, domain)?;

        let request = self.build_request(post, &session.actor_id)?;

        tracing::debug!(
            post_id = %post.id,
            bytes = request.record.text.len(),
            "Submitting record"
        );

        let response = self
            .client
            .procedure(
                domain,
                CREATE_RECORD,
                Some(session.access_token.as_str()),
                Some(&request),
            )
            .await?;

        Ok(response)
    }
}

/// Guard run before any write call
pub fn ensure_credentials(
    session: &Session,
    domain: &str,
) -> std::result::Result<(), PublishError> {
    if session.access_token.is_empty() {
        return Err(PublishError::MissingCredentials("access token".to_string()));
    }
    if session.actor_id.is_empty() {
        return Err(PublishError::MissingCredentials("actor id".to_string()));
    }
    if normalize_domain(domain).is_empty() {
        return Err(PublishError::MissingCredentials("domain".to_string()));
    }
    Ok(())
}
