//! Bluesky (AT Protocol) XRPC plumbing
//!
//! Every call is a JSON `POST` to `{domain}/xrpc/{nsid}`. The client only
//! moves bytes: it never interprets a status code, so callers can tell a
//! transport failure (`TransportError`) apart from a successful-but-empty or
//! rejected response (`RemoteResponse`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::normalize_domain;
use crate::error::TransportError;

pub mod excerpt;
pub mod record;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

/// Collection and record type of a feed post
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

const USER_AGENT: &str = concat!("skypost/", env!("CARGO_PKG_VERSION"));

/// Status and body of an XRPC response, uninterpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    /// Anything below 300 counts as success
    pub fn is_success(&self) -> bool {
        self.status < 300
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// Short description of a rejection, e.g. `ExpiredToken: Token has expired`
    ///
    /// Falls back to the raw body when it is not an XRPC error object.
    pub fn error_summary(&self) -> String {
        match self.json::<XrpcErrorBody>() {
            Ok(XrpcErrorBody {
                error: Some(error),
                message: Some(message),
            }) => format!("{}: {}", error, message),
            Ok(XrpcErrorBody {
                error: Some(error),
                message: None,
            }) => error,
            _ if self.body.trim().is_empty() => "<empty body>".to_string(),
            _ => self.body.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// `createSession` / `refreshSession` output
///
/// Every field is optional here; presence is checked by the credential
/// manager so a missing field surfaces as a malformed response rather than a
/// decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    #[serde(default)]
    pub access_jwt: Option<String>,
    #[serde(default)]
    pub refresh_jwt: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

/// `createRecord` output
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CreateRecordOutput {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionInput<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Thin wrapper over `reqwest::Client` for XRPC procedure calls
#[derive(Clone)]
pub struct XrpcClient {
    http: reqwest::Client,
}

impl XrpcClient {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new("<client>", e))?;

        Ok(Self { http })
    }

    /// `{domain}/xrpc/{nsid}` with trailing slashes on the domain removed
    pub fn endpoint(domain: &str, nsid: &str) -> String {
        format!("{}/xrpc/{}", normalize_domain(domain), nsid)
    }

    /// POST a procedure call and return the raw response
    ///
    /// `bearer` is sent as `Authorization: Bearer ...`; `body`, if any, as JSON.
    pub async fn procedure<B: Serialize + ?Sized>(
        &self,
        domain: &str,
        nsid: &str,
        bearer: Option<&str>,
        body: Option<&B>,
    ) -> Result<RemoteResponse, TransportError> {
        let url = Self::endpoint(domain, nsid);

        let mut request = self.http.post(&url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(nsid, "XRPC call");

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::new(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(&url, e))?;

        tracing::debug!(nsid, status, "XRPC response");

        Ok(RemoteResponse { status, body })
    }
}
