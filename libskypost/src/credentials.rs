//! Session storage and the credential manager
//!
//! The credential manager is the only component that writes a [`Session`].
//! It talks to the identity endpoints (`createSession`, `refreshSession`) and
//! keeps the configured [`SessionStore`] in sync with the outcome:
//!
//! - a successful login stores the new access token, refresh token and DID
//! - a successful refresh overwrites both tokens and keeps the DID
//! - any failed login or refresh clears the stored session
//!
//! The one-time password lives in a [`SecretString`] for the duration of a
//! single login call and is never handed to a store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use libskypost::bluesky::XrpcClient;
//! use libskypost::credentials::{AccountCredentials, CredentialManager, MemorySessionStore};
//!
//! # async fn example() -> libskypost::Result<()> {
//! let client = XrpcClient::new(Duration::from_secs(30))?;
//! let manager = CredentialManager::new(client, Arc::new(MemorySessionStore::new()));
//!
//! let credentials = AccountCredentials::new(
//!     "https://bsky.social",
//!     "alice.bsky.social",
//!     "app-password".to_string(),
//! );
//! let session = manager.connect(credentials).await?;
//! println!("connected as {}", session.actor_id);
//! # Ok(())
//! # }
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::bluesky::{
    CreateSessionInput, RemoteResponse, SessionOutput, XrpcClient, CREATE_SESSION,
    REFRESH_SESSION,
};
use crate::config::normalize_domain;
use crate::error::{AuthError, Result, StoreError};
use crate::types::Session;

#[cfg(test)]
mod tests;

/// Persistent home of the current session
///
/// Implementations must never be given the account password; only the
/// session fields pass through this trait.
pub trait SessionStore: Send + Sync {
    /// Load the stored session; an absent session loads as empty
    fn load(&self) -> Result<Session>;

    fn save(&self, session: &Session) -> Result<()>;

    /// Remove every stored session field
    fn clear(&self) -> Result<()>;

    /// Short name for logs and the status view
    fn backend_name(&self) -> &str;
}

/// Reject a path that is a symbolic link
///
/// A missing file is fine; it will be created as a regular file.
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_symlink() => {
            Err(StoreError::Symlink(path.display().to_string()).into())
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e).into()),
    }
}

/// Session kept in a TOML file, readable by the owner only
///
/// ```toml
/// access_token = "..."
/// refresh_token = "..."
/// actor_id = "did:plc:..."
/// ```
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session> {
        validate_not_symlink(&self.path)?;

        if !self.path.exists() {
            return Ok(Session::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(StoreError::Io)?;
        let session: Session = toml::from_str(&content).map_err(StoreError::Parse)?;
        Ok(session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        validate_not_symlink(&self.path)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }

        let content = toml::to_string(session).map_err(StoreError::Serialize)?;
        std::fs::write(&self.path, content).map_err(StoreError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(StoreError::Io)?;
        }

        tracing::debug!("Saved session to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        validate_not_symlink(&self.path)?;

        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(StoreError::Io)?;
            tracing::debug!("Removed session file {:?}", self.path);
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// In-process session store
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        // A poisoned lock still holds a valid Session
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session> {
        Ok(self.lock().clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.lock() = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock() = Session::default();
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// What a login needs: where, who, and a one-time password
pub struct AccountCredentials {
    pub domain: String,
    pub identifier: String,
    pub password: SecretString,
}

impl AccountCredentials {
    pub fn new(domain: impl Into<String>, identifier: impl Into<String>, password: String) -> Self {
        Self {
            domain: domain.into(),
            identifier: identifier.into(),
            password: SecretString::from(password),
        }
    }
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("domain", &self.domain)
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected { actor_id: String },
    NotConnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected { actor_id } if actor_id.is_empty() => {
                write!(f, "connected")
            }
            ConnectionStatus::Connected { actor_id } => write!(f, "connected as {}", actor_id),
            ConnectionStatus::NotConnected => write!(f, "not connected"),
        }
    }
}

/// Obtains, refreshes and stores sessions
#[derive(Clone)]
pub struct CredentialManager {
    client: XrpcClient,
    store: Arc<dyn SessionStore>,
}

impl CredentialManager {
    pub fn new(client: XrpcClient, store: Arc<dyn SessionStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Create a session with `createSession`
    ///
    /// Does not touch the store; see [`CredentialManager::connect`].
    pub async fn login(
        &self,
        domain: &str,
        identifier: &str,
        password: &SecretString,
    ) -> std::result::Result<Session, AuthError> {
        if normalize_domain(domain).is_empty() {
            return Err(AuthError::MissingCredentials("domain".to_string()));
        }
        if identifier.is_empty() {
            return Err(AuthError::MissingCredentials("identifier".to_string()));
        }
        if password.expose_secret().is_empty() {
            return Err(AuthError::MissingCredentials("password".to_string()));
        }

        let input = CreateSessionInput {
            identifier,
            password: password.expose_secret(),
        };
        let response = self
            .client
            .procedure(domain, CREATE_SESSION, None, Some(&input))
            .await?;

        let output = parse_session_output(CREATE_SESSION, &response)?;

        let did = output
            .did
            .filter(|did| !did.is_empty())
            .ok_or_else(|| missing_field(CREATE_SESSION, "did"))?;

        Ok(Session {
            access_token: output.access_jwt.unwrap_or_default(),
            refresh_token: output.refresh_jwt.unwrap_or_default(),
            actor_id: did,
        })
    }

    /// Mint new tokens with `refreshSession`
    ///
    /// The returned session carries the DID only if the server echoed it;
    /// callers keep the previous one otherwise.
    pub async fn refresh(
        &self,
        domain: &str,
        refresh_token: &str,
    ) -> std::result::Result<Session, AuthError> {
        if normalize_domain(domain).is_empty() {
            return Err(AuthError::MissingCredentials("domain".to_string()));
        }
        if refresh_token.is_empty() {
            return Err(AuthError::MissingCredentials("refresh token".to_string()));
        }

        let response = self
            .client
            .procedure::<()>(domain, REFRESH_SESSION, Some(refresh_token), None)
            .await?;

        let output = parse_session_output(REFRESH_SESSION, &response)?;

        Ok(Session {
            access_token: output.access_jwt.unwrap_or_default(),
            refresh_token: output.refresh_jwt.unwrap_or_default(),
            actor_id: output.did.unwrap_or_default(),
        })
    }

    /// Log in and store the session; clear the store on failure
    ///
    /// If the store cannot be cleared, that error is returned instead of the
    /// login error.
    ///
    /// Takes the credentials by value so the password is dropped (and
    /// zeroed) as soon as the call returns.
    pub async fn connect(&self, credentials: AccountCredentials) -> Result<Session> {
        let AccountCredentials {
            domain,
            identifier,
            password,
        } = credentials;

        tracing::info!("Creating Bluesky session for {}", identifier);

        match self.login(&domain, &identifier, &password).await {
            Ok(session) => {
                self.store.save(&session)?;
                tracing::info!("Connected as {}", session.actor_id);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Login failed: {}", e);
                self.invalidate()?;
                Err(e.into())
            }
        }
    }

    /// Refresh the stored session and save the new tokens
    ///
    /// On any failure the stored session is cleared, so a later attempt
    /// never reuses tokens the server has rejected. A failed clear is
    /// returned as the error.
    pub async fn refresh_stored(&self, domain: &str) -> Result<Session> {
        let current = self.store.load()?;

        match self.refresh(domain, &current.refresh_token).await {
            Ok(mut session) => {
                if session.actor_id.is_empty() {
                    session.actor_id = current.actor_id;
                }
                self.store.save(&session)?;
                tracing::debug!("Refreshed session for {}", session.actor_id);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Session refresh failed: {}", e);
                self.invalidate()?;
                Err(e.into())
            }
        }
    }

    /// Currently stored session (possibly empty)
    pub fn session(&self) -> Result<Session> {
        self.store.load()
    }

    /// Connected when a non-empty access token is stored
    pub fn status(&self) -> Result<ConnectionStatus> {
        let session = self.store.load()?;
        if session.is_connected() {
            Ok(ConnectionStatus::Connected {
                actor_id: session.actor_id,
            })
        } else {
            Ok(ConnectionStatus::NotConnected)
        }
    }

    /// Forget the stored session
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        tracing::info!("Cleared stored session ({})", self.store.backend_name());
        Ok(())
    }

    /// Clear after a rejected login or refresh
    ///
    /// A clear failure replaces the auth error: the caller must not go on as
    /// if the rejected tokens were gone.
    fn invalidate(&self) -> Result<()> {
        self.store.clear().map_err(|e| {
            tracing::error!(
                "Failed to clear stored session ({}): {}",
                self.store.backend_name(),
                e
            );
            e
        })
    }
}

fn missing_field(endpoint: &'static str, field: &str) -> AuthError {
    AuthError::MalformedResponse {
        endpoint,
        reason: format!("missing {}", field),
    }
}

/// Check status and token presence shared by login and refresh
fn parse_session_output(
    endpoint: &'static str,
    response: &RemoteResponse,
) -> std::result::Result<SessionOutput, AuthError> {
    if !response.is_success() {
        return Err(AuthError::Rejected {
            endpoint,
            status: response.status,
            body: response.error_summary(),
        });
    }

    let output: SessionOutput = response.json().map_err(|e| AuthError::MalformedResponse {
        endpoint,
        reason: e.to_string(),
    })?;

    if output.access_jwt.as_deref().unwrap_or_default().is_empty() {
        return Err(missing_field(endpoint, "accessJwt"));
    }
    if output.refresh_jwt.as_deref().unwrap_or_default().is_empty() {
        return Err(missing_field(endpoint, "refreshJwt"));
    }

    Ok(output)
}
