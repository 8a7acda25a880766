//! Error types for Skypost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkypostError>;

#[derive(Error, Debug)]
pub enum SkypostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SkypostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SkypostError::InvalidInput(_) => 3,
            SkypostError::Auth(_) => 2,
            SkypostError::Publish(PublishError::MissingCredentials(_)) => 2,
            SkypostError::Publish(_) => 1,
            SkypostError::Transport(_) => 1,
            SkypostError::Config(_) => 1,
            SkypostError::Database(_) => 1,
            SkypostError::Store(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures of the session store and the post source
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to parse post: {0}")]
    Post(#[from] serde_json::Error),

    #[error("Refusing to follow symlink: {0}")]
    Symlink(String),

    #[error("Invalid post id: {0}")]
    InvalidPostId(String),
}

/// Network-level failure of an XRPC call
///
/// Kept distinct from a successful-but-empty response: a `TransportError`
/// always means no HTTP status was received (or the body could not be read).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("request to {url} failed: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Login or refresh failure
///
/// Any `AuthError` invalidates the stored session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        endpoint: &'static str,
        reason: String,
    },

    #[error("Missing credential: {0}")]
    MissingCredentials(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Missing credential: {0}")]
    MissingCredentials(String),

    #[error("createRecord returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Short link needs {needed} bytes but the limit is {max_bytes}")]
    LinkTooLong { needed: usize, max_bytes: usize },

    #[error("Post {0} has no short link")]
    MissingShortLink(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),
}
