//! Skypost - crosspost published posts to Bluesky
//!
//! The library holds the two halves of the crossposter: the Credential
//! Manager, which keeps an AT Protocol session alive, and the Post Publisher,
//! which turns a post into a bounded `app.bsky.feed.post` record with a link
//! facet. The `skypost-*` binaries are thin front ends over the service layer.

pub mod bluesky;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod posts;
pub mod publisher;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use bluesky::excerpt::Excerpt;
pub use bluesky::{RemoteResponse, XrpcClient};
pub use config::Config;
pub use credentials::{
    AccountCredentials, ConnectionStatus, CredentialManager, FileSessionStore,
    MemorySessionStore, SessionStore,
};
pub use db::Database;
pub use error::{AuthError, PublishError, Result, SkypostError};
pub use posts::{JsonPostSource, MemoryPostSource, PostSource};
pub use publisher::Publisher;
pub use types::{Post, PublishAttempt, PublishStatus, Session};
