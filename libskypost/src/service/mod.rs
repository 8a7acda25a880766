//! Service layer for Skypost
//!
//! `SkypostService` wires the Credential Manager, the Publisher, the post
//! source and the history database together and hands out the sub-services:
//!
//! - `PostingService`: refresh then publish, with history and events
//! - `HistoryService`: query the publish log
//! - `WorkQueue` / `Worker`: sequential processing of published posts and
//!   refresh ticks
//! - `EventBus`: progress events
//!
//! ```no_run
//! use libskypost::service::SkypostService;
//!
//! # async fn example() -> libskypost::Result<()> {
//! let service = SkypostService::new().await?;
//!
//! let outcome = service.posting().publish_by_id("5").await?;
//! println!("{:?}", outcome.record_uri());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod history;
pub mod posting;
pub mod queue;

use std::sync::Arc;

use self::events::{EventBus, EventReceiver};
use self::history::HistoryService;
use self::posting::PostingService;
use self::queue::{WorkQueue, Worker, DEFAULT_QUEUE_CAPACITY};
use crate::bluesky::XrpcClient;
use crate::config::expand_path;
use crate::credentials::{CredentialManager, FileSessionStore, SessionStore};
use crate::posts::{JsonPostSource, PostSource};
use crate::publisher::Publisher;
use crate::{Config, Database, Result};

pub struct SkypostService {
    config: Arc<Config>,
    db: Arc<Database>,
    credentials: CredentialManager,
    posting: PostingService,
    history: HistoryService,
    event_bus: EventBus,
}

impl SkypostService {
    /// Load the default configuration and build the service from it
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build from `config` with the file session store and JSON post source
    pub async fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(expand_path(&config.session.path)));
        let posts: Arc<dyn PostSource> =
            Arc::new(JsonPostSource::new(expand_path(&config.posts.path)));
        let db = Database::new(&config.database.path).await?;

        Self::with_components(config, store, posts, db)
    }

    /// Build from explicit parts
    pub fn with_components(
        config: Config,
        store: Arc<dyn SessionStore>,
        posts: Arc<dyn PostSource>,
        db: Database,
    ) -> Result<Self> {
        config.validate()?;

        let client = XrpcClient::new(config.bluesky.timeout())?;
        let credentials = CredentialManager::new(client.clone(), store);
        let publisher = Publisher::new(client)
            .with_max_bytes(config.bluesky.max_bytes)
            .with_link_card(config.bluesky.link_card);

        let db = Arc::new(db);
        let event_bus = EventBus::new(100);

        let posting = PostingService::new(
            credentials.clone(),
            publisher,
            posts,
            Arc::clone(&db),
            config.bluesky.normalized_domain(),
            event_bus.clone(),
        );
        let history = HistoryService::new(Arc::clone(&db));

        Ok(Self {
            config: Arc::new(config),
            db,
            credentials,
            posting,
            history,
            event_bus,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    /// A fresh work queue and the worker draining it
    pub fn work_queue(&self) -> (WorkQueue, Worker) {
        WorkQueue::new(self.posting.clone(), DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}
