//! Read-only access to posts exported by the host CMS
//!
//! The CMS drops one JSON file per published post into a directory:
//!
//! ```json
//! {
//!   "id": "5",
//!   "title": "Hello",
//!   "content": "<p>Hello world</p>",
//!   "short_link": "https://example.com/?p=5",
//!   "published_at": "2024-03-01T12:00:00Z"
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::types::Post;

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Look up a post; `Ok(None)` when it does not exist
    async fn get(&self, post_id: &str) -> Result<Option<Post>>;
}

/// `<dir>/<post_id>.json` files
pub struct JsonPostSource {
    dir: PathBuf,
}

impl JsonPostSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, post_id: &str) -> Result<PathBuf> {
        let valid = !post_id.is_empty()
            && post_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidPostId(post_id.to_string()).into());
        }
        Ok(self.dir.join(format!("{}.json", post_id)))
    }
}

#[async_trait]
impl PostSource for JsonPostSource {
    async fn get(&self, post_id: &str) -> Result<Option<Post>> {
        let path = self.path_for(post_id)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e).into()),
        };

        let post: Post = serde_json::from_str(&content).map_err(StoreError::Post)?;
        if post.id != post_id {
            tracing::warn!(
                "Post file {:?} declares id {}, expected {}",
                path,
                post.id,
                post_id
            );
        }
        Ok(Some(post))
    }
}

/// Posts held in memory
#[derive(Default)]
pub struct MemoryPostSource {
    posts: RwLock<HashMap<String, Post>>,
}

impl MemoryPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, post: Post) {
        let mut posts = self
            .posts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        posts.insert(post.id.clone(), post);
    }
}

#[async_trait]
impl PostSource for MemoryPostSource {
    async fn get(&self, post_id: &str) -> Result<Option<Post>> {
        let posts = self
            .posts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(posts.get(post_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const POST_JSON: &str = r#"{
        "id": "5",
        "title": "Hello",
        "content": "<p>Hello world</p>",
        "short_link": "https://example.com/?p=5",
        "published_at": "2024-03-01T12:00:00Z"
    }"#;

    #[tokio::test]
    async fn test_json_source_reads_post() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("5.json"), POST_JSON).unwrap();

        let source = JsonPostSource::new(temp_dir.path().to_path_buf());
        let post = source.get("5").await.unwrap().unwrap();

        assert_eq!(post.title, "Hello");
        assert_eq!(post.short_link, "https://example.com/?p=5");
    }

    #[tokio::test]
    async fn test_json_source_missing_post_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let source = JsonPostSource::new(temp_dir.path().to_path_buf());

        assert!(source.get("404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_source_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let source = JsonPostSource::new(temp_dir.path().to_path_buf());

        let err = source.get("../secrets").await.unwrap_err();
        assert!(matches!(
            err,
            crate::SkypostError::Store(StoreError::InvalidPostId(_))
        ));
        assert!(source.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_json_source_reports_bad_json() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("9.json"), "{ not json").unwrap();

        let source = JsonPostSource::new(temp_dir.path().to_path_buf());
        let err = source.get("9").await.unwrap_err();
        assert!(matches!(err, crate::SkypostError::Store(StoreError::Post(_))));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryPostSource::new();
        let post: Post = serde_json::from_str(POST_JSON).unwrap();
        source.insert(post.clone());

        assert_eq!(source.get("5").await.unwrap(), Some(post));
        assert_eq!(source.get("6").await.unwrap(), None);
    }
}
