//! Platform abstraction and implementations
//!
//! The retention engine talks to the content service only through the
//! [`Platform`] trait: cursor-paginated reads of the author feed, the likes
//! feed and the repost collection, plus single and batched record deletion.
//!
//! # Examples
//!
//! ```no_run
//! use libskeetsweep::platforms::{Platform, bluesky::BlueskyClient};
//! use secrecy::SecretString;
//!
//! # async fn example() -> libskeetsweep::Result<()> {
//! let mut client = BlueskyClient::new("https://bsky.social")?;
//! client
//!     .login("alice.bsky.social", &SecretString::from("app-password".to_string()))
//!     .await?;
//!
//! let actor = client.actor()?.to_string();
//! let page = client.author_feed_page(&actor, None, 100).await?;
//! println!("First page holds {} posts", page.items.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Page, Post, RecordUri, Repost};

pub mod bluesky;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Remote content service holding the account's records
///
/// All reads return one page at a time and preserve server ordering
/// (newest first). Pagination is driven by [`crate::fetch`].
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase platform identifier (e.g., "bluesky")
    fn name(&self) -> &str;

    /// DID of the authenticated account
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when no session exists.
    fn actor(&self) -> Result<&str>;

    /// One page of the account's author feed
    async fn author_feed_page(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>>;

    /// One page of the URIs of posts the actor has liked
    async fn actor_likes_page(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<String>>;

    /// One page of the repost records in `repo`
    async fn list_reposts_page(
        &self,
        repo: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Repost>>;

    /// Delete a single record
    ///
    /// Deleting a record that no longer exists succeeds.
    async fn delete_record(&self, target: &RecordUri) -> Result<()>;

    /// Delete several records of `repo` in one write transaction
    ///
    /// A failure says nothing about which writes, if any, were applied.
    async fn apply_deletes(&self, repo: &str, targets: &[RecordUri]) -> Result<()>;
}
