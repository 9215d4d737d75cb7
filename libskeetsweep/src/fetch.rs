//! Cursor-paginated collection fetching
//!
//! Every collection is read the same way: request a page, append its items,
//! follow the returned cursor until the service stops sending one. Any failed
//! page aborts the whole fetch so callers never classify a partial history.

use std::collections::HashSet;
use std::future::Future;

use crate::config::MAX_PAGE_SIZE;
use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::service::events::ProgressObserver;
use crate::types::{Collection, Page, Post, Repost};

/// Drain a paginated source into one ordered vector
///
/// `page_fn` receives the cursor of the next page (`None` for the first).
/// Pagination ends when a page comes back without a cursor or with an empty
/// one. `observer` is told the running item count after every page.
pub async fn fetch_all<T, F, Fut>(
    collection: Collection,
    observer: &dyn ProgressObserver,
    mut page_fn: F,
) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = page_fn(cursor.clone()).await.map_err(|e| {
            tracing::error!("Fetching {} failed after {} pages: {}", collection, pages, e);
            e
        })?;
        pages += 1;
        items.extend(page.items);
        observer.fetched(collection, items.len());
        tracing::debug!("Fetched page {} of {} ({} items so far)", pages, collection, items.len());

        match page.cursor {
            Some(next) if !next.is_empty() => {
                if cursor.as_deref() == Some(next.as_str()) {
                    return Err(PlatformError::Fetch(format!(
                        "Cursor for {} did not advance past '{}'",
                        collection, next
                    ))
                    .into());
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    tracing::info!("Fetched {} {} in {} pages", items.len(), collection, pages);
    Ok(items)
}

fn clamp_page_size(page_size: u32) -> u32 {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// Every post in the actor's author feed, newest first
pub async fn fetch_all_posts(
    platform: &dyn Platform,
    actor: &str,
    page_size: u32,
    observer: &dyn ProgressObserver,
) -> Result<Vec<Post>> {
    let limit = clamp_page_size(page_size);
    fetch_all(Collection::Post, observer, |cursor| async move {
        platform.author_feed_page(actor, cursor.as_deref(), limit).await
    })
    .await
}

/// URIs of every post the actor has liked
pub async fn fetch_liked_uris(
    platform: &dyn Platform,
    actor: &str,
    page_size: u32,
    observer: &dyn ProgressObserver,
) -> Result<HashSet<String>> {
    let limit = clamp_page_size(page_size);
    let uris = fetch_all(Collection::Like, observer, |cursor| async move {
        platform.actor_likes_page(actor, cursor.as_deref(), limit).await
    })
    .await?;
    Ok(uris.into_iter().collect())
}

/// Every repost record in `repo`, in server order (newest first)
pub async fn fetch_all_reposts(
    platform: &dyn Platform,
    repo: &str,
    page_size: u32,
    observer: &dyn ProgressObserver,
) -> Result<Vec<Repost>> {
    let limit = clamp_page_size(page_size);
    fetch_all(Collection::Repost, observer, |cursor| async move {
        platform.list_reposts_page(repo, cursor.as_deref(), limit).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;
    use crate::platforms::mock::{paginate, MockConfig, MockPlatform};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        counts: Mutex<Vec<(Collection, usize)>>,
    }

    impl ProgressObserver for Recorder {
        fn fetched(&self, collection: Collection, count: usize) {
            self.counts.lock().unwrap().push((collection, count));
        }
    }

    fn post(n: usize) -> Post {
        Post {
            uri: format!("at://did:plc:mock/app.bsky.feed.post/{}", n),
            author: "did:plc:mock".to_string(),
            created_at: Some("2024-01-01T00:00:00Z".to_string()),
            like_count: 0,
            repost_count: 0,
            reply_parent: None,
        }
    }

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        let posts: Vec<Post> = (0..250).map(post).collect();
        let platform = MockPlatform::with_posts(paginate(&posts, 100), Vec::new());
        let recorder = Recorder::default();

        let fetched = fetch_all_posts(&platform, "did:plc:mock", 100, &recorder)
            .await
            .unwrap();

        assert_eq!(fetched, posts);
        assert_eq!(platform.fetch_calls().len(), 3);
        assert_eq!(
            *recorder.counts.lock().unwrap(),
            vec![
                (Collection::Post, 100),
                (Collection::Post, 200),
                (Collection::Post, 250)
            ]
        );
    }

    #[tokio::test]
    async fn test_single_page_without_cursor() {
        let platform = MockPlatform::with_posts(vec![vec![post(1)]], Vec::new());
        let fetched = fetch_all_posts(&platform, "did:plc:mock", 100, &())
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(platform.fetch_calls(), vec![(Collection::Post, None)]);
    }

    #[tokio::test]
    async fn test_empty_cursor_ends_pagination() {
        let platform = MockPlatform::new(MockConfig {
            like_pages: vec![vec!["a".to_string()], vec!["b".to_string()]],
            empty_final_cursor: true,
            ..Default::default()
        });

        let liked = fetch_liked_uris(&platform, "did:plc:mock", 100, &())
            .await
            .unwrap();
        assert_eq!(liked.len(), 2);
        assert!(liked.contains("a") && liked.contains("b"));
        assert_eq!(platform.fetch_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let platform = MockPlatform::success("test");
        let reposts = fetch_all_reposts(&platform, "did:plc:mock", 100, &())
            .await
            .unwrap();
        assert!(reposts.is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_aborts_fetch() {
        let posts: Vec<Post> = (0..30).map(post).collect();
        let platform = MockPlatform::new(MockConfig {
            post_pages: paginate(&posts, 10),
            fail_fetch_at: Some((Collection::Post, 2)),
            ..Default::default()
        });

        let result = fetch_all_posts(&platform, "did:plc:mock", 10, &()).await;
        assert!(matches!(
            result,
            Err(SweepError::Platform(PlatformError::Fetch(_)))
        ));
        assert_eq!(platform.fetch_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_stuck_cursor_is_an_error() {
        let result: Result<Vec<u32>> = fetch_all(Collection::Post, &(), |_cursor| async {
            Ok(Page::new(vec![1], Some("same".to_string())))
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("did not advance"));
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(clamp_page_size(0), 1);
        assert_eq!(clamp_page_size(50), 50);
        assert_eq!(clamp_page_size(500), 100);
    }
}
