//! Core types for Skeetsweep

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PlatformError, SweepError};

/// Record collections the sweeper reads or deletes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Post,
    Repost,
    Like,
}

impl Collection {
    /// The lexicon NSID of the collection
    pub fn nsid(&self) -> &'static str {
        match self {
            Collection::Post => "app.bsky.feed.post",
            Collection::Repost => "app.bsky.feed.repost",
            Collection::Like => "app.bsky.feed.like",
        }
    }

    pub fn from_nsid(nsid: &str) -> Option<Self> {
        match nsid {
            "app.bsky.feed.post" => Some(Collection::Post),
            "app.bsky.feed.repost" => Some(Collection::Repost),
            "app.bsky.feed.like" => Some(Collection::Like),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Post => write!(f, "posts"),
            Collection::Repost => write!(f, "reposts"),
            Collection::Like => write!(f, "likes"),
        }
    }
}

/// A post authored by the account, as returned by the author feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// AT URI of the post record
    pub uri: String,
    /// DID of the author
    pub author: String,
    /// Raw timestamp string from the service (`indexedAt`)
    pub created_at: Option<String>,
    pub like_count: u64,
    pub repost_count: u64,
    /// URI of the post this one replies to
    pub reply_parent: Option<String>,
}

impl Post {
    /// Day the post was created, from the `YYYY-MM-DD` prefix of its timestamp
    ///
    /// Returns `None` when the post has no timestamp or the prefix does not
    /// parse.
    pub fn created_on(&self) -> Option<NaiveDate> {
        let raw = self.created_at.as_deref()?;
        let parsed = raw
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok());
        if parsed.is_none() {
            tracing::debug!("Unparsable timestamp {:?} on {}", raw, self.uri);
        }
        parsed
    }
}

/// A repost record from the account's repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repost {
    /// AT URI of the repost record
    pub uri: String,
    /// Raw `createdAt` value of the record
    pub created_at: String,
    /// URI of the reposted post
    pub subject: Option<String>,
}

impl Repost {
    /// Creation time of the repost in UTC
    ///
    /// Accepts RFC 3339 timestamps and offset-less ISO timestamps, which are
    /// taken as UTC.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.created_at) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// One page of a cursor-paginated collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }

    /// A page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }
}

/// A parsed `at://<repo>/<collection>/<rkey>` record identifier
///
/// This is everything a delete call needs: the owning repository, the
/// collection NSID and the record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordUri {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

impl RecordUri {
    pub fn parse(uri: &str) -> Result<Self, SweepError> {
        let invalid =
            |reason: &str| PlatformError::Validation(format!("Invalid AT URI '{}': {}", uri, reason));

        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| invalid("missing at:// scheme"))?;
        // Query and fragment never carry addressing information
        let rest = rest.split(['?', '#']).next().unwrap_or_default();

        let mut segments = rest.split('/');
        let repo = segments.next().unwrap_or_default();
        let collection = segments.next().unwrap_or_default();
        let rkey = segments.next().unwrap_or_default();

        if repo.is_empty() {
            return Err(invalid("empty authority").into());
        }
        if collection.is_empty() {
            return Err(invalid("missing collection").into());
        }
        if rkey.is_empty() {
            return Err(invalid("missing record key").into());
        }
        if segments.next().is_some() {
            return Err(invalid("unexpected path segments").into());
        }

        Ok(Self {
            repo: repo.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
    }
}

impl FromStr for RecordUri {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.repo, self.collection, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_at(created_at: Option<&str>) -> Post {
        Post {
            uri: "at://did:plc:alice/app.bsky.feed.post/3k1".to_string(),
            author: "did:plc:alice".to_string(),
            created_at: created_at.map(str::to_string),
            like_count: 0,
            repost_count: 0,
            reply_parent: None,
        }
    }

    #[test]
    fn test_record_uri_parse() {
        let uri = RecordUri::parse("at://did:plc:abc123/app.bsky.feed.post/3kabcxyz").unwrap();
        assert_eq!(uri.repo, "did:plc:abc123");
        assert_eq!(uri.collection, "app.bsky.feed.post");
        assert_eq!(uri.rkey, "3kabcxyz");
        assert_eq!(uri.to_string(), "at://did:plc:abc123/app.bsky.feed.post/3kabcxyz");
    }

    #[test]
    fn test_record_uri_handle_authority() {
        let uri: RecordUri = "at://alice.bsky.social/app.bsky.feed.repost/3abc"
            .parse()
            .unwrap();
        assert_eq!(uri.repo, "alice.bsky.social");
        assert_eq!(uri.collection, Collection::Repost.nsid());
    }

    #[test]
    fn test_record_uri_rejects_malformed() {
        for bad in [
            "https://bsky.app/profile/alice/post/3k",
            "at:///app.bsky.feed.post/3k",
            "at://did:plc:abc",
            "at://did:plc:abc/app.bsky.feed.post",
            "at://did:plc:abc/app.bsky.feed.post/",
            "at://did:plc:abc/app.bsky.feed.post/3k/extra",
        ] {
            let result = RecordUri::parse(bad);
            assert!(
                matches!(result, Err(SweepError::Platform(PlatformError::Validation(_)))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_post_created_on_uses_date_prefix() {
        let post = post_at(Some("2024-03-15T23:59:59.999Z"));
        assert_eq!(post.created_on(), NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn test_post_created_on_missing_or_malformed() {
        assert_eq!(post_at(None).created_on(), None);
        assert_eq!(post_at(Some("yesterday")).created_on(), None);
        assert_eq!(post_at(Some("2024-13-45T00:00:00Z")).created_on(), None);
    }

    #[test]
    fn test_repost_created_at_formats() {
        let repost = Repost {
            uri: "at://did:plc:alice/app.bsky.feed.repost/1".to_string(),
            created_at: "2024-01-02T03:04:05.678Z".to_string(),
            subject: None,
        };
        let parsed = repost.created_at_utc().unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        let naive = Repost {
            created_at: "2024-01-02T03:04:05".to_string(),
            ..repost.clone()
        };
        assert_eq!(naive.created_at_utc(), Some(parsed - chrono::Duration::milliseconds(678)));

        let broken = Repost {
            created_at: "not a date".to_string(),
            ..repost
        };
        assert!(broken.created_at_utc().is_none());
    }

    #[test]
    fn test_collection_nsid_roundtrip() {
        for collection in [Collection::Post, Collection::Repost, Collection::Like] {
            assert_eq!(Collection::from_nsid(collection.nsid()), Some(collection));
        }
        assert_eq!(Collection::from_nsid("app.bsky.graph.follow"), None);
    }
}
