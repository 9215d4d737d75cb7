//! Bluesky platform implementation
//!
//! Speaks XRPC over HTTPS to the account's PDS. The session is created once
//! with `com.atproto.server.createSession` and is read-only afterwards.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{PlatformError, Result, SweepError};
use crate::platforms::Platform;
use crate::types::{Collection, Page, Post, RecordUri, Repost};

const APPLY_WRITES_DELETE: &str = "com.atproto.repo.applyWrites#delete";

/// What the client was doing when a call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Authentication,
    Fetch,
    Delete,
}

impl Operation {
    /// Error for a failure that has no more specific classification
    fn failure(self, message: String) -> PlatformError {
        match self {
            Operation::Authentication => PlatformError::Authentication(message),
            Operation::Fetch => PlatformError::Fetch(message),
            Operation::Delete => PlatformError::Delete(message),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Authentication => write!(f, "authentication"),
            Operation::Fetch => write!(f, "fetch"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Map transport-level errors (no HTTP status available) to PlatformError
fn map_bluesky_error<E: fmt::Display + fmt::Debug>(error: E, operation: Operation) -> PlatformError {
    let error_msg = format!("{}", error);
    let debug_msg = format!("{:?}", error);

    if error_msg.contains("AuthenticationRequired")
        || error_msg.contains("InvalidToken")
        || error_msg.contains("ExpiredToken")
        || debug_msg.contains("Unauthorized")
    {
        return PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}. Please check your credentials and re-authenticate.",
            operation, error_msg
        ));
    }

    if error_msg.contains("RateLimitExceeded")
        || error_msg.contains("TooManyRequests")
        || debug_msg.contains("RateLimit")
    {
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}. Please wait before trying again.",
            operation, error_msg
        ));
    }

    if error_msg.contains("connection")
        || error_msg.contains("network")
        || error_msg.contains("timeout")
        || error_msg.contains("timed out")
        || error_msg.contains("unreachable")
        || error_msg.contains("dns")
        || debug_msg.contains("Connect")
        || debug_msg.contains("Timeout")
        || debug_msg.contains("Network")
    {
        return PlatformError::Network(format!(
            "Network error while connecting to Bluesky PDS during {}: {}. Check your internet connection and PDS availability.",
            operation, error_msg
        ));
    }

    operation.failure(format!(
        "Bluesky operation failed during {}: {}",
        operation, error_msg
    ))
}

/// Map a non-success XRPC response to PlatformError
fn map_status_error(status: StatusCode, nsid: &str, detail: &str, operation: Operation) -> PlatformError {
    let code = status.as_u16();

    if operation == Operation::Authentication && status.is_client_error() && code != 429 {
        return PlatformError::Authentication(format!(
            "Invalid Bluesky credentials ({} {}): {}. Please check your handle and app password.",
            nsid, code, detail
        ));
    }

    if code == 401
        || code == 403
        || detail.contains("ExpiredToken")
        || detail.contains("InvalidToken")
        || detail.contains("AuthenticationRequired")
    {
        return PlatformError::Authentication(format!(
            "Bluesky rejected the session during {} ({} {}): {}. Please re-authenticate.",
            operation, nsid, code, detail
        ));
    }

    if code == 429 {
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {} ({}): {}. Please wait before trying again.",
            operation, nsid, detail
        ));
    }

    if status.is_server_error() {
        return PlatformError::Network(format!(
            "Bluesky PDS error during {} ({} {}): {}",
            operation, nsid, code, detail
        ));
    }

    operation.failure(format!("{} returned {}: {}", nsid, code, detail))
}

/// Authenticated session with a PDS
#[derive(Debug)]
pub struct Session {
    pub did: String,
    pub handle: String,
    access_jwt: SecretString,
}

impl Session {
    pub fn new(did: impl Into<String>, handle: impl Into<String>, access_jwt: SecretString) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            access_jwt,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct AuthorFeedResponse {
    #[serde(default)]
    feed: Vec<FeedViewPost>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct FeedViewPost {
    post: PostView,
    reply: Option<ReplyRef>,
    reason: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: ProfileRef,
    #[serde(default)]
    record: PostRecordValue,
    like_count: Option<u64>,
    repost_count: Option<u64>,
    indexed_at: Option<String>,
}

#[derive(Deserialize)]
struct ProfileRef {
    did: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PostRecordValue {
    created_at: Option<String>,
    reply: Option<RecordReply>,
}

#[derive(Deserialize)]
struct RecordReply {
    parent: UriRef,
}

#[derive(Deserialize)]
struct ReplyRef {
    parent: MaybeUriRef,
}

#[derive(Deserialize)]
struct UriRef {
    uri: String,
}

/// Reply parents may be hydrated as not-found or blocked views
#[derive(Deserialize)]
struct MaybeUriRef {
    uri: Option<String>,
}

impl FeedViewPost {
    /// Convert to a Post, dropping items that are reposts of other content
    fn into_post(self) -> Option<Post> {
        if self.reason.is_some() {
            return None;
        }

        let reply_parent = self
            .reply
            .and_then(|reply| reply.parent.uri)
            .or_else(|| self.post.record.reply.map(|reply| reply.parent.uri));

        Some(Post {
            uri: self.post.uri,
            author: self.post.author.did,
            created_at: self.post.indexed_at.or(self.post.record.created_at),
            like_count: self.post.like_count.unwrap_or(0),
            repost_count: self.post.repost_count.unwrap_or(0),
            reply_parent,
        })
    }
}

#[derive(Deserialize)]
struct ActorLikesResponse {
    #[serde(default)]
    feed: Vec<LikedItem>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct LikedItem {
    post: UriRef,
}

#[derive(Deserialize)]
struct ListRecordsResponse<T> {
    #[serde(default = "Vec::new")]
    records: Vec<ListedRecord<T>>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct ListedRecord<T> {
    uri: String,
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepostRecordValue {
    #[serde(default)]
    created_at: String,
    subject: Option<UriRef>,
}

#[derive(Serialize)]
struct DeleteRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    rkey: &'a str,
}

#[derive(Serialize)]
struct ApplyWritesRequest<'a> {
    repo: &'a str,
    writes: Vec<DeleteWrite<'a>>,
}

#[derive(Serialize)]
struct DeleteWrite<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    collection: &'a str,
    rkey: &'a str,
}

/// Normalize an error body into "Error: message" form
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<XrpcErrorBody>(body) {
        Ok(XrpcErrorBody {
            error: Some(error),
            message: Some(message),
        }) => format!("{}: {}", error, message),
        Ok(XrpcErrorBody {
            error: Some(error),
            message: None,
        }) => error,
        Ok(XrpcErrorBody {
            error: None,
            message: Some(message),
        }) => message,
        _ => body.trim().to_string(),
    }
}

async fn check_status(
    response: reqwest::Response,
    nsid: &str,
    operation: Operation,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_status_error(status, nsid, &error_detail(&body), operation).into())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BlueskyClient {
    http: reqwest::Client,
    base_url: Url,
    session: Option<Session>,
}

impl BlueskyClient {
    /// Create a new Bluesky client for the PDS at `pds_url`
    pub fn new(pds_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(pds_url).map_err(|e| {
            SweepError::InvalidInput(format!("Invalid PDS URL '{}': {}", pds_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("skeetsweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            session: None,
        })
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Use a session established elsewhere instead of logging in
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Create a session with Bluesky
    ///
    /// `identifier` is a handle, DID or email address; `password` should be
    /// an app password.
    pub async fn login(&mut self, identifier: &str, password: &SecretString) -> Result<&Session> {
        const NSID: &str = "com.atproto.server.createSession";
        tracing::debug!("Creating Bluesky session for {}", identifier);

        let body = CreateSessionRequest {
            identifier,
            password: password.expose_secret(),
        };
        let response = self
            .http
            .post(self.endpoint(NSID)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_bluesky_error(e, Operation::Authentication))?;
        let response = check_status(response, NSID, Operation::Authentication).await?;
        let created: CreateSessionResponse = response.json().await.map_err(|e| {
            PlatformError::Authentication(format!("Unexpected {} response: {}", NSID, e))
        })?;

        tracing::info!("Authenticated as {} ({})", created.handle, created.did);
        let session = Session::new(
            created.did,
            created.handle,
            SecretString::from(created.access_jwt),
        );
        Ok(&*self.session.insert(session))
    }

    fn endpoint(&self, nsid: &str) -> Result<Url> {
        self.base_url
            .join(&format!("xrpc/{}", nsid))
            .map_err(|e| SweepError::InvalidInput(format!("Invalid XRPC endpoint {}: {}", nsid, e)))
    }

    fn require_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, nsid: &str, query: &[(&str, String)]) -> Result<T> {
        let session = self.require_session()?;
        let response = self
            .http
            .get(self.endpoint(nsid)?)
            .bearer_auth(session.access_jwt.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| map_bluesky_error(e, Operation::Fetch))?;
        let response = check_status(response, nsid, Operation::Fetch).await?;

        response.json::<T>().await.map_err(|e| {
            SweepError::from(PlatformError::Fetch(format!(
                "Unexpected {} response: {}",
                nsid, e
            )))
        })
    }

    async fn post_json<B: Serialize>(&self, nsid: &str, body: &B) -> Result<()> {
        let session = self.require_session()?;
        let response = self
            .http
            .post(self.endpoint(nsid)?)
            .bearer_auth(session.access_jwt.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| map_bluesky_error(e, Operation::Delete))?;
        check_status(response, nsid, Operation::Delete).await?;
        Ok(())
    }
}

fn page_query(key: &'static str, value: &str, cursor: Option<&str>, limit: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![(key, value.to_string()), ("limit", limit.to_string())];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }
    query
}

#[async_trait]
impl Platform for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn actor(&self) -> Result<&str> {
        Ok(self.require_session()?.did.as_str())
    }

    async fn author_feed_page(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>> {
        let response: AuthorFeedResponse = self
            .get_json(
                "app.bsky.feed.getAuthorFeed",
                &page_query("actor", actor, cursor, limit),
            )
            .await?;

        let posts = response
            .feed
            .into_iter()
            .filter_map(FeedViewPost::into_post)
            .collect();
        Ok(Page::new(posts, response.cursor))
    }

    async fn actor_likes_page(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<String>> {
        let response: ActorLikesResponse = self
            .get_json(
                "app.bsky.feed.getActorLikes",
                &page_query("actor", actor, cursor, limit),
            )
            .await?;

        let uris = response.feed.into_iter().map(|item| item.post.uri).collect();
        Ok(Page::new(uris, response.cursor))
    }

    async fn list_reposts_page(
        &self,
        repo: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Repost>> {
        let mut query = page_query("repo", repo, cursor, limit);
        query.push(("collection", Collection::Repost.nsid().to_string()));

        let response: ListRecordsResponse<RepostRecordValue> =
            self.get_json("com.atproto.repo.listRecords", &query).await?;

        let reposts = response
            .records
            .into_iter()
            .map(|record| Repost {
                uri: record.uri,
                created_at: record.value.created_at,
                subject: record.value.subject.map(|subject| subject.uri),
            })
            .collect();
        Ok(Page::new(reposts, response.cursor))
    }

    async fn delete_record(&self, target: &RecordUri) -> Result<()> {
        let body = DeleteRecordRequest {
            repo: &target.repo,
            collection: &target.collection,
            rkey: &target.rkey,
        };
        self.post_json("com.atproto.repo.deleteRecord", &body).await?;
        tracing::debug!("Deleted {}", target);
        Ok(())
    }

    async fn apply_deletes(&self, repo: &str, targets: &[RecordUri]) -> Result<()> {
        let body = ApplyWritesRequest {
            repo,
            writes: targets
                .iter()
                .map(|target| DeleteWrite {
                    kind: APPLY_WRITES_DELETE,
                    collection: &target.collection,
                    rkey: &target.rkey,
                })
                .collect(),
        };
        self.post_json("com.atproto.repo.applyWrites", &body).await?;
        tracing::debug!("Applied {} deletes to {}", targets.len(), repo);
        Ok(())
    }
}
