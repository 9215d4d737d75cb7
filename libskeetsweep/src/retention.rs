//! Retention rules for posts and reposts
//!
//! Every rule of a [`RetentionPolicy`] is an independent reason to keep a
//! post. Rules are OR-ed, so a post is deleted only when no enabled rule
//! protects it. A disabled rule never protects anything.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::types::{Post, Repost};

/// Immutable set of retention rules for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep posts with at least this many likes
    pub min_likes: Option<u64>,
    /// Keep posts with at least this many reposts
    pub min_reposts: Option<u64>,
    /// Keep posts that are part of a reply thread
    pub protect_threads: bool,
    /// Keep posts the account has liked itself
    pub protect_self_liked: bool,
    /// Keep posts created on or after this day
    pub date_cutoff: Option<NaiveDate>,
}

impl RetentionPolicy {
    /// Whether any rule is enabled
    ///
    /// With no rules every post is selected for deletion.
    pub fn has_rules(&self) -> bool {
        self.min_likes.is_some()
            || self.min_reposts.is_some()
            || self.protect_threads
            || self.protect_self_liked
            || self.date_cutoff.is_some()
    }
}

/// The rule that kept a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepReason {
    Thread,
    MinLikes,
    MinReposts,
    SelfLiked,
    NotBeforeCutoff,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepReason::Thread => write!(f, "part of a thread"),
            KeepReason::MinLikes => write!(f, "enough likes"),
            KeepReason::MinReposts => write!(f, "enough reposts"),
            KeepReason::SelfLiked => write!(f, "liked by you"),
            KeepReason::NotBeforeCutoff => write!(f, "not before cutoff"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    /// Kept, with the first rule that matched
    Keep(KeepReason),
    Delete,
}

impl RetentionDecision {
    pub fn is_keep(&self) -> bool {
        matches!(self, RetentionDecision::Keep(_))
    }
}

/// Decide whether `post` survives `policy`
///
/// `thread_set` holds the URIs found by [`crate::thread::cluster_threads`];
/// `self_liked` holds the URIs of posts the account has liked. A post
/// without a parseable creation day is not protected by the date rule.
pub fn classify(
    post: &Post,
    policy: &RetentionPolicy,
    thread_set: &HashSet<String>,
    self_liked: &HashSet<String>,
) -> RetentionDecision {
    if policy.protect_threads && thread_set.contains(&post.uri) {
        return RetentionDecision::Keep(KeepReason::Thread);
    }
    if policy.min_likes.is_some_and(|min| post.like_count >= min) {
        return RetentionDecision::Keep(KeepReason::MinLikes);
    }
    if policy.min_reposts.is_some_and(|min| post.repost_count >= min) {
        return RetentionDecision::Keep(KeepReason::MinReposts);
    }
    if policy.protect_self_liked && self_liked.contains(&post.uri) {
        return RetentionDecision::Keep(KeepReason::SelfLiked);
    }
    if let Some(cutoff) = policy.date_cutoff {
        if post.created_on().is_some_and(|day| day >= cutoff) {
            return RetentionDecision::Keep(KeepReason::NotBeforeCutoff);
        }
    }
    RetentionDecision::Delete
}

/// Outcome of classifying a whole post collection
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostAnalysis {
    pub total: usize,
    /// Number of kept posts per first matching rule
    pub kept_by: BTreeMap<KeepReason, usize>,
    /// URIs selected for deletion, in collection order
    pub to_delete: Vec<String>,
}

impl PostAnalysis {
    pub fn kept(&self) -> usize {
        self.total - self.to_delete.len()
    }
}

/// Classify every post and collect the ones no rule protects
pub fn select_for_deletion(
    posts: &[Post],
    policy: &RetentionPolicy,
    thread_set: &HashSet<String>,
    self_liked: &HashSet<String>,
) -> PostAnalysis {
    let mut analysis = PostAnalysis {
        total: posts.len(),
        ..Default::default()
    };

    for post in posts {
        match classify(post, policy, thread_set, self_liked) {
            RetentionDecision::Keep(reason) => {
                *analysis.kept_by.entry(reason).or_insert(0) += 1;
            }
            RetentionDecision::Delete => analysis.to_delete.push(post.uri.clone()),
        }
    }

    tracing::info!(
        "Selected {} of {} posts for deletion",
        analysis.to_delete.len(),
        analysis.total
    );
    analysis
}

/// Outcome of scanning reposts against a cutoff
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepostAnalysis {
    pub total: usize,
    /// Reposts examined before the scan stopped
    pub scanned: usize,
    /// Reposts kept because their timestamp could not be read
    pub undated: usize,
    /// URIs selected for deletion, oldest first
    pub to_delete: Vec<String>,
}

/// Select reposts created strictly before midnight UTC of `cutoff`
///
/// `newest_first` must be in server order. The scan starts at the oldest
/// repost and stops at the first one at or after the cutoff, so it relies on
/// the input being sorted by creation time.
pub fn select_expired_reposts(newest_first: &[Repost], cutoff: NaiveDate) -> RepostAnalysis {
    let cutoff_at: DateTime<Utc> = cutoff.and_time(NaiveTime::MIN).and_utc();
    let mut analysis = RepostAnalysis {
        total: newest_first.len(),
        ..Default::default()
    };

    for repost in newest_first.iter().rev() {
        analysis.scanned += 1;
        match repost.created_at_utc() {
            Some(created) if created < cutoff_at => analysis.to_delete.push(repost.uri.clone()),
            Some(_) => break,
            None => {
                tracing::warn!(
                    "Keeping {}: unreadable createdAt {:?}",
                    repost.uri,
                    repost.created_at
                );
                analysis.undated += 1;
            }
        }
    }

    tracing::info!(
        "Selected {} of {} reposts created before {}",
        analysis.to_delete.len(),
        analysis.total,
        cutoff
    );
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(id: &str) -> String {
        format!("at://did:plc:alice/app.bsky.feed.post/{}", id)
    }

    fn post(id: &str) -> Post {
        Post {
            uri: uri(id),
            author: "did:plc:alice".to_string(),
            created_at: Some("2023-06-01T12:00:00.000Z".to_string()),
            like_count: 0,
            repost_count: 0,
            reply_parent: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn repost(id: &str, created_at: &str) -> Repost {
        Repost {
            uri: format!("at://did:plc:alice/app.bsky.feed.repost/{}", id),
            created_at: created_at.to_string(),
            subject: None,
        }
    }

    #[test]
    fn test_no_rules_deletes_everything() {
        let policy = RetentionPolicy::default();
        assert!(!policy.has_rules());

        let mut popular = post("a");
        popular.like_count = 1_000;
        let decision = classify(&popular, &policy, &HashSet::new(), &HashSet::new());
        assert_eq!(decision, RetentionDecision::Delete);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let policy = RetentionPolicy {
            min_likes: Some(10),
            min_reposts: Some(3),
            ..Default::default()
        };
        let none = HashSet::new();

        let mut p = post("a");
        p.like_count = 10;
        assert_eq!(
            classify(&p, &policy, &none, &none),
            RetentionDecision::Keep(KeepReason::MinLikes)
        );

        p.like_count = 9;
        p.repost_count = 3;
        assert_eq!(
            classify(&p, &policy, &none, &none),
            RetentionDecision::Keep(KeepReason::MinReposts)
        );

        p.repost_count = 2;
        assert_eq!(classify(&p, &policy, &none, &none), RetentionDecision::Delete);
    }

    #[test]
    fn test_date_rule_day_granularity() {
        let policy = RetentionPolicy {
            date_cutoff: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        let none = HashSet::new();
        let mut p = post("a");

        p.created_at = Some("2024-01-01T00:00:00Z".to_string());
        assert!(classify(&p, &policy, &none, &none).is_keep());

        p.created_at = Some("2023-12-31T23:59:59.999Z".to_string());
        assert!(!classify(&p, &policy, &none, &none).is_keep());

        p.created_at = None;
        assert!(!classify(&p, &policy, &none, &none).is_keep());

        p.created_at = Some("soon".to_string());
        assert!(!classify(&p, &policy, &none, &none).is_keep());
    }

    #[test]
    fn test_disabled_rules_never_protect() {
        let mut p = post("a");
        p.like_count = 50;
        p.repost_count = 50;
        p.created_at = Some("2030-01-01T00:00:00Z".to_string());
        let everything = HashSet::from([p.uri.clone()]);

        let decision = classify(&p, &RetentionPolicy::default(), &everything, &everything);
        assert_eq!(decision, RetentionDecision::Delete);
    }

    #[test]
    fn test_rule_combination_is_plain_or() {
        // A post that satisfies every rule when it is enabled
        let mut p = post("a");
        p.like_count = 5;
        p.repost_count = 5;
        p.created_at = Some("2024-06-01T00:00:00Z".to_string());
        let member = HashSet::from([p.uri.clone()]);

        for mask in 0u8..32 {
            let policy = RetentionPolicy {
                protect_threads: mask & 1 != 0,
                min_likes: (mask & 2 != 0).then_some(5),
                min_reposts: (mask & 4 != 0).then_some(5),
                protect_self_liked: mask & 8 != 0,
                date_cutoff: (mask & 16 != 0).then_some(date(2024, 1, 1)),
            };
            let decision = classify(&p, &policy, &member, &member);
            assert_eq!(decision.is_keep(), mask != 0, "mask {:05b}", mask);
        }
    }

    #[test]
    fn test_first_matching_reason_is_reported() {
        let mut p = post("a");
        p.like_count = 100;
        let member = HashSet::from([p.uri.clone()]);
        let policy = RetentionPolicy {
            min_likes: Some(1),
            protect_self_liked: true,
            ..Default::default()
        };

        assert_eq!(
            classify(&p, &policy, &HashSet::new(), &member),
            RetentionDecision::Keep(KeepReason::MinLikes)
        );
    }

    #[test]
    fn test_ten_post_scenario() {
        use crate::thread::cluster_threads;

        let mut posts: Vec<Post> = Vec::new();

        // 1 and 2: a self-reply pair from last year
        let root = post("root");
        let mut reply = post("reply");
        reply.reply_parent = Some(root.uri.clone());
        posts.push(root);
        posts.push(reply);

        // 3: popular
        let mut popular = post("popular");
        popular.like_count = 50;
        posts.push(popular);

        // 4: liked by the account owner
        posts.push(post("self-liked"));

        // 5: on the cutoff day
        let mut recent = post("recent");
        recent.created_at = Some("2024-01-01T00:00:00.000Z".to_string());
        posts.push(recent);

        // 6: just under the like threshold, day before cutoff
        let mut almost = post("almost");
        almost.like_count = 9;
        almost.created_at = Some("2023-12-31T23:59:59.000Z".to_string());
        posts.push(almost);

        // 7: reposted, but that rule is off
        let mut reposted = post("reposted");
        reposted.repost_count = 30;
        posts.push(reposted);

        // 8: no timestamp
        let mut undated = post("undated");
        undated.created_at = None;
        posts.push(undated);

        // 9: reply to a post outside the collection
        let mut orphan = post("orphan");
        orphan.reply_parent = Some(uri("elsewhere"));
        posts.push(orphan);

        // 10: garbage timestamp
        let mut garbled = post("garbled");
        garbled.created_at = Some("last tuesday".to_string());
        posts.push(garbled);

        let policy = RetentionPolicy {
            min_likes: Some(10),
            min_reposts: None,
            protect_threads: true,
            protect_self_liked: true,
            date_cutoff: Some(date(2024, 1, 1)),
        };
        let threads = cluster_threads(&posts);
        let liked = HashSet::from([uri("self-liked"), uri("not-mine")]);

        let analysis = select_for_deletion(&posts, &policy, &threads, &liked);

        assert_eq!(analysis.total, 10);
        assert_eq!(
            analysis.to_delete,
            vec![
                uri("almost"),
                uri("reposted"),
                uri("undated"),
                uri("orphan"),
                uri("garbled"),
            ]
        );
        assert_eq!(analysis.kept(), 5);
        assert_eq!(analysis.kept_by.get(&KeepReason::Thread), Some(&2));
        assert_eq!(analysis.kept_by.get(&KeepReason::MinLikes), Some(&1));
        assert_eq!(analysis.kept_by.get(&KeepReason::SelfLiked), Some(&1));
        assert_eq!(analysis.kept_by.get(&KeepReason::NotBeforeCutoff), Some(&1));
        assert_eq!(analysis.kept_by.get(&KeepReason::MinReposts), None);
    }

    #[test]
    fn test_empty_collection() {
        let analysis = select_for_deletion(
            &[],
            &RetentionPolicy::default(),
            &HashSet::new(),
            &HashSet::new(),
        );
        assert_eq!(analysis.total, 0);
        assert!(analysis.to_delete.is_empty());
    }

    #[test]
    fn test_expired_reposts_oldest_first() {
        let newest_first = vec![
            repost("4", "2024-03-01T00:00:00Z"),
            repost("3", "2024-01-01T00:00:00Z"),
            repost("2", "2023-12-31T23:59:59Z"),
            repost("1", "2023-01-01T00:00:00Z"),
        ];

        let analysis = select_expired_reposts(&newest_first, date(2024, 1, 1));
        assert_eq!(
            analysis.to_delete,
            vec![
                "at://did:plc:alice/app.bsky.feed.repost/1",
                "at://did:plc:alice/app.bsky.feed.repost/2",
            ]
        );
        // Stopped at "3", never looked at "4"
        assert_eq!(analysis.scanned, 3);
        assert_eq!(analysis.total, 4);
    }

    #[test]
    fn test_expired_reposts_early_exit_on_unsorted_input() {
        // "old" sits before a newer repost in scan order and is never reached
        let newest_first = vec![
            repost("old", "2020-01-01T00:00:00Z"),
            repost("new", "2024-06-01T00:00:00Z"),
            repost("oldest", "2019-01-01T00:00:00Z"),
        ];

        let analysis = select_expired_reposts(&newest_first, date(2024, 1, 1));
        assert_eq!(
            analysis.to_delete,
            vec!["at://did:plc:alice/app.bsky.feed.repost/oldest"]
        );
    }

    #[test]
    fn test_expired_reposts_skip_unreadable_dates() {
        let newest_first = vec![
            repost("b", "2023-02-01T00:00:00Z"),
            repost("bad", ""),
            repost("a", "2023-01-01T00:00:00Z"),
        ];

        let analysis = select_expired_reposts(&newest_first, date(2024, 1, 1));
        assert_eq!(analysis.to_delete.len(), 2);
        assert_eq!(analysis.undated, 1);
        assert_eq!(analysis.scanned, 3);
    }

    #[test]
    fn test_expired_reposts_nothing_old_enough() {
        let newest_first = vec![repost("a", "2024-02-01T00:00:00Z")];
        let analysis = select_expired_reposts(&newest_first, date(2024, 1, 1));
        assert!(analysis.to_delete.is_empty());
        assert_eq!(analysis.scanned, 1);
    }
}
