//! Thread detection over a flat post collection
//!
//! A post belongs to a thread when it replies to another post of the same
//! author that is present in the collection, or when anything in the
//! collection replies to it. Both ends of such a reply edge are members.

use std::collections::{HashMap, HashSet};

use crate::types::Post;

/// URIs of every post that is part of a reply thread
///
/// Runs in linear time using a parent-to-replies index. The result does not
/// depend on the order of `posts`.
pub fn cluster_threads(posts: &[Post]) -> HashSet<String> {
    let by_uri: HashMap<&str, &Post> = posts.iter().map(|p| (p.uri.as_str(), p)).collect();

    let mut replies: HashMap<&str, Vec<&Post>> = HashMap::new();
    for post in posts {
        if let Some(parent) = post.reply_parent.as_deref() {
            replies.entry(parent).or_default().push(post);
        }
    }

    let mut members = HashSet::new();
    for post in posts {
        // Reply to one of our own posts
        if let Some(parent) = post.reply_parent.as_deref().and_then(|uri| by_uri.get(uri)) {
            if parent.author == post.author {
                members.insert(parent.uri.clone());
                members.insert(post.uri.clone());
            }
        }

        // Anything in the collection replying to this post, any author
        if let Some(children) = replies.get(post.uri.as_str()) {
            members.insert(post.uri.clone());
            members.extend(children.iter().map(|child| child.uri.clone()));
        }
    }

    tracing::debug!("{} of {} posts belong to threads", members.len(), posts.len());
    members
}
