// src/services/reply_tree.rs

// Materializes reply subtrees from flat parent-pointer records.
//
// The tree is walked level by level with an explicit frontier instead of
// recursive calls, so thread depth never grows the call stack. Children of
// one level are looked up concurrently. Every node's subtree is cached on its
// own under `replies-<id>`, tagged with the partitions of everything it embeds.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use futures::future::join_all;

use crate::{
    cache::{CacheTag, Cached, ReadCache},
    models::{
        comment::{CommentFilter, CommentNode},
        vote::Vote,
    },
    store::{CommentRepository, VoteRepository},
};

enum Lookup {
    Cached(Cached<Vec<CommentNode>>),
    /// Direct children, without their own replies yet. `complete` is false if
    /// part of the lookup failed and the result must not be cached.
    Fetched {
        children: Vec<CommentNode>,
        complete: bool,
    },
}

struct Built {
    replies: Vec<CommentNode>,
    tags: BTreeSet<CacheTag>,
    complete: bool,
}

pub struct ReplyTreeBuilder {
    comments: Arc<dyn CommentRepository>,
    votes: Arc<dyn VoteRepository>,
    cache: Arc<ReadCache>,
    max_depth: usize,
}

impl ReplyTreeBuilder {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        votes: Arc<dyn VoteRepository>,
        cache: Arc<ReadCache>,
        max_depth: usize,
    ) -> Self {
        Self {
            comments,
            votes,
            cache,
            max_depth,
        }
    }

    /// Direct replies of `comment_id` in creation order, each with its full subtree.
    ///
    /// Never fails: a level whose lookup fails is shown without replies, and levels
    /// beyond the depth limit are cut off.
    pub async fn replies(&self, comment_id: i64) -> Vec<CommentNode> {
        // Anything invalidated after this point must not be cached from this build.
        let since = self.cache.subtrees.epoch();
        let mut hits: HashMap<i64, Cached<Vec<CommentNode>>> = HashMap::new();
        let mut expanded: Vec<(i64, Vec<CommentNode>, bool)> = Vec::new();
        let mut visited = HashSet::from([comment_id]);
        let mut frontier = vec![comment_id];
        let mut depth = 0;

        while !frontier.is_empty() {
            let lookups = join_all(frontier.iter().map(|&id| self.lookup(id))).await;
            let mut next = Vec::new();
            for (id, lookup) in frontier.into_iter().zip(lookups) {
                match lookup {
                    Lookup::Cached(hit) => {
                        hits.insert(id, hit);
                    }
                    Lookup::Fetched { children, complete } if depth >= self.max_depth => {
                        if !children.is_empty() {
                            tracing::warn!(
                                comment_id = id,
                                max_depth = self.max_depth,
                                "Reply tree truncated at depth limit"
                            );
                        }
                        expanded.push((id, Vec::new(), complete && children.is_empty()));
                    }
                    Lookup::Fetched {
                        mut children,
                        complete,
                    } => {
                        children.retain(|child| {
                            let fresh = visited.insert(child.id());
                            if !fresh {
                                tracing::warn!(
                                    comment_id = child.id(),
                                    parent_id = id,
                                    "Skipping comment already present in reply tree"
                                );
                            }
                            fresh
                        });
                        next.extend(children.iter().map(CommentNode::id));
                        expanded.push((id, children, complete));
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        // Children always come after their parent in `expanded`, so walking it
        // backwards assembles every subtree before the node that embeds it.
        let mut built: HashMap<i64, Built> = HashMap::new();
        for (id, children, complete) in expanded.into_iter().rev() {
            let mut tags = BTreeSet::from([CacheTag::Replies(id)]);
            let mut complete = complete;
            let replies: Vec<CommentNode> = children
                .into_iter()
                .map(|child| {
                    let below = match hits.remove(&child.id()) {
                        Some(hit) => Built {
                            replies: hit.value,
                            tags: hit.tags,
                            complete: true,
                        },
                        None => built.remove(&child.id()).unwrap_or(Built {
                            replies: Vec::new(),
                            tags: BTreeSet::new(),
                            complete: false,
                        }),
                    };
                    tags.extend(below.tags);
                    complete &= below.complete;
                    child.with_replies(below.replies)
                })
                .collect();

            if complete
                && !self
                    .cache
                    .subtrees
                    .insert(id, replies.clone(), tags.clone(), since)
            {
                tracing::debug!(comment_id = id, "Reply subtree changed while building, not cached");
            }
            built.insert(
                id,
                Built {
                    replies,
                    tags,
                    complete,
                },
            );
        }

        match hits.remove(&comment_id) {
            Some(hit) => hit.value,
            None => built
                .remove(&comment_id)
                .map(|b| b.replies)
                .unwrap_or_default(),
        }
    }

    async fn lookup(&self, id: i64) -> Lookup {
        if let Some(hit) = self.cache.subtrees.get(&id) {
            tracing::trace!(comment_id = id, "Reply subtree served from cache");
            return Lookup::Cached(hit);
        }

        let children = match self
            .comments
            .find_comments(CommentFilter::ChildrenOf { parent_id: id })
            .await
        {
            Ok(children) => children,
            Err(e) => {
                e.log_at("fetch replies");
                return Lookup::Fetched {
                    children: Vec::new(),
                    complete: false,
                };
            }
        };
        if children.is_empty() {
            return Lookup::Fetched {
                children: Vec::new(),
                complete: true,
            };
        }

        let ids: Vec<i64> = children.iter().map(|c| c.id).collect();
        let (votes, complete) = match self.votes.find_comment_votes(&ids).await {
            Ok(votes) => (votes, true),
            Err(e) => {
                e.log_at("fetch reply votes");
                (Vec::new(), false)
            }
        };
        let mut by_comment: HashMap<i64, Vec<Vote>> = HashMap::new();
        for vote in votes {
            if let Some(comment_id) = vote.comment_id {
                by_comment.entry(comment_id).or_default().push(vote);
            }
        }

        Lookup::Fetched {
            children: children
                .into_iter()
                .map(|c| {
                    let votes = by_comment.remove(&c.id).unwrap_or_default();
                    CommentNode::new(c, votes)
                })
                .collect(),
            complete,
        }
    }
}
