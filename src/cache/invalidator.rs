// src/cache/invalidator.rs

// Maps mutations to the cache partitions they make stale.
//
// Partitions hang off entities in a small dependency graph:
//
// ```text
// Post(p)    --Lists-->   comments-p
// Comment(c) --Subtree--> replies-c
// Comment(c) --HeldBy-->  replies-parent  (or comments-p for a top-level comment)
// Comment(c) --InPost-->  Post(p)
// ```
//
// Each mutation kind names the edge kinds it follows from the mutated entity;
// the partitions reached are invalidated.

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use tokio::sync::broadcast;

use super::{CacheTag, ReadCache};
use crate::models::{comment::Comment, vote::Subject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    Post(i64),
    Comment(i64),
    Partition(CacheTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    Lists,
    Subtree,
    HeldBy,
    InPost,
}

#[derive(Default)]
struct DependencyGraph {
    edges: HashMap<Node, Vec<(Edge, Node)>>,
}

impl DependencyGraph {
    fn link(&mut self, from: Node, edge: Edge, to: Node) {
        self.edges.entry(from).or_default().push((edge, to));
    }

    fn around_post(post_id: i64) -> Self {
        let mut graph = Self::default();
        graph.link(
            Node::Post(post_id),
            Edge::Lists,
            Node::Partition(CacheTag::Comments(post_id)),
        );
        graph
    }

    fn around_comment(comment: &Comment) -> Self {
        let mut graph = Self::around_post(comment.post_id);
        let node = Node::Comment(comment.id);
        graph.link(node, Edge::Subtree, Node::Partition(CacheTag::Replies(comment.id)));
        let holder = match comment.parent_id {
            Some(parent_id) => CacheTag::Replies(parent_id),
            None => CacheTag::Comments(comment.post_id),
        };
        graph.link(node, Edge::HeldBy, Node::Partition(holder));
        graph.link(node, Edge::InPost, Node::Post(comment.post_id));
        graph
    }

    /// Partitions reachable from `start` over edges of the given kinds.
    fn reach(&self, start: Node, follow: &[Edge]) -> BTreeSet<CacheTag> {
        let mut found = BTreeSet::new();
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if let Node::Partition(tag) = node {
                found.insert(tag);
            }
            for (edge, next) in self.edges.get(&node).into_iter().flatten() {
                if follow.contains(edge) && seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        found
    }
}

/// A change that may leave cached reads stale.
#[derive(Debug, Clone)]
pub enum Mutation {
    CommentCreated(Comment),
    CommentUpdated(Comment),
    CommentDeleted(Comment),
    /// A vote was cast, switched or retracted. `holder` is the voted comment,
    /// absent for post votes.
    VoteChanged {
        subject: Subject,
        holder: Option<Comment>,
    },
}

impl Mutation {
    fn name(&self) -> &'static str {
        match self {
            Mutation::CommentCreated(_) => "comment_created",
            Mutation::CommentUpdated(_) => "comment_updated",
            Mutation::CommentDeleted(_) => "comment_deleted",
            Mutation::VoteChanged { .. } => "vote_changed",
        }
    }

    /// Partitions this mutation makes stale.
    pub fn stale_partitions(&self) -> BTreeSet<CacheTag> {
        match self {
            Mutation::CommentCreated(comment) => DependencyGraph::around_comment(comment).reach(
                Node::Comment(comment.id),
                &[Edge::HeldBy, Edge::InPost, Edge::Lists],
            ),
            Mutation::CommentUpdated(comment) | Mutation::CommentDeleted(comment) => {
                DependencyGraph::around_comment(comment).reach(
                    Node::Comment(comment.id),
                    &[Edge::Subtree, Edge::HeldBy, Edge::InPost, Edge::Lists],
                )
            }
            // Only the partition holding the subject; ancestors holding a snapshot
            // of it carry the same tag and go with it.
            Mutation::VoteChanged {
                holder: Some(comment),
                ..
            } => DependencyGraph::around_comment(comment)
                .reach(Node::Comment(comment.id), &[Edge::HeldBy]),
            // Post totals are not part of any comment partition.
            Mutation::VoteChanged { holder: None, .. } => BTreeSet::new(),
        }
    }
}

/// Notice sent to dependent views after partitions were purged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub cause: &'static str,
    pub tags: Vec<CacheTag>,
}

pub struct CacheInvalidator {
    cache: Arc<ReadCache>,
    notices: broadcast::Sender<Invalidation>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ReadCache>) -> Self {
        let (notices, _) = broadcast::channel(256);
        Self { cache, notices }
    }

    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    /// Receives a notice for every applied invalidation.
    ///
    /// Nothing in this crate listens; the hook is for embedding code that keeps
    /// its own derived views (other processes' caches, live pages) in sync.
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.notices.subscribe()
    }

    /// Purges every partition made stale by `mutation` and notifies subscribers.
    pub fn apply(&self, mutation: &Mutation) -> Vec<CacheTag> {
        let tags: Vec<CacheTag> = mutation.stale_partitions().into_iter().collect();
        for tag in &tags {
            let purged = self.cache.invalidate(*tag);
            tracing::debug!(tag = %tag, purged, "Invalidated cache partition");
        }
        if !tags.is_empty() {
            // No subscribers is fine.
            let _ = self.notices.send(Invalidation {
                cause: mutation.name(),
                tags: tags.clone(),
            });
        }
        tags
    }
}
