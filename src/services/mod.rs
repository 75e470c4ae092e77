// src/services/mod.rs

use std::sync::Arc;

use crate::{
    cache::{CacheInvalidator, ReadCache},
    store::{CommentRepository, PostCounter, VoteRepository},
};

pub mod comments;
pub mod reply_tree;
pub mod votes;

pub use comments::CommentService;
pub use reply_tree::ReplyTreeBuilder;
pub use votes::VoteLedger;

/// The comment and vote services wired to one store and one set of caches.
#[derive(Clone)]
pub struct Forum {
    pub comments: Arc<CommentService>,
    pub votes: Arc<VoteLedger>,
    /// Exposed so embedding code can subscribe to invalidation notices.
    pub invalidator: Arc<CacheInvalidator>,
}

impl Forum {
    pub fn new<S>(store: Arc<S>, cache_capacity: usize, max_reply_depth: usize) -> Self
    where
        S: CommentRepository + VoteRepository + PostCounter + 'static,
    {
        let cache = Arc::new(ReadCache::new(cache_capacity));
        let invalidator = Arc::new(CacheInvalidator::new(cache.clone()));
        let tree = Arc::new(ReplyTreeBuilder::new(
            store.clone(),
            store.clone(),
            cache,
            max_reply_depth,
        ));
        let comments = Arc::new(CommentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            tree,
            invalidator.clone(),
        ));
        let votes = Arc::new(VoteLedger::new(store.clone(), store, invalidator.clone()));
        Self {
            comments,
            votes,
            invalidator,
        }
    }
}
