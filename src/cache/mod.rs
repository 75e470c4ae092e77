// src/cache/mod.rs

// Tag-invalidated read caches.
//
// Every cached value carries the set of partition tags it was built from. A
// subtree snapshot embeds its descendants, so it carries their tags too and is
// purged whenever any of them is.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    hash::Hash,
    num::NonZeroUsize,
    str::FromStr,
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::models::comment::{Comment, CommentNode};

pub mod invalidator;

pub use invalidator::{CacheInvalidator, Invalidation, Mutation};

/// A named invalidation unit.
///
/// The string forms `comments-<postId>` and `replies-<commentId>` are shared with
/// other processes and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheTag {
    /// Top-level comment listing of a post.
    Comments(i64),
    /// Reply subtree rooted at a comment.
    Replies(i64),
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Comments(post_id) => write!(f, "comments-{}", post_id),
            CacheTag::Replies(comment_id) => write!(f, "replies-{}", comment_id),
        }
    }
}

impl FromStr for CacheTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once('-')
            .ok_or_else(|| format!("malformed cache tag {:?}", s))?;
        let id = id
            .parse::<i64>()
            .map_err(|e| format!("malformed cache tag {:?}: {}", s, e))?;
        match prefix {
            "comments" => Ok(CacheTag::Comments(id)),
            "replies" => Ok(CacheTag::Replies(id)),
            _ => Err(format!("unknown cache tag prefix {:?}", prefix)),
        }
    }
}

/// A cache hit: the value and every tag it depends on.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    pub tags: BTreeSet<CacheTag>,
}

struct Inner<K, V> {
    entries: LruCache<K, Cached<V>>,
    by_tag: HashMap<CacheTag, HashSet<K>>,
    /// Bumped by every invalidation.
    epoch: u64,
    /// Epoch at which each recently invalidated tag was last purged.
    stamps: LruCache<CacheTag, u64>,
    /// Highest stamp pushed out of `stamps`; unknown tags count as purged then.
    floor: u64,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn unindex(&mut self, key: &K, tags: &BTreeSet<CacheTag>) {
        for tag in tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
    }

    fn purged_after(&self, tag: &CacheTag, since: u64) -> bool {
        self.stamps.peek(tag).copied().unwrap_or(self.floor) > since
    }
}

/// Bounded LRU cache whose entries can be purged by tag.
///
/// Readers take an [`epoch`](TagCache::epoch) before querying the store and pass
/// it to [`insert`](TagCache::insert), which drops the value if any of its tags
/// was invalidated in between.
pub struct TagCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TagCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                by_tag: HashMap::new(),
                epoch: 0,
                stamps: LruCache::new(NonZeroUsize::new(capacity.get().saturating_mul(4)).unwrap_or(capacity)),
                floor: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<Cached<V>> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Current invalidation epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Caches `value` unless one of `tags` was invalidated after `since`.
    /// Returns whether the value was stored.
    pub fn insert(&self, key: K, value: V, tags: BTreeSet<CacheTag>, since: u64) -> bool {
        let mut inner = self.inner.lock();
        if tags.iter().any(|tag| inner.purged_after(tag, since)) {
            return false;
        }
        if let Some(old) = inner.entries.pop(&key) {
            inner.unindex(&key, &old.tags);
        }
        for tag in &tags {
            inner.by_tag.entry(*tag).or_default().insert(key.clone());
        }
        if let Some((evicted_key, evicted)) = inner.entries.push(key, Cached { value, tags }) {
            inner.unindex(&evicted_key, &evicted.tags);
        }
        true
    }

    /// Drops every entry tagged with `tag`. Returns how many were dropped.
    pub fn invalidate(&self, tag: CacheTag) -> usize {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        let epoch = inner.epoch;
        if let Some((old_tag, stamp)) = inner.stamps.push(tag, epoch) {
            if old_tag != tag {
                inner.floor = inner.floor.max(stamp);
            }
        }
        let Some(keys) = inner.by_tag.remove(&tag) else {
            return 0;
        };
        let mut purged = 0;
        for key in keys {
            if let Some(entry) = inner.entries.pop(&key) {
                inner.unindex(&key, &entry.tags);
                purged += 1;
            }
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two read caches of the comment subsystem.
pub struct ReadCache {
    /// Top-level comments of a post, keyed by post id. Subtrees are not embedded.
    pub listings: TagCache<i64, Vec<Comment>>,
    /// Reply subtree below a comment, keyed by the comment id.
    pub subtrees: TagCache<i64, Vec<CommentNode>>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            listings: TagCache::new(capacity),
            subtrees: TagCache::new(capacity),
        }
    }

    pub fn invalidate(&self, tag: CacheTag) -> usize {
        self.listings.invalidate(tag) + self.subtrees.invalidate(tag)
    }
}
