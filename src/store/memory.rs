// src/store/memory.rs

// In-process store used when no database is configured, and by the test suite.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CommentRepository, PostCounter, VoteRepository};
use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentFilter, CommentPatch, NewComment},
        post::Post,
        vote::{Subject, Vote, VoteTotals, VoteType},
    },
};

#[derive(Default)]
struct Tables {
    posts: BTreeMap<i64, Post>,
    // Keyed by id; ids are handed out in increasing order so iteration is creation order.
    comments: BTreeMap<i64, Comment>,
    votes: BTreeMap<i64, Vote>,
    last_comment_id: i64,
    last_vote_id: i64,
}

impl Tables {
    fn count(&self, subject: Subject, vote_type: VoteType) -> i64 {
        self.votes
            .values()
            .filter(|v| v.subject() == Some(subject) && v.vote_type == vote_type)
            .count() as i64
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a post. Post management lives elsewhere, so this is the only
    /// way posts enter the in-memory store.
    pub fn seed_post(&self, post_id: i64) {
        self.tables
            .write()
            .posts
            .entry(post_id)
            .or_insert_with(|| Post::new(post_id));
    }

    pub fn post(&self, post_id: i64) -> Option<Post> {
        self.tables.read().posts.get(&post_id).cloned()
    }

    /// Number of stored votes, across all subjects.
    pub fn vote_count(&self) -> usize {
        self.tables.read().votes.len()
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn post_exists(&self, post_id: i64) -> Result<bool, AppError> {
        Ok(self.tables.read().posts.contains_key(&post_id))
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError> {
        let mut tables = self.tables.write();
        tables.last_comment_id += 1;
        let now = chrono::Utc::now();
        let record = Comment {
            id: tables.last_comment_id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            author_id: comment.author_id,
            content: comment.content,
            is_deleted: false,
            total_upvotes: 0,
            total_downvotes: 0,
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        Ok(self.tables.read().comments.get(&id).cloned())
    }

    async fn find_comments(&self, filter: CommentFilter) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables.read();
        let matches = tables.comments.values().filter(|c| match filter {
            CommentFilter::TopLevel { post_id } => c.post_id == post_id && c.parent_id.is_none(),
            CommentFilter::ChildrenOf { parent_id } => c.parent_id == Some(parent_id),
        });
        Ok(matches.cloned().collect())
    }

    async fn update_comment(
        &self,
        id: i64,
        patch: CommentPatch,
    ) -> Result<Option<Comment>, AppError> {
        let mut tables = self.tables.write();
        let Some(comment) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(content) = patch.content {
            comment.content = content;
        }
        if let Some(is_deleted) = patch.is_deleted {
            comment.is_deleted = is_deleted;
        }
        comment.updated_at = chrono::Utc::now();
        Ok(Some(comment.clone()))
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn find_vote(&self, id: i64) -> Result<Option<Vote>, AppError> {
        Ok(self.tables.read().votes.get(&id).cloned())
    }

    async fn find_user_vote(
        &self,
        user_id: i64,
        subject: Subject,
    ) -> Result<Option<Vote>, AppError> {
        Ok(self
            .tables
            .read()
            .votes
            .values()
            .find(|v| v.user_id == user_id && v.subject() == Some(subject))
            .cloned())
    }

    async fn find_comment_votes(&self, comment_ids: &[i64]) -> Result<Vec<Vote>, AppError> {
        Ok(self
            .tables
            .read()
            .votes
            .values()
            .filter(|v| v.comment_id.is_some_and(|id| comment_ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn insert_vote(
        &self,
        user_id: i64,
        subject: Subject,
        vote_type: VoteType,
    ) -> Result<Vote, AppError> {
        let mut tables = self.tables.write();
        // Same guarantee the unique indexes give on Postgres.
        if tables
            .votes
            .values()
            .any(|v| v.user_id == user_id && v.subject() == Some(subject))
        {
            return Err(AppError::StoreFailure(format!(
                "duplicate vote by user {} on {}",
                user_id, subject
            )));
        }
        tables.last_vote_id += 1;
        let (post_id, comment_id) = match subject {
            Subject::Post(id) => (Some(id), None),
            Subject::Comment(id) => (None, Some(id)),
        };
        let vote = Vote {
            id: tables.last_vote_id,
            vote_type,
            user_id,
            post_id,
            comment_id,
        };
        tables.votes.insert(vote.id, vote.clone());
        Ok(vote)
    }

    async fn set_vote_type(&self, id: i64, vote_type: VoteType) -> Result<Option<Vote>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.votes.get_mut(&id).map(|vote| {
            vote.vote_type = vote_type;
            vote.clone()
        }))
    }

    async fn delete_vote(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.tables.write().votes.remove(&id).is_some())
    }

    async fn recount_votes(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError> {
        let mut tables = self.tables.write();
        let totals = VoteTotals {
            total_upvotes: tables.count(subject, VoteType::Upvote),
            total_downvotes: tables.count(subject, VoteType::Downvote),
        };
        match subject {
            Subject::Post(id) => {
                let Some(post) = tables.posts.get_mut(&id) else {
                    return Ok(None);
                };
                post.total_upvotes = totals.total_upvotes;
                post.total_downvotes = totals.total_downvotes;
            }
            Subject::Comment(id) => {
                let Some(comment) = tables.comments.get_mut(&id) else {
                    return Ok(None);
                };
                comment.total_upvotes = totals.total_upvotes;
                comment.total_downvotes = totals.total_downvotes;
            }
        }
        Ok(Some(totals))
    }

    async fn vote_totals(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError> {
        let tables = self.tables.read();
        Ok(match subject {
            Subject::Post(id) => tables.posts.get(&id).map(|p| VoteTotals {
                total_upvotes: p.total_upvotes,
                total_downvotes: p.total_downvotes,
            }),
            Subject::Comment(id) => tables.comments.get(&id).map(|c| VoteTotals {
                total_upvotes: c.total_upvotes,
                total_downvotes: c.total_downvotes,
            }),
        })
    }
}

#[async_trait]
impl PostCounter for MemoryStore {
    async fn increment_comment_count(&self, post_id: i64) -> Result<(), AppError> {
        match self.tables.write().posts.get_mut(&post_id) {
            Some(post) => {
                post.total_comments += 1;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Post {} not found", post_id))),
        }
    }
}
