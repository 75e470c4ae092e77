// src/store/mod.rs

// Persistence ports.
//
// The comment and vote services only ever talk to these traits; the concrete
// backend is picked at startup (`PgStore` when `DATABASE_URL` is set,
// `MemoryStore` otherwise and in tests).

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentFilter, CommentPatch, NewComment},
        vote::{Subject, Vote, VoteTotals, VoteType},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Flat CRUD + filter access to comment records.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn post_exists(&self, post_id: i64) -> Result<bool, AppError>;

    /// Persists a new comment and returns it with its store-assigned id.
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError>;

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError>;

    /// Matching comments in creation order.
    async fn find_comments(&self, filter: CommentFilter) -> Result<Vec<Comment>, AppError>;

    /// Applies `patch` and returns the new record, or `None` if `id` does not exist.
    async fn update_comment(
        &self,
        id: i64,
        patch: CommentPatch,
    ) -> Result<Option<Comment>, AppError>;
}

/// Vote records and the denormalized totals kept on their subjects.
#[async_trait]
pub trait VoteRepository: Send + Sync {
    async fn find_vote(&self, id: i64) -> Result<Option<Vote>, AppError>;

    async fn find_user_vote(
        &self,
        user_id: i64,
        subject: Subject,
    ) -> Result<Option<Vote>, AppError>;

    /// All votes cast on any of `comment_ids`.
    async fn find_comment_votes(&self, comment_ids: &[i64]) -> Result<Vec<Vote>, AppError>;

    async fn insert_vote(
        &self,
        user_id: i64,
        subject: Subject,
        vote_type: VoteType,
    ) -> Result<Vote, AppError>;

    async fn set_vote_type(&self, id: i64, vote_type: VoteType) -> Result<Option<Vote>, AppError>;

    /// Hard delete. Returns whether a record was removed.
    async fn delete_vote(&self, id: i64) -> Result<bool, AppError>;

    /// Counts every vote of each type on `subject`, stores the result on the
    /// subject and returns it. `None` if the subject does not exist.
    async fn recount_votes(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError>;

    /// Currently stored totals of `subject`.
    async fn vote_totals(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError>;
}

/// Collaborator that keeps the owning post's comment counter up to date.
#[async_trait]
pub trait PostCounter: Send + Sync {
    async fn increment_comment_count(&self, post_id: i64) -> Result<(), AppError>;
}
