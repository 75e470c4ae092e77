use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::vote::Vote;

/// Shown in place of the content of a soft-deleted comment.
pub const DELETED_PLACEHOLDER: &str = "[deleted]";

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// `None` for top-level comments.
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
    pub is_deleted: bool,
    pub total_upvotes: i64,
    pub total_downvotes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A comment together with its derived collections: the votes cast on it and
/// its materialized reply subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub votes: Vec<Vote>,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Wraps a stored record for display. Deleted comments keep their place in the
    /// thread but their content is redacted.
    pub fn new(mut comment: Comment, votes: Vec<Vote>) -> Self {
        if comment.is_deleted {
            comment.content = DELETED_PLACEHOLDER.to_string();
        }
        Self {
            comment,
            votes,
            replies: Vec::new(),
        }
    }

    pub fn with_replies(mut self, replies: Vec<CommentNode>) -> Self {
        self.replies = replies;
        self
    }

    pub fn id(&self) -> i64 {
        self.comment.id
    }

    /// Visits every comment of this subtree (itself included), depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a CommentNode)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            visit(node);
            stack.extend(node.replies.iter().rev());
        }
    }
}

/// Store input for a new comment. The id is assigned by the store and the author
/// comes from the session, never from the request body.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
}

/// Fields of a comment that may change after creation.
#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub content: Option<String>,
    pub is_deleted: Option<bool>,
}

/// Filter for flat comment lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentFilter {
    /// Comments of a post with no parent.
    TopLevel { post_id: i64 },
    /// Direct children of a comment.
    ChildrenOf { parent_id: i64 },
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Comment must be between 1 and 10000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// DTO for editing a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Comment must be between 1 and 10000 characters"
    ))]
    pub content: String,
}
