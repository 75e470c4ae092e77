use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Direction of a vote. Stored as the Postgres enum `vote_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "vote_type", rename_all = "UPPERCASE")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    /// Contribution of one vote of this type to a displayed score.
    pub fn weight(self) -> i64 {
        match self {
            VoteType::Upvote => 1,
            VoteType::Downvote => -1,
        }
    }
}

/// The entity a vote applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Post(i64),
    Comment(i64),
}

impl Subject {
    pub fn id(self) -> i64 {
        match self {
            Subject::Post(id) | Subject::Comment(id) => id,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Post(id) => write!(f, "post:{}", id),
            Subject::Comment(id) => write!(f, "comment:{}", id),
        }
    }
}

/// Represents the 'votes' table in the database.
/// Exactly one of `post_id` / `comment_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
    pub user_id: i64,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
}

impl Vote {
    pub fn subject(&self) -> Option<Subject> {
        match (self.post_id, self.comment_id) {
            (Some(id), None) => Some(Subject::Post(id)),
            (None, Some(id)) => Some(Subject::Comment(id)),
            _ => None,
        }
    }
}

/// Denormalized aggregate stored on the subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct VoteTotals {
    pub total_upvotes: i64,
    pub total_downvotes: i64,
}

impl VoteTotals {
    pub fn score(&self) -> i64 {
        self.total_upvotes - self.total_downvotes
    }
}

/// DTO for casting a vote.
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    #[serde(rename = "type")]
    pub vote_type: VoteType,
}

/// Result of a cast or retract: the user's vote after the mutation (if any)
/// and the authoritative totals of the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub vote: Option<Vote>,
    pub totals: VoteTotals,
}
