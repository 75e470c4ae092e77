use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The slice of the 'posts' table this service maintains: the comment counter
/// and the vote aggregate. Everything else about a post belongs to its owner.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub total_comments: i64,
    pub total_upvotes: i64,
    pub total_downvotes: i64,
}

impl Post {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            total_comments: 0,
            total_upvotes: 0,
            total_downvotes: 0,
        }
    }
}
