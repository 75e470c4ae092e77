// src/store/postgres.rs

// Postgres-backed store.
//
// Queries are built at runtime so the crate compiles without a live database.
// Uniqueness of (user, subject) votes is enforced by partial unique indexes and
// vote totals are recounted in a single statement (see `migrations/`).

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use super::{CommentRepository, PostCounter, VoteRepository};
use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentFilter, CommentPatch, NewComment},
        vote::{Subject, Vote, VoteTotals, VoteType},
    },
};

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_id, content, is_deleted, \
     total_upvotes, total_downvotes, created_at, updated_at";

const VOTE_COLUMNS: &str = "id, vote_type, user_id, post_id, comment_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with retry, then applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let mut retry_count = 0;
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) => {
                    retry_count += 1;
                    if retry_count > 5 {
                        return Err(AppError::StoreFailure(format!(
                            "Failed to connect to database after 5 retries: {}",
                            e
                        )));
                    }
                    tracing::warn!(
                        "Database not ready, retrying in 2s... (Attempt {})",
                        retry_count
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        };
        tracing::info!("Database connected...");

        tracing::info!("Running migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::StoreFailure(e.to_string()))?;
        tracing::info!("Migrations applied successfully.");

        Ok(Self::new(pool))
    }
}

/// Table and foreign-key column holding a subject.
fn subject_columns(subject: Subject) -> (&'static str, &'static str) {
    match subject {
        Subject::Post(_) => ("posts", "post_id"),
        Subject::Comment(_) => ("comments", "comment_id"),
    }
}

#[async_trait]
impl CommentRepository for PgStore {
    async fn post_exists(&self, post_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError> {
        let sql = format!(
            r#"
            INSERT INTO comments (post_id, parent_id, author_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment.post_id)
            .bind(comment.parent_id)
            .bind(comment.author_id)
            .bind(&comment.content)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_comments(&self, filter: CommentFilter) -> Result<Vec<Comment>, AppError> {
        let (condition, key) = match filter {
            CommentFilter::TopLevel { post_id } => ("post_id = $1 AND parent_id IS NULL", post_id),
            CommentFilter::ChildrenOf { parent_id } => ("parent_id = $1", parent_id),
        };
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {condition} ORDER BY created_at ASC, id ASC"
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment(
        &self,
        id: i64,
        patch: CommentPatch,
    ) -> Result<Option<Comment>, AppError> {
        let sql = format!(
            r#"
            UPDATE comments
            SET content = COALESCE($2, content),
                is_deleted = COALESCE($3, is_deleted),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(patch.content)
            .bind(patch.is_deleted)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn find_vote(&self, id: i64) -> Result<Option<Vote>, AppError> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE id = $1");
        Ok(sqlx::query_as::<_, Vote>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_vote(
        &self,
        user_id: i64,
        subject: Subject,
    ) -> Result<Option<Vote>, AppError> {
        let (_, column) = subject_columns(subject);
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE user_id = $1 AND {column} = $2");
        Ok(sqlx::query_as::<_, Vote>(&sql)
            .bind(user_id)
            .bind(subject.id())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_comment_votes(&self, comment_ids: &[i64]) -> Result<Vec<Vote>, AppError> {
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE comment_id = ANY($1) ORDER BY id");
        Ok(sqlx::query_as::<_, Vote>(&sql)
            .bind(comment_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_vote(
        &self,
        user_id: i64,
        subject: Subject,
        vote_type: VoteType,
    ) -> Result<Vote, AppError> {
        let (post_id, comment_id) = match subject {
            Subject::Post(id) => (Some(id), None),
            Subject::Comment(id) => (None, Some(id)),
        };
        let sql = format!(
            r#"
            INSERT INTO votes (vote_type, user_id, post_id, comment_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {VOTE_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Vote>(&sql)
            .bind(vote_type)
            .bind(user_id)
            .bind(post_id)
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_vote_type(&self, id: i64, vote_type: VoteType) -> Result<Option<Vote>, AppError> {
        let sql = format!("UPDATE votes SET vote_type = $2 WHERE id = $1 RETURNING {VOTE_COLUMNS}");
        Ok(sqlx::query_as::<_, Vote>(&sql)
            .bind(id)
            .bind(vote_type)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_vote(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recount_votes(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError> {
        let (table, column) = subject_columns(subject);
        // One statement, so concurrent recounts never interleave a read and a write.
        let sql = format!(
            r#"
            UPDATE {table}
            SET total_upvotes = (SELECT COUNT(*) FROM votes WHERE {column} = $1 AND vote_type = 'UPVOTE'),
                total_downvotes = (SELECT COUNT(*) FROM votes WHERE {column} = $1 AND vote_type = 'DOWNVOTE')
            WHERE id = $1
            RETURNING total_upvotes, total_downvotes
            "#
        );
        Ok(sqlx::query_as::<_, VoteTotals>(&sql)
            .bind(subject.id())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn vote_totals(&self, subject: Subject) -> Result<Option<VoteTotals>, AppError> {
        let (table, _) = subject_columns(subject);
        let sql = format!("SELECT total_upvotes, total_downvotes FROM {table} WHERE id = $1");
        Ok(sqlx::query_as::<_, VoteTotals>(&sql)
            .bind(subject.id())
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl PostCounter for PgStore {
    async fn increment_comment_count(&self, post_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE posts SET total_comments = total_comments + 1 WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        Ok(())
    }
}
