use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::comment::{CreateCommentRequest, UpdateCommentRequest},
    services::Forum,
    session::Session,
};

/// Create a new comment, or a reply when `parent_id` is given.
/// Requires: Login.
pub async fn create_comment(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let comment = forum.comments.create(&session, post_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// List all top-level comments of a post, each with its reply tree.
pub async fn list_comments(
    State(forum): State<Forum>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comments = forum.comments.read_by_post(post_id).await?;
    Ok(Json(comments))
}

/// Get a single comment with its reply tree.
pub async fn get_comment(
    State(forum): State<Forum>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comment = forum
        .comments
        .read(id)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;
    Ok(Json(comment))
}

/// Get the reply tree below a comment.
pub async fn list_replies(
    State(forum): State<Forum>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(forum.comments.replies(id).await))
}

/// Edit a comment.
/// Requires: Login.
pub async fn update_comment(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    session.require_user()?;
    let comment = forum.comments.update(id, payload).await?;
    Ok(Json(comment))
}

/// Delete a comment (Soft Delete).
/// Requires: Login.
pub async fn delete_comment(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    session.require_user()?;
    let comment = forum.comments.soft_delete(id).await?;
    Ok(Json(comment))
}
