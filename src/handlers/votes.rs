use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::vote::{CastVoteRequest, Subject},
    services::Forum,
    session::Session,
};

/// Cast or switch a vote on a comment.
pub async fn cast_comment_vote(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path(comment_id): Path<i64>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = forum
        .votes
        .cast(&session, Subject::Comment(comment_id), payload.vote_type)
        .await?;
    Ok(Json(outcome))
}

/// Retract a vote on a comment.
pub async fn retract_comment_vote(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path((comment_id, vote_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = forum
        .votes
        .retract(&session, Subject::Comment(comment_id), vote_id)
        .await?;
    Ok(Json(outcome))
}

/// Cast or switch a vote on a post.
pub async fn cast_post_vote(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = forum
        .votes
        .cast(&session, Subject::Post(post_id), payload.vote_type)
        .await?;
    Ok(Json(outcome))
}

/// Retract a vote on a post.
pub async fn retract_post_vote(
    State(forum): State<Forum>,
    Extension(session): Extension<Session>,
    Path((post_id, vote_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = forum
        .votes
        .retract(&session, Subject::Post(post_id), vote_id)
        .await?;
    Ok(Json(outcome))
}
