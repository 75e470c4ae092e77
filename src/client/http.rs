use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;

use super::{VoteApi, VoteError};
use crate::{
    error::AppError,
    models::vote::{Subject, VoteOutcome, VoteType},
};

/// Talks to the vote endpoints of a running server.
pub struct HttpVoteApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpVoteApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    /// `token` is the bearer token of the signed-in user.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn votes_url(&self, subject: Subject) -> String {
        match subject {
            Subject::Post(id) => format!("{}/api/posts/{}/votes", self.base_url, id),
            Subject::Comment(id) => format!("{}/api/comments/{}/votes", self.base_url, id),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<VoteOutcome, VoteError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| VoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<VoteOutcome>()
                .await
                .map_err(|e| VoteError::Transport(e.to_string()));
        }

        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body["error"].as_str().map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(VoteError::Rejected(match status {
            StatusCode::UNAUTHORIZED => AppError::Unauthenticated(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST => AppError::Validation(message),
            _ => AppError::StoreFailure(message),
        }))
    }
}

#[async_trait]
impl VoteApi for HttpVoteApi {
    async fn cast(&self, subject: Subject, vote_type: VoteType) -> Result<VoteOutcome, VoteError> {
        let request = self
            .client
            .post(self.votes_url(subject))
            .json(&json!({ "type": vote_type }));
        self.send(request).await
    }

    async fn retract(&self, subject: Subject, vote_id: i64) -> Result<VoteOutcome, VoteError> {
        let request = self
            .client
            .delete(format!("{}/{}", self.votes_url(subject), vote_id));
        self.send(request).await
    }
}
