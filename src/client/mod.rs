// src/client/mod.rs

// Client side of voting: the optimistic controller and the transports it can
// talk through.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::vote::{Subject, VoteOutcome, VoteType},
    services::VoteLedger,
    session::Session,
};

pub mod controller;
pub mod http;

pub use controller::{VoteController, VotePhase, VoteView};
pub use http::HttpVoteApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    /// No user is signed in; the caller should show a login prompt.
    LoginRequired,
    /// The request never produced a server answer.
    Transport(String),
    /// The server answered with an error.
    Rejected(AppError),
}

impl fmt::Display for VoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteError::LoginRequired => write!(f, "login required"),
            VoteError::Transport(msg) => write!(f, "vote request failed: {}", msg),
            VoteError::Rejected(err) => write!(f, "vote rejected: {}", err),
        }
    }
}

impl std::error::Error for VoteError {}

impl From<AppError> for VoteError {
    fn from(err: AppError) -> Self {
        VoteError::Rejected(err)
    }
}

/// Server operations the controller needs.
#[async_trait]
pub trait VoteApi: Send + Sync {
    async fn cast(&self, subject: Subject, vote_type: VoteType) -> Result<VoteOutcome, VoteError>;

    async fn retract(&self, subject: Subject, vote_id: i64) -> Result<VoteOutcome, VoteError>;
}

/// Calls a `VoteLedger` in the same process on behalf of one session.
pub struct LocalVoteApi {
    ledger: Arc<VoteLedger>,
    session: Session,
}

impl LocalVoteApi {
    pub fn new(ledger: Arc<VoteLedger>, session: Session) -> Self {
        Self { ledger, session }
    }
}

#[async_trait]
impl VoteApi for LocalVoteApi {
    async fn cast(&self, subject: Subject, vote_type: VoteType) -> Result<VoteOutcome, VoteError> {
        Ok(self.ledger.cast(&self.session, subject, vote_type).await?)
    }

    async fn retract(&self, subject: Subject, vote_id: i64) -> Result<VoteOutcome, VoteError> {
        Ok(self.ledger.retract(&self.session, subject, vote_id).await?)
    }
}
