use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use crate::{
    cache::{CacheInvalidator, Mutation},
    error::AppError,
    models::{
        comment::Comment,
        vote::{Subject, Vote, VoteOutcome, VoteTotals, VoteType},
    },
    session::Session,
    store::{CommentRepository, VoteRepository},
};

/// One async mutex per subject, created on demand and dropped with its last user.
#[derive(Default)]
struct SubjectLocks {
    locks: parking_lot::Mutex<HashMap<Subject, Weak<tokio::sync::Mutex<()>>>>,
}

impl SubjectLocks {
    fn get(&self, subject: Subject) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&subject).and_then(Weak::upgrade) {
            return lock;
        }
        if locks.len() >= 1024 {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(subject, Arc::downgrade(&lock));
        lock
    }
}

/// Records votes per (subject, user) and keeps the subject's totals in sync.
///
/// Mutations on one subject are serialized: find-or-insert of the user's vote and
/// the full recount that follows run inside the subject's critical section, so two
/// concurrent votes can neither duplicate a record nor overwrite each other's total.
pub struct VoteLedger {
    comments: Arc<dyn CommentRepository>,
    votes: Arc<dyn VoteRepository>,
    invalidator: Arc<CacheInvalidator>,
    locks: SubjectLocks,
}

impl VoteLedger {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        votes: Arc<dyn VoteRepository>,
        invalidator: Arc<CacheInvalidator>,
    ) -> Self {
        Self {
            comments,
            votes,
            invalidator,
            locks: SubjectLocks::default(),
        }
    }

    /// Cast `vote_type` on `subject` for the session user. An existing vote by the
    /// same user is switched in place; casting the same type again changes nothing.
    pub async fn cast(
        &self,
        session: &Session,
        subject: Subject,
        vote_type: VoteType,
    ) -> Result<VoteOutcome, AppError> {
        self.try_cast(session, subject, vote_type)
            .await
            .inspect_err(|e| e.log_at("cast vote"))
    }

    async fn try_cast(
        &self,
        session: &Session,
        subject: Subject,
        vote_type: VoteType,
    ) -> Result<VoteOutcome, AppError> {
        let user_id = session.require_user()?;
        let holder = self.resolve(subject).await?;

        let lock = self.locks.get(subject);
        let guard = lock.lock().await;

        let vote = match self.votes.find_user_vote(user_id, subject).await? {
            Some(existing) if existing.vote_type == vote_type => existing,
            Some(existing) => self
                .votes
                .set_vote_type(existing.id, vote_type)
                .await?
                .ok_or_else(|| vote_not_found(existing.id))?,
            None => self.votes.insert_vote(user_id, subject, vote_type).await?,
        };
        let totals = self.recount(subject).await?;
        drop(guard);

        self.invalidator
            .apply(&Mutation::VoteChanged { subject, holder });
        tracing::info!(
            %subject,
            user_id,
            vote_id = vote.id,
            ?vote_type,
            up = totals.total_upvotes,
            down = totals.total_downvotes,
            "Vote cast"
        );
        Ok(VoteOutcome {
            vote: Some(vote),
            totals,
        })
    }

    /// Remove the session user's vote `vote_id` from `subject`.
    /// Unknown votes, votes on another subject and votes of another user are all `NotFound`.
    pub async fn retract(
        &self,
        session: &Session,
        subject: Subject,
        vote_id: i64,
    ) -> Result<VoteOutcome, AppError> {
        self.try_retract(session, subject, vote_id)
            .await
            .inspect_err(|e| e.log_at("retract vote"))
    }

    async fn try_retract(
        &self,
        session: &Session,
        subject: Subject,
        vote_id: i64,
    ) -> Result<VoteOutcome, AppError> {
        let user_id = session.require_user()?;
        let holder = self.resolve(subject).await?;

        let lock = self.locks.get(subject);
        let guard = lock.lock().await;

        let vote = self
            .votes
            .find_vote(vote_id)
            .await?
            .filter(|v| v.subject() == Some(subject) && v.user_id == user_id)
            .ok_or_else(|| vote_not_found(vote_id))?;
        if !self.votes.delete_vote(vote.id).await? {
            return Err(vote_not_found(vote_id));
        }
        let totals = self.recount(subject).await?;
        drop(guard);

        self.invalidator
            .apply(&Mutation::VoteChanged { subject, holder });
        tracing::info!(
            %subject,
            user_id,
            vote_id,
            up = totals.total_upvotes,
            down = totals.total_downvotes,
            "Vote retracted"
        );
        Ok(VoteOutcome { vote: None, totals })
    }

    /// Stored totals of `subject`.
    pub async fn totals(&self, subject: Subject) -> Result<VoteTotals, AppError> {
        self.votes
            .vote_totals(subject)
            .await
            .and_then(|totals| totals.ok_or_else(|| subject_not_found(subject)))
            .inspect_err(|e| e.log_at("read vote totals"))
    }

    /// The vote `user_id` currently holds on `subject`, if any.
    pub async fn user_vote(&self, user_id: i64, subject: Subject) -> Result<Option<Vote>, AppError> {
        self.votes
            .find_user_vote(user_id, subject)
            .await
            .inspect_err(|e| e.log_at("read user vote"))
    }

    /// Checks the subject exists and returns the comment record for comment votes.
    async fn resolve(&self, subject: Subject) -> Result<Option<Comment>, AppError> {
        match subject {
            Subject::Post(post_id) => {
                if self.comments.post_exists(post_id).await? {
                    Ok(None)
                } else {
                    Err(subject_not_found(subject))
                }
            }
            Subject::Comment(comment_id) => self
                .comments
                .find_comment(comment_id)
                .await?
                .map(Some)
                .ok_or_else(|| subject_not_found(subject)),
        }
    }

    async fn recount(&self, subject: Subject) -> Result<VoteTotals, AppError> {
        self.votes
            .recount_votes(subject)
            .await?
            .ok_or_else(|| subject_not_found(subject))
    }
}

fn vote_not_found(vote_id: i64) -> AppError {
    AppError::NotFound(format!("Vote {} not found", vote_id))
}

fn subject_not_found(subject: Subject) -> AppError {
    AppError::NotFound(format!("{} not found", subject))
}
