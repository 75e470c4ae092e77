// src/client/controller.rs

// Optimistic vote state for one subject as seen by one user.
//
// A press updates the displayed `(count, vote_type, vote_id)` immediately. A
// background worker waits for a quiet period after the last press and then moves
// the server from the last confirmed vote to the currently desired one, so rapid
// presses collapse into a single settled intent. The displayed count is always
// the confirmed count shifted by the difference between desired and confirmed
// vote, which keeps in-flight and queued presses from being counted twice.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::{VoteApi, VoteError};
use crate::models::vote::{Subject, Vote, VoteOutcome, VoteTotals, VoteType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    /// Nothing queued or in flight.
    Idle,
    /// A press is waiting for the quiet period to pass.
    Debouncing,
    /// A request is in flight.
    Pending,
}

/// What the vote widget renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteView {
    pub count: i64,
    pub vote_type: Option<VoteType>,
    pub vote_id: Option<i64>,
    pub phase: VotePhase,
    /// Message of the last failed attempt, cleared by the next success.
    pub error: Option<String>,
}

/// Last state the server confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Confirmed {
    count: i64,
    vote_type: Option<VoteType>,
    vote_id: Option<i64>,
}

impl Confirmed {
    fn from_outcome(outcome: &VoteOutcome) -> Self {
        Self {
            count: outcome.totals.score(),
            vote_type: outcome.vote.as_ref().map(|v| v.vote_type),
            vote_id: outcome.vote.as_ref().map(|v| v.id),
        }
    }
}

fn weight(vote: Option<VoteType>) -> i64 {
    vote.map_or(0, VoteType::weight)
}

struct State {
    confirmed: Confirmed,
    desired: Option<VoteType>,
    phase: VotePhase,
    error: Option<String>,
    /// Bumped on every press.
    generation: u64,
}

impl State {
    fn view(&self) -> VoteView {
        VoteView {
            count: self.confirmed.count + weight(self.desired) - weight(self.confirmed.vote_type),
            vote_type: self.desired,
            vote_id: self.desired.and(self.confirmed.vote_id),
            phase: self.phase,
            error: self.error.clone(),
        }
    }
}

struct Shared {
    subject: Subject,
    state: Mutex<State>,
    view: watch::Sender<VoteView>,
}

impl Shared {
    fn publish(&self, state: &State) {
        self.view.send_replace(state.view());
    }

    async fn dispatch(&self, api: &dyn VoteApi) {
        let (from, to, generation) = {
            let mut state = self.state.lock();
            if state.desired == state.confirmed.vote_type {
                state.phase = VotePhase::Idle;
                self.publish(&state);
                return;
            }
            state.phase = VotePhase::Pending;
            self.publish(&state);
            (state.confirmed, state.desired, state.generation)
        };

        tracing::debug!(subject = %self.subject, ?from, ?to, "Dispatching vote");
        let (reached, result) = self.transition(api, from, to).await;

        let mut state = self.state.lock();
        if let Some(outcome) = reached {
            state.confirmed = Confirmed::from_outcome(&outcome);
        }
        match result {
            Ok(()) => state.error = None,
            Err(e) => {
                // A press made while the request was in flight is newer than the
                // failed intent and still has to be sent.
                if state.generation == generation {
                    tracing::warn!(subject = %self.subject, "Vote failed, rolling back: {}", e);
                    state.desired = state.confirmed.vote_type;
                } else {
                    tracing::warn!(subject = %self.subject, "Vote failed, newer press queued: {}", e);
                }
                state.error = Some(e.to_string());
            }
        }
        state.phase = if state.generation == generation {
            VotePhase::Idle
        } else {
            VotePhase::Debouncing
        };
        self.publish(&state);
    }

    /// Moves the server from `from` to `to`. Returns the last outcome the server
    /// confirmed along the way, which may be an intermediate one if a later step failed.
    async fn transition(
        &self,
        api: &dyn VoteApi,
        from: Confirmed,
        to: Option<VoteType>,
    ) -> (Option<VoteOutcome>, Result<(), VoteError>) {
        let mut reached = None;
        if from.vote_type.is_some() {
            let Some(vote_id) = from.vote_id else {
                return (None, Err(VoteError::Transport("confirmed vote has no id".to_string())));
            };
            match api.retract(self.subject, vote_id).await {
                Ok(outcome) => reached = Some(outcome),
                Err(e) => return (None, Err(e)),
            }
        }
        if let Some(vote_type) = to {
            match api.cast(self.subject, vote_type).await {
                Ok(outcome) => reached = Some(outcome),
                Err(e) => return (reached, Err(e)),
            }
        }
        (reached, Ok(()))
    }
}

pub struct VoteController {
    shared: Arc<Shared>,
    user_id: Option<i64>,
    intents: mpsc::UnboundedSender<()>,
    worker: JoinHandle<()>,
}

impl VoteController {
    /// Starts a controller for `subject` from the server's totals and the user's
    /// current vote. `user_id` is `None` when nobody is signed in.
    pub fn new(
        api: Arc<dyn VoteApi>,
        subject: Subject,
        user_id: Option<i64>,
        totals: VoteTotals,
        vote: Option<Vote>,
        debounce: Duration,
    ) -> Self {
        let state = State {
            confirmed: Confirmed {
                count: totals.score(),
                vote_type: vote.as_ref().map(|v| v.vote_type),
                vote_id: vote.as_ref().map(|v| v.id),
            },
            desired: vote.as_ref().map(|v| v.vote_type),
            phase: VotePhase::Idle,
            error: None,
            generation: 0,
        };
        let (view, _) = watch::channel(state.view());
        let shared = Arc::new(Shared {
            subject,
            state: Mutex::new(state),
            view,
        });
        let (intents, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(shared.clone(), api, rx, debounce));
        Self {
            shared,
            user_id,
            intents,
            worker,
        }
    }

    /// Registers a press of the up or down button.
    ///
    /// Pressing the active direction retracts, the other direction switches. The
    /// returned view already reflects the prediction.
    pub fn press(&self, vote_type: VoteType) -> Result<VoteView, VoteError> {
        if self.user_id.is_none() {
            return Err(VoteError::LoginRequired);
        }
        let view = {
            let mut state = self.shared.state.lock();
            state.desired = if state.desired == Some(vote_type) {
                None
            } else {
                Some(vote_type)
            };
            state.generation += 1;
            state.phase = VotePhase::Debouncing;
            self.shared.publish(&state);
            state.view()
        };
        self.intents
            .send(())
            .map_err(|_| VoteError::Transport("vote worker stopped".to_string()))?;
        Ok(view)
    }

    pub fn view(&self) -> VoteView {
        self.shared.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoteView> {
        self.shared.view.subscribe()
    }

    /// Waits until nothing is queued or in flight and returns the view at that point.
    pub async fn settled(&self) -> VoteView {
        let mut rx = self.subscribe();
        match rx.wait_for(|view| view.phase == VotePhase::Idle).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }
}

impl Drop for VoteController {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run(
    shared: Arc<Shared>,
    api: Arc<dyn VoteApi>,
    mut intents: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
) {
    while intents.recv().await.is_some() {
        // Every further press restarts the quiet period.
        loop {
            tokio::select! {
                more = intents.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep(debounce) => break,
            }
        }
        shared.dispatch(api.as_ref()).await;
    }
}
