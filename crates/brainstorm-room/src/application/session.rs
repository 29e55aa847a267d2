//! Per-observer participant session: draft buffer and the auto-submit timer.
//!
//! A `ParticipantSession` follows the room through `observe` calls. While the
//! participant owes a contribution for a timed turn it keeps exactly one
//! timer armed; when the deadline passes the buffered draft is submitted as
//! a timeout contribution. Moving on to a new turn cancels the timer and
//! clears the draft; dropping the session cancels the timer too.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use brainstorm_core::clock::Clock;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::EventRepository;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::command_handlers::{RoomCommandResult, handle_submit_contribution};
use crate::application::query_handlers::RoomView;
use crate::domain::aggregates::{RoomStatus, SubmitOutcome};
use crate::domain::commands::SubmitContribution;
use crate::domain::events::ContributionSource;

/// Retry policy for timeout submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSubmitPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff step; attempt `n` waits `n * backoff` before the next one.
    pub backoff: Duration,
}

impl Default for AutoSubmitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Where the auto-submit timer stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSubmitState {
    /// No timer.
    Idle,
    /// Waiting for `deadline`.
    Armed {
        /// The turn being timed.
        turn: u32,
        /// When the timeout submission fires.
        deadline: DateTime<Utc>,
    },
    /// Submitting; `attempt` is 1-based.
    Submitting {
        /// The turn being closed.
        turn: u32,
        /// Current attempt.
        attempt: u32,
    },
    /// The turn is closed for this participant.
    Submitted {
        /// The closed turn.
        turn: u32,
    },
    /// The timeout submission gave up.
    Failed {
        /// The turn that could not be closed.
        turn: u32,
        /// The last error.
        message: String,
    },
}

/// One participant's live seat in a room.
pub struct ParticipantSession {
    room_id: Uuid,
    name: String,
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    policy: AutoSubmitPolicy,
    draft: Arc<Mutex<String>>,
    state: Arc<watch::Sender<AutoSubmitState>>,
    observed_turn: u32,
    timer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ParticipantSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantSession")
            .field("room_id", &self.room_id)
            .field("name", &self.name)
            .field("observed_turn", &self.observed_turn)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ParticipantSession {
    /// Opens a session for `name` in `room_id`. Nothing is armed until the
    /// first `observe`.
    #[must_use]
    pub fn new(
        room_id: Uuid,
        name: impl Into<String>,
        repo: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        policy: AutoSubmitPolicy,
    ) -> Self {
        let (state, _) = watch::channel(AutoSubmitState::Idle);
        Self {
            room_id,
            name: name.into(),
            repo,
            clock,
            policy,
            draft: Arc::new(Mutex::new(String::new())),
            state: Arc::new(state),
            observed_turn: 0,
            timer: None,
        }
    }

    /// Replaces the buffered draft.
    pub fn set_draft(&self, text: impl Into<String>) {
        *lock(&self.draft) = text.into();
    }

    /// The buffered draft.
    #[must_use]
    pub fn draft(&self) -> String {
        lock(&self.draft).clone()
    }

    /// Watches the auto-submit state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<AutoSubmitState> {
        self.state.subscribe()
    }

    /// Brings the session in line with the latest room view: resets on a
    /// turn change, then arms or cancels the timer.
    pub fn observe(&mut self, view: &RoomView) {
        if view.current_turn != self.observed_turn {
            self.cancel();
            // The first observation adopts the room's turn; a draft restored
            // before it belongs to that turn.
            if self.observed_turn != 0 {
                lock(&self.draft).clear();
            }
            self.observed_turn = view.current_turn;
            self.state.send_replace(AutoSubmitState::Idle);
        }

        let owes_contribution = view
            .participant(&self.name)
            .is_some_and(|p| p.active && !p.has_contributed);
        let deadline = match view.deadline {
            Some(deadline) if view.status == RoomStatus::InProgress && owes_contribution => {
                deadline
            }
            _ => {
                self.cancel();
                self.state.send_if_modified(|state| {
                    if matches!(state, AutoSubmitState::Armed { .. }) {
                        *state = AutoSubmitState::Idle;
                        true
                    } else {
                        false
                    }
                });
                return;
            }
        };

        if self.timer.as_ref().is_some_and(|timer| !timer.is_finished()) {
            return;
        }
        let turn = view.current_turn;
        if matches!(
            &*self.state.borrow(),
            AutoSubmitState::Submitted { turn: t } | AutoSubmitState::Failed { turn: t, .. } if *t == turn
        ) {
            return;
        }
        self.arm(turn, deadline);
    }

    /// Submits the buffered draft for the observed turn and stops the timer.
    ///
    /// # Errors
    ///
    /// Returns the command handler's error; the timer keeps running then.
    pub async fn submit(&mut self) -> Result<RoomCommandResult<SubmitOutcome>, DomainError> {
        let command = SubmitContribution {
            correlation_id: Uuid::new_v4(),
            room_id: self.room_id,
            name: self.name.clone(),
            turn: self.observed_turn,
            text: self.draft(),
            source: ContributionSource::Explicit,
        };
        let result =
            handle_submit_contribution(&command, self.clock.as_ref(), self.repo.as_ref()).await?;
        self.cancel();
        self.state.send_replace(AutoSubmitState::Submitted {
            turn: self.observed_turn,
        });
        Ok(result)
    }

    fn arm(&mut self, turn: u32, deadline: DateTime<Utc>) {
        self.state
            .send_replace(AutoSubmitState::Armed { turn, deadline });
        let task = AutoSubmitTask {
            room_id: self.room_id,
            name: self.name.clone(),
            turn,
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
            draft: Arc::clone(&self.draft),
            state: Arc::clone(&self.state),
        };
        let wait = self.clock.remaining_until(deadline);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            task.run().await;
        }));
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ParticipantSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(draft: &Mutex<String>) -> std::sync::MutexGuard<'_, String> {
    draft.lock().unwrap_or_else(PoisonError::into_inner)
}

struct AutoSubmitTask {
    room_id: Uuid,
    name: String,
    turn: u32,
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    policy: AutoSubmitPolicy,
    draft: Arc<Mutex<String>>,
    state: Arc<watch::Sender<AutoSubmitState>>,
}

impl AutoSubmitTask {
    async fn run(self) {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.state.send_replace(AutoSubmitState::Submitting {
                turn: self.turn,
                attempt,
            });
            let command = SubmitContribution {
                correlation_id: Uuid::new_v4(),
                room_id: self.room_id,
                name: self.name.clone(),
                turn: self.turn,
                text: lock(&self.draft).clone(),
                source: ContributionSource::Timeout,
            };

            match handle_submit_contribution(&command, self.clock.as_ref(), self.repo.as_ref())
                .await
            {
                Ok(result) => {
                    info!(
                        room_id = %self.room_id,
                        name = %self.name,
                        turn = self.turn,
                        outcome = ?result.outcome,
                        "auto-submitted contribution"
                    );
                    self.state
                        .send_replace(AutoSubmitState::Submitted { turn: self.turn });
                    return;
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        room_id = %self.room_id,
                        name = %self.name,
                        turn = self.turn,
                        attempt,
                        error = %e,
                        "auto-submit failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        room_id = %self.room_id,
                        name = %self.name,
                        turn = self.turn,
                        attempt,
                        error = %e,
                        "auto-submit gave up"
                    );
                    self.state.send_replace(AutoSubmitState::Failed {
                        turn: self.turn,
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }
    }
}
