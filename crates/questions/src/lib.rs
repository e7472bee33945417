//! Question Channel (C2): holds at most one pending multiple-choice
//! question raised by a tool, and blocks the raising caller until the UI
//! delivers an answer, a timeout elapses, or the run is cancelled.
//!
//! Grounded on `sa_gateway::runtime::approval::ApprovalStore` — a
//! `oneshot`-backed pending-request store resolved by an out-of-band
//! caller — generalized from "exactly the approve/deny decisions" to
//! arbitrary multiple-choice answers, and restricted to a single pending
//! slot (spec §4.2's "exactly one question may be pending" invariant,
//! where the teacher's store allows any number of concurrent approvals).

use std::time::Duration;

use ac_domain::cancel::CancelToken;
use ac_domain::error::{CoreError, Result};
use ac_domain::tool::{PendingQuestion, QuestionAnswer, QuestionOption};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Construction-time cap on the number of options a question may offer.
/// Grounded on spec §4.2's "construction-time cap (e.g. 5)".
pub const DEFAULT_MAX_OPTIONS: usize = 5;

struct Slot {
    question: PendingQuestion,
    respond: oneshot::Sender<QuestionAnswer>,
}

/// Thread-safe single-slot question channel.
pub struct QuestionChannel {
    max_options: usize,
    slot: Mutex<Option<Slot>>,
}

impl QuestionChannel {
    pub fn new(max_options: usize) -> Self {
        Self {
            max_options,
            slot: Mutex::new(None),
        }
    }

    /// Raise a question and block until it is answered, times out, or the
    /// run is cancelled. Exceeding `max_options` is a programming error,
    /// reported back to the caller rather than silently truncated.
    pub async fn raise(
        &self,
        cancel: &CancelToken,
        question: impl Into<String>,
        options: Vec<QuestionOption>,
        timeout: Duration,
    ) -> Result<QuestionAnswer> {
        if options.len() > self.max_options {
            return Err(CoreError::ConfigInvalid(format!(
                "question offers {} options, exceeding the cap of {}",
                options.len(),
                self.max_options
            )));
        }

        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let pending = PendingQuestion {
            id: id.clone(),
            question: question.into(),
            options,
            created_at: now,
            deadline: now + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(0)),
        };

        {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Err(CoreError::QuestionBusy);
            }
            *slot = Some(Slot { question: pending, respond: tx });
        }

        let result = tokio::select! {
            answer = rx => answer.map_err(|_| CoreError::QuestionCancelled),
            _ = tokio::time::sleep(timeout) => Err(CoreError::QuestionTimeout),
            _ = cancel.cancelled() => Err(CoreError::QuestionCancelled),
        };

        self.clear_if_matches(&id);
        result
    }

    fn clear_if_matches(&self, id: &str) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.question.id.as_str()) == Some(id) {
            *slot = None;
        }
    }

    /// Whether a question is currently pending.
    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// A copy of the pending question, if any.
    pub fn peek(&self) -> Option<PendingQuestion> {
        self.slot.lock().as_ref().map(|s| s.question.clone())
    }

    /// Submit an answer to the pending question. Fails if `id` doesn't
    /// match (or nothing is pending).
    pub fn submit(&self, id: &str, answer: QuestionAnswer) -> SubmitOutcome {
        let mut slot = self.slot.lock();
        match slot.take() {
            None => SubmitOutcome::NoPending,
            Some(pending) if pending.question.id != id => {
                *slot = Some(pending);
                SubmitOutcome::WrongId
            }
            Some(pending) => {
                let _ = pending.respond.send(answer);
                SubmitOutcome::Ok
            }
        }
    }
}

impl Default for QuestionChannel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPTIONS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ok,
    WrongId,
    NoPending,
}
