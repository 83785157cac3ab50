//! Human-in-the-loop seam for the AWAITING_USER state.
//!
//! The loop hands questions to a [`UserInteraction`] and waits, bounded by a
//! timeout, for an optional answer. Headless runs use [`NoInteraction`]; the
//! HTTP gateway uses [`AnswerBoard`], where answers arrive on a later request.

use async_trait::async_trait;
use siloed_core::task::TaskId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Present `questions` and wait for an answer. `None` means skipped.
    async fn ask(&self, task_id: &TaskId, questions: &[String]) -> Option<String>;

    /// Called when the loop stops waiting (timeout or cancellation).
    fn withdraw(&self, _task_id: &TaskId) {}
}

/// Never answers. Questions are skipped immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInteraction;

#[async_trait]
impl UserInteraction for NoInteraction {
    async fn ask(&self, _task_id: &TaskId, _questions: &[String]) -> Option<String> {
        None
    }
}

struct PendingQuestions {
    questions: Vec<String>,
    reply: oneshot::Sender<String>,
}

/// Open questions keyed by task, answered out of band.
#[derive(Default)]
pub struct AnswerBoard {
    pending: Mutex<HashMap<TaskId, PendingQuestions>>,
}

impl AnswerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, PendingQuestions>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Questions a task is currently waiting on.
    pub fn pending(&self, task_id: &TaskId) -> Option<Vec<String>> {
        self.lock().get(task_id).map(|p| p.questions.clone())
    }

    /// Deliver an answer. Returns false when the task is not waiting.
    pub fn answer(&self, task_id: &TaskId, answer: impl Into<String>) -> bool {
        match self.lock().remove(task_id) {
            Some(pending) => pending.reply.send(answer.into()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl UserInteraction for AnswerBoard {
    async fn ask(&self, task_id: &TaskId, questions: &[String]) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.lock().insert(
            task_id.clone(),
            PendingQuestions {
                questions: questions.to_vec(),
                reply,
            },
        );
        debug!(task_id = %task_id, count = questions.len(), "Questions posted");
        rx.await.ok()
    }

    fn withdraw(&self, task_id: &TaskId) {
        if self.lock().remove(task_id).is_some() {
            debug!(task_id = %task_id, "Questions withdrawn");
        }
    }
}
