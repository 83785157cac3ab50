//! Task domain types.
//!
//! A client submits text → a Task is created → the orchestration loop appends
//! one Iteration per pass → delegations are processed → the Task is closed
//! with a StructuredResult and persisted as a TaskRecord.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user-facing result of a finished task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub response_to_user: String,
    pub questions_for_user: Vec<String>,
    pub tasks: Vec<String>,
}

/// One pass of the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 0-based pass index
    pub index: usize,

    /// The system prompt sent on this pass (before refinement)
    pub system_prompt_used: String,

    /// The raw reply text
    pub model_reply_raw: String,

    /// Text between the monologue tags, empty when absent
    pub extracted_monologue: String,

    pub input_tokens: u32,
    pub output_tokens: u32,

    /// Answer given while the loop was awaiting the user on this pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<String>,
}

/// A sub-task bound for the delegate provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub task_text: String,
}

impl DelegationRequest {
    pub fn new(task_text: impl Into<String>) -> Self {
        Self {
            task_text: task_text.into(),
        }
    }
}

/// Sections of a delegate reply. Missing sections are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateReply {
    pub wizard_response: String,
    pub code: String,
    pub explanation: String,
}

/// What came back from processing one delegation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationOutcome {
    pub request: DelegationRequest,
    pub reply_raw: String,
    pub parsed: DelegateReply,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A task owned by one orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_input: String,
    pub iterations: Vec<Iteration>,
    pub delegations: Vec<DelegationOutcome>,
    pub final_result: StructuredResult,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task with no passes yet.
    pub fn new(id: TaskId, user_input: impl Into<String>) -> Self {
        Self {
            id,
            user_input: user_input.into(),
            iterations: Vec::new(),
            delegations: Vec::new(),
            final_result: StructuredResult::default(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a completed pass and add its usage to the running totals.
    pub fn push_iteration(&mut self, iteration: Iteration) {
        self.total_input_tokens += u64::from(iteration.input_tokens);
        self.total_output_tokens += u64::from(iteration.output_tokens);
        self.iterations.push(iteration);
    }

    /// Append a processed delegation and add its usage to the running totals.
    pub fn push_delegation(&mut self, outcome: DelegationOutcome) {
        self.total_input_tokens += u64::from(outcome.input_tokens);
        self.total_output_tokens += u64::from(outcome.output_tokens);
        self.delegations.push(outcome);
    }

    /// Close the task. A finished task is not mutated further.
    pub fn finish(&mut self, result: StructuredResult) {
        self.final_result = result;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

/// The persisted form of a finished task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub user_input: String,
    pub final_response: StructuredResult,
    #[serde(default)]
    pub iterations: Vec<Iteration>,
    #[serde(default)]
    pub delegations: Vec<DelegationOutcome>,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            user_input: task.user_input.clone(),
            final_response: task.final_result.clone(),
            iterations: task.iterations.clone(),
            delegations: task.delegations.clone(),
            total_input_tokens: task.total_input_tokens,
            total_output_tokens: task.total_output_tokens,
            created_at: task.created_at,
            finished_at: task.finished_at,
        }
    }
}
