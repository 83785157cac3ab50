//! Domain event system: decoupled progress reporting.
//!
//! Events are published as a task moves through the orchestration loop.
//! The CLI prints them; tests subscribe to assert on loop behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Which quota forced a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Requests,
    Tokens,
    Cooldown,
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A task was accepted and its loop started
    TaskStarted {
        task_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One loop pass finished
    IterationCompleted {
        task_id: String,
        index: usize,
        input_tokens: u32,
        output_tokens: u32,
        monologue_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The rate limiter suspended a caller
    QuotaWait {
        kind: QuotaKind,
        wait_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop is waiting for a human answer
    AwaitingUser {
        task_id: String,
        questions: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A delegated sub-task came back from the delegate provider
    DelegationCompleted {
        task_id: String,
        position: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// The task reached DONE
    TaskCompleted {
        task_id: String,
        iterations: usize,
        total_tokens: u64,
        timestamp: DateTime<Utc>,
    },

    /// The task aborted
    TaskFailed {
        task_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
