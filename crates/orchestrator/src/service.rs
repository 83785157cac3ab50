//! Task submission service.
//!
//! The [`Orchestrator`] owns everything shared between tasks: both providers,
//! the process-wide rate limiter, the record store, and the registry of running
//! tasks with their cancellation tokens. Each submission gets its own
//! [`OrchestrationLoop`] with fresh memory and queue.

use crate::interaction::{NoInteraction, UserInteraction};
use crate::loop_runner::{EarlyStop, LoopSettings, OrchestrationLoop};
use crate::rate_limiter::RateLimiter;
use chrono::Utc;
use siloed_core::event::{DomainEvent, EventBus};
use siloed_core::provider::Provider;
use siloed_core::store::TaskStore;
use siloed_core::task::{StructuredResult, Task, TaskId, TaskRecord};
use siloed_core::{Error, Result};
use siloed_store::InMemoryTaskStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type Registry = Mutex<HashMap<TaskId, CancellationToken>>;

pub struct Orchestrator {
    primary: Arc<dyn Provider>,
    delegate: Arc<dyn Provider>,
    limiter: Arc<RateLimiter>,
    settings: LoopSettings,
    store: Arc<dyn TaskStore>,
    interaction: Arc<dyn UserInteraction>,
    event_bus: Arc<EventBus>,
    early_stop: Option<EarlyStop>,
    active: Arc<Registry>,
}

/// Removes a task from the registry however its submission ends,
/// including when the submitting future is dropped.
struct ActiveGuard {
    registry: Arc<Registry>,
    task_id: TaskId,
    token: CancellationToken,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.task_id);
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn Provider>,
        delegate: Arc<dyn Provider>,
        limiter: Arc<RateLimiter>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            primary,
            delegate,
            limiter,
            settings,
            store: Arc::new(InMemoryTaskStore::new()),
            interaction: Arc::new(NoInteraction),
            event_bus: Arc::new(EventBus::default()),
            early_stop: None,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Make prompt refinement reproducible across runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.settings.seed = Some(seed);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.settings.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_early_stop(mut self, early_stop: EarlyStop) -> Self {
        self.early_stop = Some(early_stop);
        self
    }

    /// Run a task and return its user-facing result.
    pub async fn submit(&self, task_id: TaskId, user_input: &str) -> Result<StructuredResult> {
        self.submit_task(task_id, user_input)
            .await
            .map(|task| task.final_result)
    }

    /// Run a task, persist its record, and return the whole task.
    ///
    /// Failed or cancelled tasks are not persisted. A record that cannot be
    /// saved fails the task like any other error.
    pub async fn submit_task(&self, task_id: TaskId, user_input: &str) -> Result<Task> {
        let guard = self.register(&task_id)?;
        let lp = self.build_loop();

        let outcome = match lp.run(task_id.clone(), user_input, &guard.token).await {
            Ok(task) => match self.store.save(&TaskRecord::from(&task)).await {
                Ok(()) => Ok(task),
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(task_id = %task_id, error = %e, "Task failed");
            self.event_bus.publish(DomainEvent::TaskFailed {
                task_id: task_id.to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        outcome
    }

    /// Cancel a running task. Returns false when no such task is running.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match lock(&self.active).get(task_id) {
            Some(token) => {
                info!(task_id = %task_id, "Cancelling task");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// IDs of running tasks, sorted.
    pub fn active_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn history(&self) -> Result<Vec<TaskId>> {
        Ok(self.store.list().await?)
    }

    pub async fn record(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.store.get(task_id).await?)
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    fn register(&self, task_id: &TaskId) -> Result<ActiveGuard> {
        let mut active = lock(&self.active);
        if active.contains_key(task_id) {
            return Err(Error::TaskAlreadyRunning(task_id.clone()));
        }
        let token = CancellationToken::new();
        active.insert(task_id.clone(), token.clone());
        Ok(ActiveGuard {
            registry: self.active.clone(),
            task_id: task_id.clone(),
            token,
        })
    }

    fn build_loop(&self) -> OrchestrationLoop {
        let lp = OrchestrationLoop::new(
            self.primary.clone(),
            self.delegate.clone(),
            self.limiter.clone(),
            self.settings.clone(),
        )
        .with_interaction(self.interaction.clone())
        .with_event_bus(self.event_bus.clone());

        match &self.early_stop {
            Some(stop) => lp.with_early_stop(stop.clone()),
            None => lp,
        }
    }
}
