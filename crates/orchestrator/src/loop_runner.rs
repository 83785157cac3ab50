//! The self-refining orchestration loop.
//!
//! One run drives one task through
//! `INIT → ITERATING ⇄ AWAITING_USER → DRAINING_QUEUE → DONE`:
//!
//! 1. Each pass sends `(system_prompt, refined_input)` to the primary provider
//! 2. The reply's monologue feeds memory and refines the system prompt
//! 3. The raw reply becomes the next pass's input
//! 4. `<wizard_task>` sections queue up and are sent to the delegate provider
//!    in one batch after the last pass
//! 5. The accumulated text is parsed into the final [`StructuredResult`]

use crate::delegation::DelegationQueue;
use crate::interaction::{NoInteraction, UserInteraction};
use crate::memory::MemoryStore;
use crate::parser::{self, ParsedReply};
use crate::prompts::{DELEGATE_ROLE_PROMPT, PRIMARY_ROLE_PROMPT};
use crate::rate_limiter::RateLimiter;
use crate::refiner;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use siloed_config::AppConfig;
use siloed_core::event::{DomainEvent, EventBus};
use siloed_core::provider::{GenerateRequest, Provider, estimate_tokens};
use siloed_core::task::{DelegationOutcome, DelegationRequest, Iteration, Task, TaskId};
use siloed_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Iterating,
    AwaitingUser,
    DrainingQueue,
    Done,
}

/// Predicate checked after every pass; `true` ends ITERATING early.
pub type EarlyStop = Arc<dyn Fn(&ParsedReply) -> bool + Send + Sync>;

/// Per-run knobs, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub delegate_model: String,
    pub delegate_temperature: f32,
    pub delegate_max_tokens: u32,
    pub max_iterations: usize,
    /// Pause after every N passes (0 disables)
    pub delay_after_requests: usize,
    pub delay: Duration,
    pub answer_timeout: Duration,
    pub short_memory_capacity: usize,
    pub system_prompt: String,
    pub delegate_prompt: String,
    /// Fixed RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let o = &config.orchestrator;
        Self {
            model: config.primary.model.clone(),
            temperature: config.primary.temperature,
            max_tokens: config.primary.max_tokens,
            delegate_model: config.delegate.model.clone(),
            delegate_temperature: config.delegate.temperature,
            delegate_max_tokens: config.delegate.max_tokens,
            max_iterations: o.max_iterations,
            delay_after_requests: o.delay_after_requests,
            delay: Duration::from_secs(o.delay_secs),
            answer_timeout: Duration::from_secs(o.answer_timeout_secs),
            short_memory_capacity: o.short_memory_capacity,
            system_prompt: o
                .system_prompt
                .clone()
                .unwrap_or_else(|| PRIMARY_ROLE_PROMPT.to_string()),
            delegate_prompt: o
                .delegate_prompt
                .clone()
                .unwrap_or_else(|| DELEGATE_ROLE_PROMPT.to_string()),
            seed: o.seed,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Runs one task end to end.
pub struct OrchestrationLoop {
    primary: Arc<dyn Provider>,
    delegate: Arc<dyn Provider>,
    limiter: Arc<RateLimiter>,
    settings: LoopSettings,
    interaction: Arc<dyn UserInteraction>,
    event_bus: Arc<EventBus>,
    early_stop: Option<EarlyStop>,
    state: watch::Sender<LoopState>,
}

impl OrchestrationLoop {
    pub fn new(
        primary: Arc<dyn Provider>,
        delegate: Arc<dyn Provider>,
        limiter: Arc<RateLimiter>,
        settings: LoopSettings,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Init);
        Self {
            primary,
            delegate,
            limiter,
            settings,
            interaction: Arc::new(NoInteraction),
            event_bus: Arc::new(EventBus::default()),
            early_stop: None,
            state,
        }
    }

    pub fn with_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_early_stop(mut self, early_stop: EarlyStop) -> Self {
        self.early_stop = Some(early_stop);
        self
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions as they happen.
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    fn transition(&self, task_id: &TaskId, next: LoopState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(task_id = %task_id, from = ?prev, to = ?next, "Loop state");
        }
    }

    /// Run a task to completion.
    ///
    /// Fails with [`Error::Provider`] when any provider call fails and with
    /// [`Error::Cancelled`] when `cancel` fires.
    pub async fn run(
        &self,
        task_id: TaskId,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<Task> {
        // ── INIT ──
        self.transition(&task_id, LoopState::Init);
        let mut task = Task::new(task_id, user_input);
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut memory = MemoryStore::with_capacity(self.settings.short_memory_capacity);
        let mut queue = DelegationQueue::new();
        let mut system_prompt = self.settings.system_prompt.clone();
        let mut refined_input = user_input.to_string();
        let max = self.settings.max_iterations;

        info!(
            task_id = %task.id,
            max_iterations = max,
            provider = %self.primary.name(),
            "Task started"
        );
        self.event_bus.publish(DomainEvent::TaskStarted {
            task_id: task.id.to_string(),
            timestamp: Utc::now(),
        });

        // ── ITERATING ──
        self.transition(&task.id, LoopState::Iterating);
        for i in 0..max {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(task.id));
            }

            let estimate = estimate_tokens(&system_prompt)
                + estimate_tokens(&refined_input)
                + u64::from(self.settings.max_tokens);
            let grant = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled(task.id)),
                grant = self.limiter.acquire(estimate) => grant,
            };

            let request = GenerateRequest::new(
                &self.settings.model,
                system_prompt.clone(),
                refined_input.clone(),
            )
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled(task.id)),
                r = self.primary.generate(request) => r?,
            };
            self.limiter
                .record_usage(grant, response.total_tokens())
                .await;

            let parsed = parser::parse(&response.text);
            let monologue = parsed.internal_monologue.clone();
            memory.append(monologue.clone());
            queue.extend(parsed.wizard_tasks.iter().map(DelegationRequest::new));

            let prompt_used = std::mem::take(&mut system_prompt);
            system_prompt = refiner::refine(&prompt_used, &monologue, &memory, &mut rng);

            let mut iteration = Iteration {
                index: i,
                system_prompt_used: prompt_used,
                model_reply_raw: response.text.clone(),
                extracted_monologue: monologue,
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                user_answer: None,
            };
            refined_input = response.text;

            debug!(
                task_id = %task.id,
                pass = i + 1,
                input_tokens = iteration.input_tokens,
                output_tokens = iteration.output_tokens,
                queued = queue.len(),
                "Pass complete"
            );

            if parsed.has_questions() && (i + 1 == max / 2 || i + 1 == max) {
                iteration.user_answer = self
                    .await_user(&task.id, &parsed.questions_for_user, cancel)
                    .await?;
                self.transition(&task.id, LoopState::Iterating);
            }

            self.event_bus.publish(DomainEvent::IterationCompleted {
                task_id: task.id.to_string(),
                index: i,
                input_tokens: iteration.input_tokens,
                output_tokens: iteration.output_tokens,
                monologue_preview: iteration.extracted_monologue.chars().take(80).collect(),
                timestamp: Utc::now(),
            });
            task.push_iteration(iteration);

            let every = self.settings.delay_after_requests;
            if every > 0 && (i + 1) % every == 0 && !self.settings.delay.is_zero() {
                info!(
                    task_id = %task.id,
                    passes = i + 1,
                    delay_secs = self.settings.delay.as_secs(),
                    "Periodic pause"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled(task.id)),
                    _ = tokio::time::sleep(self.settings.delay) => {}
                }
            }

            if let Some(stop) = &self.early_stop {
                if stop(&parsed) {
                    info!(task_id = %task.id, passes = i + 1, "Early stop");
                    break;
                }
            }
        }

        // ── DRAINING_QUEUE ──
        self.transition(&task.id, LoopState::DrainingQueue);
        let requests = queue.drain_all();
        let total = requests.len();
        if total > 0 {
            info!(task_id = %task.id, count = total, "Processing delegated tasks");
        }

        for (position, request) in requests.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(task.id));
            }

            let delegate_request = GenerateRequest::new(
                &self.settings.delegate_model,
                self.settings.delegate_prompt.clone(),
                request.task_text.clone(),
            )
            .with_temperature(self.settings.delegate_temperature)
            .with_max_tokens(self.settings.delegate_max_tokens);

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled(task.id)),
                r = self.delegate.generate(delegate_request) => r?,
            };
            self.limiter.record_tokens(response.total_tokens()).await;

            refined_input.push_str("\nWizard response: ");
            refined_input.push_str(&response.text);

            task.push_delegation(DelegationOutcome {
                request,
                parsed: parser::parse_delegate(&response.text),
                reply_raw: response.text,
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
            });

            self.event_bus.publish(DomainEvent::DelegationCompleted {
                task_id: task.id.to_string(),
                position: position + 1,
                remaining: total - position - 1,
                timestamp: Utc::now(),
            });
        }

        // ── DONE ──
        self.transition(&task.id, LoopState::Done);
        task.finish(parser::parse(&refined_input).to_result());

        info!(
            task_id = %task.id,
            iterations = task.iterations.len(),
            delegations = task.delegations.len(),
            total_tokens = task.total_tokens(),
            "Task completed"
        );
        self.event_bus.publish(DomainEvent::TaskCompleted {
            task_id: task.id.to_string(),
            iterations: task.iterations.len(),
            total_tokens: task.total_tokens(),
            timestamp: Utc::now(),
        });

        Ok(task)
    }

    /// AWAITING_USER: present questions and wait for an optional answer.
    async fn await_user(
        &self,
        task_id: &TaskId,
        questions: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        self.transition(task_id, LoopState::AwaitingUser);
        info!(task_id = %task_id, count = questions.len(), "Waiting for user answer");
        self.event_bus.publish(DomainEvent::AwaitingUser {
            task_id: task_id.to_string(),
            questions: questions.to_vec(),
            timestamp: Utc::now(),
        });

        let ask = tokio::time::timeout(
            self.settings.answer_timeout,
            self.interaction.ask(task_id, questions),
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                self.interaction.withdraw(task_id);
                Err(Error::Cancelled(task_id.clone()))
            }
            outcome = ask => match outcome {
                Ok(answer) => Ok(answer),
                Err(_) => {
                    self.interaction.withdraw(task_id);
                    info!(
                        task_id = %task_id,
                        timeout_secs = self.settings.answer_timeout.as_secs(),
                        "No answer in time, continuing"
                    );
                    Ok(None)
                }
            },
        }
    }
}
