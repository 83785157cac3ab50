//! `siloed run`: Run one task in the terminal.
//!
//! Progress comes from the event bus on stderr; questions are answered on
//! stdin; Ctrl+C cancels the task.

use async_trait::async_trait;
use siloed_core::event::{DomainEvent, EventBus};
use siloed_core::store::TaskStore;
use siloed_core::task::{Task, TaskId};
use siloed_orchestrator::UserInteraction;
use siloed_store::InMemoryTaskStore;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub async fn run(
    config_path: Option<&Path>,
    message: String,
    task_id: Option<String>,
    max_iterations: Option<usize>,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let store: Arc<dyn TaskStore> = if ephemeral {
        Arc::new(InMemoryTaskStore::new())
    } else {
        siloed_store::open(&config.storage.dir)
    };
    let event_bus = Arc::new(EventBus::default());

    let mut orchestrator = siloed_gateway::build_orchestrator(&config, store, event_bus.clone())?
        .with_interaction(Arc::new(StdinInteraction::spawn()));
    if let Some(n) = max_iterations {
        orchestrator = orchestrator.with_max_iterations(n);
    }
    let orchestrator = Arc::new(orchestrator);

    let task_id = task_id.map(TaskId).unwrap_or_default();
    eprintln!(
        "  Task {task_id}: up to {} passes with {} ({})",
        orchestrator.settings().max_iterations,
        config.primary.kind,
        config.primary.model
    );

    let progress = spawn_progress(&event_bus);
    let interrupt = {
        let orchestrator = orchestrator.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling...");
                orchestrator.cancel(&task_id);
            }
        })
    };

    let outcome = orchestrator.submit_task(task_id, &message).await;
    interrupt.abort();
    progress.abort();

    let task = outcome?;
    print_result(&task);
    if !ephemeral {
        eprintln!("  Saved to {}", config.storage.dir.display());
    }

    Ok(())
}

/// Answers questions with lines typed on stdin.
///
/// Lines are read on a plain thread, so a pending read never holds up exit.
pub struct StdinInteraction {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl StdinInteraction {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(8);
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self::from_lines(rx)
    }

    pub fn from_lines(lines: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }
}

#[async_trait]
impl UserInteraction for StdinInteraction {
    async fn ask(&self, _task_id: &TaskId, questions: &[String]) -> Option<String> {
        println!();
        for q in questions {
            println!("  ? {q}");
        }
        print!("  Answer (Enter to skip) > ");
        if let Err(e) = std::io::stdout().flush() {
            warn!(error = %e, "Failed to flush stdout");
        }

        let line = self.lines.lock().await.recv().await?;
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    /// Discard lines typed after the loop stopped waiting, so they cannot
    /// answer the next prompt.
    fn withdraw(&self, _task_id: &TaskId) {
        let Ok(mut lines) = self.lines.try_lock() else {
            return;
        };
        let mut dropped = 0usize;
        while lines.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded late stdin answers");
        }
    }
}

fn spawn_progress(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        eprintln!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("  ... {skipped} progress events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// One progress line per event; `None` for events the terminal shows otherwise.
fn describe(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::IterationCompleted {
            index,
            input_tokens,
            output_tokens,
            monologue_preview,
            ..
        } => {
            let mut line = format!("  [pass {}] {input_tokens} in / {output_tokens} out", index + 1);
            if !monologue_preview.is_empty() {
                line.push_str(&format!("  {monologue_preview}"));
            }
            Some(line)
        }
        DomainEvent::QuotaWait { kind, wait_ms, .. } => Some(format!(
            "  Waiting {:.1}s for {kind:?} quota",
            *wait_ms as f64 / 1000.0
        )),
        DomainEvent::DelegationCompleted {
            position,
            remaining,
            ..
        } => Some(format!(
            "  [delegate] sub-task {position} done, {remaining} remaining"
        )),
        DomainEvent::TaskCompleted {
            iterations,
            total_tokens,
            ..
        } => Some(format!(
            "  Done after {iterations} passes, {total_tokens} tokens"
        )),
        DomainEvent::TaskFailed { error_message, .. } => {
            Some(format!("  [Error] {error_message}"))
        }
        DomainEvent::TaskStarted { .. } | DomainEvent::AwaitingUser { .. } => None,
    }
}

fn print_result(task: &Task) {
    let result = &task.final_result;
    println!();
    println!("{}", result.response_to_user);

    if !result.tasks.is_empty() {
        println!();
        println!("  Tasks:");
        for t in &result.tasks {
            println!("    {t}");
        }
    }

    if !result.questions_for_user.is_empty() {
        println!();
        println!("  Open questions:");
        for q in &result.questions_for_user {
            println!("    {q}");
        }
    }
}
