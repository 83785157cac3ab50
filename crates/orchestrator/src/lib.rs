//! # Siloed Orchestrator
//!
//! Drives a primary model through repeated self-refining passes, routes
//! `<wizard_task>` sub-tasks to a delegate model, and composes a structured
//! result for the user.
//!
//! Building blocks, bottom-up:
//! - [`RateLimiter`]: process-wide request/token quota shared by all tasks
//! - [`MemoryStore`]: per-task long/short monologue memory
//! - [`parser`]: tag extraction from replies
//! - [`refiner`]: system prompt refinement
//! - [`DelegationQueue`]: FIFO of delegated sub-tasks
//! - [`OrchestrationLoop`]: the per-task state machine
//! - [`Orchestrator`]: submission, cancellation, and persistence

pub mod delegation;
pub mod interaction;
pub mod loop_runner;
pub mod memory;
pub mod parser;
pub mod prompts;
pub mod rate_limiter;
pub mod refiner;
pub mod service;

#[cfg(test)]
mod test_helpers;

pub use delegation::DelegationQueue;
pub use interaction::{AnswerBoard, NoInteraction, UserInteraction};
pub use loop_runner::{EarlyStop, LoopSettings, LoopState, OrchestrationLoop};
pub use memory::MemoryStore;
pub use parser::{ParsedReply, Tag};
pub use rate_limiter::{RateLimitSnapshot, RateLimiter, UsageGrant};
pub use service::Orchestrator;
