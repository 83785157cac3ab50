//! # Siloed Core
//!
//! Domain types, traits, and error definitions for the Siloed orchestrator.
//! This crate has **no framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! Every external collaborator (text-generation backends, record storage) is
//! a trait here. Implementations live in their own crates, so tests can swap
//! in scripted providers and in-memory stores.

pub mod error;
pub mod event;
pub mod provider;
pub mod store;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use event::{DomainEvent, EventBus, QuotaKind};
pub use provider::{GenerateRequest, GenerateResponse, Provider, estimate_tokens};
pub use store::TaskStore;
pub use task::{
    DelegateReply, DelegationOutcome, DelegationRequest, Iteration, StructuredResult, Task,
    TaskId, TaskRecord,
};
