//! Synchronization engine.
//!
//! The pipeline stages, in order of a message's journey:
//!
//! - [`normalize`] - Header parsing and RFC 5322 normalization
//! - [`threading`] - Conversation thread resolution
//! - [`dedup`] - Two-tier duplicate suppression
//! - [`warmup`] - Warmup traffic classification
//! - [`worker`] - Per-account sync runs
//! - [`orchestrator`] - Scheduled fan-out across accounts

pub mod dedup;
pub mod normalize;
pub mod orchestrator;
pub mod threading;
pub mod warmup;
pub mod worker;

pub use orchestrator::{DefaultProviderFactory, ProviderFactory, SyncOrchestrator, SyncSummary};
pub use worker::{SyncError, SyncOutcome};
