//! outpost - Multi-tenant email synchronization and threading engine
//!
//! This crate provides the core functionality for the outpost sync
//! service: encrypted credential storage, Gmail and IMAP/SMTP provider
//! adapters, message normalization, conversation threading, two-tier
//! deduplication, warmup traffic filtering, and the scheduled sync
//! fan-out across connected accounts.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod providers;
pub mod storage;
pub mod sync;

pub use config::Settings;
pub use crypto::CredentialVault;
pub use storage::Database;
pub use sync::SyncOrchestrator;
