//! Configuration and settings management.
//!
//! Settings are stored in the service's config directory as JSON.

mod settings;

pub use settings::{ConfigError, Settings, SyncSettings};
