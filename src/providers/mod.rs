//! Provider implementations for external services.
//!
//! - [`email`] - Mail providers (Gmail REST API, IMAP/SMTP)

pub mod email;
