//! Query functions organized by entity.

pub mod accounts;
pub mod inboxes;
pub mod messages;
