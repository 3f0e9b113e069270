//! SQLite persistence layer.
//!
//! - [`database`] - Connection wrapper with async access helpers
//! - [`schema`] - Table definitions and migrations
//! - [`queries`] - Query functions organized by entity

pub mod database;
pub mod queries;
pub mod schema;

pub use database::{Database, DatabaseError, Result};
