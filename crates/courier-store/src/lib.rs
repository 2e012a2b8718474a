//! # courier-store
//!
//! Durable storage for courier, backed by SQLite.
//!
//! Two collaborators live here: the relationship store (users, friendships,
//! groups, memberships) and the append-and-query message log. The crate
//! exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model.
//! Every lookup filters soft-deleted rows.

pub mod database;
pub mod friendships;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
