//! SQLite persistence for the agentry platform.
//!
//! Exposes the pooled [`connection::DatabaseConnection`] with embedded
//! migrations, the row [`models`], and static [`repositories`] with
//! associated async functions over the shared pool.

pub mod connection;
pub mod models;
pub mod repositories;

pub use connection::{DatabaseConnection, DatabasePool};
