//! Persistent Storage
//!
//! SQLite-backed job records, append-only event log, and prompt
//! configuration.

pub mod database;

pub use database::{Database, DbPool, JobSink};
