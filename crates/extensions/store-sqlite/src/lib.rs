//! SQLite job store for hourglass.
//!
//! Provides a persistent [`JobStore`](hourglass_core::JobStore) that several
//! scheduler instances can share through one database file.

mod backend;
mod codec;
mod schema;

pub use backend::SqliteJobStore;
