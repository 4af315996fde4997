//! SQLite backend for the permit store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. That thread also serialises every
//! statement, which the reference allocator relies on together with an
//! immediate transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, SqliteStore};
