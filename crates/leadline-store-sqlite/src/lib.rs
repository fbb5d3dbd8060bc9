//! SQLite backend for the Leadline stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every mutation runs inside one
//! SQLite transaction on that thread, which is what makes each store
//! operation atomic and serialises writes to the same owner or pair.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
