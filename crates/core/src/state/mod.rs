//! Persistence for batch state and conversion history.

mod sqlite;
mod store;

pub use sqlite::SqliteStateStore;
pub use store::{StateError, StateStore};
