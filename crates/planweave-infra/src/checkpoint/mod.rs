//! Durable checkpoint stores.

pub mod sqlite;

pub use sqlite::SqliteCheckpointStore;
