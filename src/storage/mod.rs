//! Storage Layer Module
//!
//! Provides persistence for the withdrawal queue.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;
pub use traits::{QueueSnapshot, QueueStore, StorageError, StorageResult};
