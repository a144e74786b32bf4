//! Storage abstraction for the Cairn anchor subsystem.
//!
//! Provides a [`KvStore`](traits::KvStore) trait with memory and SQLite
//! backends, plus [`AnchorStore`](anchor_store::AnchorStore) which persists
//! the anchor engine's state under prefixed keys.

pub mod anchor_store;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;
