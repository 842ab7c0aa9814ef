//! SQLite-backed storage for versioned response buckets.
//!
//! This module provides a persistent response cache using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Named buckets, one per deployed cache version
//! - Entries keyed by a SHA-256 digest of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Purge strategies (URL pattern, LRU, whole bucket)

pub mod buckets;
pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use buckets::BucketInfo;
pub use connection::CacheDb;
pub use entries::CachedEntry;
