//! Core types and shared functionality for waystation.
//!
//! This crate provides:
//! - Versioned response buckets with a SQLite backend
//! - Request/response values shared by the worker and the network
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheDb, CachedEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{FetchRequest, FetchResponse, Method, RequestMode, ResponseType};
