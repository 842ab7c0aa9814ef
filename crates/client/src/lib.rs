//! Client code for waystation.
//!
//! This crate provides the network seam and its reqwest implementation,
//! the offline worker (cache manager, fetch interceptor, dispatcher,
//! background tasks, notification hooks) and the remote API client.

pub mod api;
pub mod fetch;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiEnvelope, ScriptApi};
pub use fetch::{FetchConfig, HttpNetwork, Network};
pub use worker::{
    BackgroundTasks, CacheManager, Event, EventKind, FetchInterceptor, Interception, Notification, NotificationClick,
    Outcome, PushMessage, Resolution, Source, Strategy, Worker, WorkerState,
};
