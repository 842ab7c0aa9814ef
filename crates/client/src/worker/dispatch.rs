//! Explicit event dispatch.
//!
//! Handlers are registered per [`EventKind`] and invoked with the event
//! value; nothing depends on a particular runtime's callback API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waystation_core::{Error, FetchRequest};

use super::intercept::Interception;
use super::notify::{Notification, NotificationClick, PushMessage};

/// Events a worker reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(FetchRequest),
    Push(PushMessage),
    NotificationClick(NotificationClick),
    Sync(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::Activate => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Push(_) => EventKind::Push,
            Event::NotificationClick(_) => EventKind::NotificationClick,
            Event::Sync(_) => EventKind::Sync,
        }
    }
}

/// Key under which handlers are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
    Sync,
}

/// What handling an event produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Installed { bucket: String, cached: usize },
    Activated { bucket: String, deleted: Vec<String> },
    Fetched(Interception),
    Notify(Notification),
    OpenWindow { url: String },
    Synced { tag: String, recognized: bool },
    /// No handler registered for the event kind, or the handler declined it.
    Unhandled,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<Outcome, Error>;
}

/// Routes events to the handler registered for their kind.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, returning the handler it replaces.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(kind, handler)
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub async fn dispatch(&self, event: Event) -> Result<Outcome, Error> {
        let kind = event.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler.handle(event).await,
            None => {
                tracing::debug!(?kind, "no handler registered");
                Ok(Outcome::Unhandled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        async fn handle(&self, event: Event) -> Result<Outcome, Error> {
            match event {
                Event::Sync(tag) => Ok(Outcome::Synced { tag, recognized: true }),
                _ => Ok(Outcome::Unhandled),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_handler() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventKind::Sync, Arc::new(Echo));

        let outcome = dispatcher.dispatch(Event::Sync("sync-leads".into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { tag, recognized: true } if tag == "sync-leads"));
    }

    #[tokio::test]
    async fn test_dispatch_without_handler() {
        let dispatcher = Dispatcher::new();
        let outcome = dispatcher.dispatch(Event::Install).await.unwrap();
        assert!(matches!(outcome, Outcome::Unhandled));
        assert!(!dispatcher.handles(EventKind::Install));
    }

    #[test]
    fn test_register_replaces() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.register(EventKind::Push, Arc::new(Echo)).is_none());
        assert!(dispatcher.register(EventKind::Push, Arc::new(Echo)).is_some());
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(Event::Fetch(FetchRequest::get("/")).kind(), EventKind::Fetch);
        assert_eq!(Event::Sync("x".into()).kind(), EventKind::Sync);
    }
}
