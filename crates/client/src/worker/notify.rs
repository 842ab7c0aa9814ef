//! Push, notification-click and background-sync hooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waystation_core::Error;
use waystation_core::config::NotificationConfig;

use super::dispatch::{Event, EventHandler, Outcome};

const DEFAULT_BODY: &str = "New notification";
const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// Incoming push message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub payload: Option<String>,
}

/// A notification the host should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Opened when the notification is clicked.
    pub url: String,
}

/// A click on a displayed notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub url: Option<String>,
}

pub struct PushHandler {
    config: NotificationConfig,
}

impl PushHandler {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EventHandler for PushHandler {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        let Event::Push(message) = event else {
            return Ok(Outcome::Unhandled);
        };
        let body = message
            .payload
            .filter(|payload| !payload.is_empty())
            .unwrap_or_else(|| DEFAULT_BODY.to_string());

        Ok(Outcome::Notify(Notification {
            title: self.config.title.clone(),
            body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            url: self.config.default_url.clone(),
        }))
    }
}

pub struct NotificationClickHandler {
    default_url: String,
}

impl NotificationClickHandler {
    pub fn new(default_url: impl Into<String>) -> Self {
        Self { default_url: default_url.into() }
    }
}

#[async_trait]
impl EventHandler for NotificationClickHandler {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        let Event::NotificationClick(click) = event else {
            return Ok(Outcome::Unhandled);
        };
        let url = click
            .url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.default_url.clone());
        Ok(Outcome::OpenWindow { url })
    }
}

pub struct SyncHandler {
    tags: Vec<String>,
}

impl SyncHandler {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }
}

#[async_trait]
impl EventHandler for SyncHandler {
    async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        let Event::Sync(tag) = event else {
            return Ok(Outcome::Unhandled);
        };
        let recognized = self.tags.contains(&tag);
        if recognized {
            tracing::info!(%tag, "background sync triggered");
        } else {
            tracing::debug!(%tag, "ignoring unknown sync tag");
        }
        Ok(Outcome::Synced { tag, recognized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_uses_payload() {
        let handler = PushHandler::new(NotificationConfig::default());
        let outcome = handler
            .handle(Event::Push(PushMessage { payload: Some("Lead approved".into()) }))
            .await
            .unwrap();

        let Outcome::Notify(notification) = outcome else { panic!("expected notification") };
        assert_eq!(notification.body, "Lead approved");
        assert_eq!(notification.title, "Waystation");
        assert_eq!(notification.icon, "/icons/icon-192x192.png");
        assert_eq!(notification.badge, "/icons/icon-72x72.png");
        assert_eq!(notification.vibrate, vec![100, 50, 100]);
        assert_eq!(notification.url, "/");
    }

    #[tokio::test]
    async fn test_push_default_body() {
        let handler = PushHandler::new(NotificationConfig::default());
        let outcome = handler.handle(Event::Push(PushMessage::default())).await.unwrap();

        let Outcome::Notify(notification) = outcome else { panic!("expected notification") };
        assert_eq!(notification.body, "New notification");
    }

    #[tokio::test]
    async fn test_click_opens_url_or_default() {
        let handler = NotificationClickHandler::new("/");

        let outcome = handler
            .handle(Event::NotificationClick(NotificationClick { url: Some("/orders".into()) }))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::OpenWindow { url } if url == "/orders"));

        let outcome = handler.handle(Event::NotificationClick(NotificationClick::default())).await.unwrap();
        assert!(matches!(outcome, Outcome::OpenWindow { url } if url == "/"));
    }

    #[tokio::test]
    async fn test_sync_tags() {
        let handler = SyncHandler::new(vec!["sync-leads".into()]);

        let outcome = handler.handle(Event::Sync("sync-leads".into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { recognized: true, .. }));

        let outcome = handler.handle(Event::Sync("sync-orders".into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { recognized: false, .. }));
    }

    #[tokio::test]
    async fn test_handlers_decline_other_events() {
        let handler = SyncHandler::new(Vec::new());
        assert!(matches!(handler.handle(Event::Activate).await.unwrap(), Outcome::Unhandled));
    }
}
