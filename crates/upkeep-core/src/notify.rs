//! Notification channels and dispatch.
//!
//! The dispatcher delivers one notification to every configured channel
//! concurrently. A channel failure is logged and reported in its
//! [`DispatchResult`]; it never fails the operation that triggered the
//! notification and never blocks the other channels.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;

use crate::obs::emit_notification_failed;

/// Errors a channel can report.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("channel not registered: {0}")]
    UnknownChannel(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A formatted message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Channel identifier as used in `notification_channels`, e.g. `"console"`.
    fn channel_name(&self) -> &str;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait::async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            channel = "console",
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "console"
    }
}

/// Outcome of delivering to one channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
struct DispatchSettings {
    enabled: bool,
    channels: Vec<String>,
}

/// Routes notifications to the configured channels.
pub struct NotificationDispatcher {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
    settings: RwLock<DispatchSettings>,
}

impl NotificationDispatcher {
    pub fn new(enabled: bool, channels: Vec<String>) -> Self {
        let mut dispatcher = Self {
            notifiers: HashMap::new(),
            settings: RwLock::new(DispatchSettings { enabled, channels }),
        };
        dispatcher.register(Arc::new(ConsoleNotifier));
        dispatcher
    }

    /// Register a notifier under its channel name. Replaces any previous one.
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers
            .insert(notifier.channel_name().to_string(), notifier);
    }

    /// Update which channels receive notifications.
    pub fn configure(&self, enabled: bool, channels: Vec<String>) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        settings.enabled = enabled;
        settings.channels = channels;
    }

    pub fn is_enabled(&self) -> bool {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .enabled
    }

    /// Deliver `notification` to every configured channel.
    ///
    /// Returns one result per configured channel, or nothing when
    /// notifications are disabled.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if !settings.enabled {
            tracing::debug!(subject = %notification.subject, "notifications disabled");
            return Vec::new();
        }

        let deliveries = settings.channels.iter().map(|channel| {
            let notifier = self.notifiers.get(channel).cloned();
            async move {
                let start = Instant::now();
                let outcome = match notifier {
                    Some(n) => n.send(notification).await,
                    None => Err(NotifyError::UnknownChannel(channel.clone())),
                };
                let duration_ms = start.elapsed().as_millis() as u64;
                match outcome {
                    Ok(()) => DispatchResult {
                        channel: channel.clone(),
                        success: true,
                        error: None,
                        duration_ms,
                    },
                    Err(e) => {
                        emit_notification_failed(channel, &e);
                        DispatchResult {
                            channel: channel.clone(),
                            success: false,
                            error: Some(e.to_string()),
                            duration_ms,
                        }
                    }
                }
            }
        });

        join_all(deliveries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Delivery("mock failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn mock(name: &str, should_fail: bool) -> (Arc<MockNotifier>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(MockNotifier {
                name: name.to_string(),
                send_count: Arc::clone(&count),
                should_fail,
            }),
            count,
        )
    }

    #[tokio::test]
    async fn test_failure_on_one_channel_does_not_block_others() {
        let (email, email_count) = mock("email", true);
        let (chat, chat_count) = mock("chat", false);
        let mut dispatcher =
            NotificationDispatcher::new(true, vec!["email".to_string(), "chat".to_string()]);
        dispatcher.register(email);
        dispatcher.register(chat);

        let results = dispatcher
            .dispatch(&Notification::new("subject", "body"))
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(email_count.load(Ordering::SeqCst), 1);
        assert_eq!(chat_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_sends_nothing() {
        let (chat, chat_count) = mock("chat", false);
        let mut dispatcher = NotificationDispatcher::new(false, vec!["chat".to_string()]);
        dispatcher.register(chat);

        let results = dispatcher.dispatch(&Notification::new("s", "b")).await;
        assert!(results.is_empty());
        assert_eq!(chat_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unregistered_channel_reports_failure() {
        let dispatcher = NotificationDispatcher::new(true, vec!["pager".to_string()]);
        let results = dispatcher.dispatch(&Notification::new("s", "b")).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or("").contains("pager"));
    }

    #[tokio::test]
    async fn test_configure_switches_channels() {
        let (chat, chat_count) = mock("chat", false);
        let mut dispatcher = NotificationDispatcher::new(true, vec!["console".to_string()]);
        dispatcher.register(chat);

        dispatcher.dispatch(&Notification::new("s", "b")).await;
        assert_eq!(chat_count.load(Ordering::SeqCst), 0);

        dispatcher.configure(true, vec!["chat".to_string()]);
        dispatcher.dispatch(&Notification::new("s", "b")).await;
        assert_eq!(chat_count.load(Ordering::SeqCst), 1);
    }
}
