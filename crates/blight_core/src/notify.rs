//! Fire-and-forget user notifications.

use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

/// Receives user-facing messages. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => tracing::warn!("{message}"),
            Severity::Info | Severity::Success => tracing::info!("{message}"),
        }
    }
}

/// Forwards notifications to a channel, e.g. a UI toast queue.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        tracing::debug!(?severity, "{message}");
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(Notification {
            severity,
            message: message.to_string(),
        });
    }
}
