// # Notification Capabilities
//
// Two narrow seams separate transition detection from delivery:
//
// - [`Notifier`]: the external send capability, `send(text, channel)`.
//   Implemented by the concrete channel client (chat bot, webhook, log).
// - [`NotificationSink`]: what registries call when a transition is
//   detected. Implemented by `NotificationDispatcher`, and by recording
//   doubles in tests.
//
// Registries only ever see a `NotificationSink`; they never talk to a
// `Notifier` directly.

use async_trait::async_trait;

use crate::model::Notification;

/// External notification channel client
///
/// # Trust Level: Untrusted
///
/// Notifiers are external integrations:
/// - ✅ Deliver one message to one channel per call
/// - ✅ Return success or failure
/// - ❌ Retry (delivery is at-most-once)
/// - ❌ Inspect or mutate registry state
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `channel`
    async fn send(&self, text: &str, channel: i64) -> Result<(), crate::Error>;

    /// Human-readable notifier name for logs
    fn notifier_name(&self) -> &'static str;
}

/// Capability registries use to hand off a detected transition
///
/// `notify` may wait when the downstream queue is full, but must not wait
/// for the external send itself.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Hand off a notification for delivery
    async fn notify(&self, notification: Notification);
}
