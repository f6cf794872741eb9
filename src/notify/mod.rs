//! Alert notification: the [`Notifier`] seam and its implementations.
//!
//! Notification is fire-and-forget from the consumer's point of view.
//! [`dispatch`] bounds each attempt with a timeout and swallows failures
//! after logging them; nothing is queued or retried.

mod email;
mod log;
mod webhook;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{error::NotifyError, models::AlertEvent};

pub use email::{EmailNotifier, EmailSettings};
pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

// ---

/// Something that can deliver an alert to a human.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport name for logs (`"email"`, `"webhook"`, `"log"`).
    fn kind(&self) -> &str;

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Which notifier to build at startup.
#[derive(Debug, Clone)]
pub enum NotifierSettings {
    // ---
    Email(EmailSettings),
    Webhook { url: String },
    Log,
}

impl NotifierSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            NotifierSettings::Email(_) => "email",
            NotifierSettings::Webhook { .. } => "webhook",
            NotifierSettings::Log => "log",
        }
    }
}

/// Instantiate the configured notifier.
pub fn build_notifier(
    settings: &NotifierSettings,
    timeout: Duration,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    // ---
    let notifier: Arc<dyn Notifier> = match settings {
        NotifierSettings::Email(email) => Arc::new(EmailNotifier::new(email, timeout)?),
        NotifierSettings::Webhook { url } => Arc::new(WebhookNotifier::new(url, timeout)?),
        NotifierSettings::Log => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

/// Deliver `alert`, waiting at most `timeout`.
///
/// Returns whether delivery succeeded. Failures never propagate.
pub async fn dispatch(notifier: &dyn Notifier, alert: &AlertEvent, timeout: Duration) -> bool {
    // ---
    let attempt = tokio::time::timeout(timeout, notifier.notify(&alert.subject, &alert.body));
    let result = match attempt.await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout(timeout)),
    };

    match result {
        Ok(()) => {
            info!(
                alert_id = %alert.id,
                signal = %alert.signal,
                notifier = notifier.kind(),
                "Alert notification sent"
            );
            true
        }
        Err(e @ NotifyError::Timeout(_)) => {
            warn!(
                alert_id = %alert.id,
                signal = %alert.signal,
                notifier = notifier.kind(),
                error = %e,
                "Alert notification abandoned"
            );
            false
        }
        Err(e) => {
            error!(
                alert_id = %alert.id,
                signal = %alert.signal,
                notifier = notifier.kind(),
                error = %e,
                "Alert notification failed"
            );
            false
        }
    }
}
