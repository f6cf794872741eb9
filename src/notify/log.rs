use async_trait::async_trait;

use super::Notifier;
use crate::error::NotifyError;

/// Writes alerts to the log only. Used when no SMTP relay or webhook is
/// configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn kind(&self) -> &str {
        "log"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        tracing::warn!(subject = %subject, "{}", body);
        Ok(())
    }
}
