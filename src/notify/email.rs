use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::Notifier;
use crate::error::NotifyError;

/// SMTP relay and addressing for alert emails.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    // ---
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

/// Sends each alert as one plain-text email to every configured recipient.
pub struct EmailNotifier {
    // ---
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    // ---
    pub fn new(settings: &EmailSettings, timeout: Duration) -> Result<Self, NotifyError> {
        // ---
        // Port 465 is implicit TLS; anything else negotiates STARTTLS.
        let relay = if settings.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
        };
        let builder = relay.map_err(|e| NotifyError::InvalidConfig(format!("smtp host: {e}")))?;

        let mut builder = builder.port(settings.smtp_port).timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = parse_mailbox(&settings.from)?;
        let to = settings
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "at least one alert recipient is required".into(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.trim()
        .parse()
        .map_err(|e| NotifyError::InvalidConfig(format!("address '{addr}': {e}")))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn kind(&self) -> &str {
        "email"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        // ---
        let mut message = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            message = message.to(recipient.clone());
        }
        let email = message
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }
}
