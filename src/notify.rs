use async_trait::async_trait;

// ============================================================================
// Mail Notification Port
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Default adapter: writes the mail to the log instead of an SMTP relay.
/// Deployments that actually send mail implement `Mailer` over their
/// delivery service.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "📧 Sending notification email"
        );
        tracing::debug!(body = %message.body, "Email body");
        Ok(())
    }
}
