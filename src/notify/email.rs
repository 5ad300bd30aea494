use anyhow::{Context, Result};
use lettre::message::{
    header::ContentType, Attachment as MimeAttachment, Mailbox, Message, MultiPart, SinglePart,
};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notifier, OutboundMessage};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn from_env(recipients: &[String]) -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").context("NOTIFY_EMAIL_FROM missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let recipients = recipients
            .iter()
            .map(|r| r.parse().with_context(|| format!("invalid recipient {r:?}")))
            .collect::<Result<Vec<Mailbox>>>()?;

        Ok(Self {
            mailer,
            from,
            recipients,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(&message.subject);
        for to in &self.recipients {
            builder = builder.to(to.clone());
        }

        let email = match &message.attachment {
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
                .context("build email")?,
            Some(att) => builder
                .multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(message.body.clone()))
                        .singlepart(MimeAttachment::new(att.filename.clone()).body(
                            att.content.clone(),
                            ContentType::parse("application/octet-stream")
                                .context("attachment content type")?,
                        )),
                )
                .context("build email")?,
        };

        self.mailer.send(email).await.context("send email")?;
        Ok(())
    }
}
