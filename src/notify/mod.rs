pub mod email;

use anyhow::Result;

/// A subject/body message handed to the notifier. The pipeline never inspects
/// transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, filename: impl Into<String>, content: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            content,
        });
        self
    }
}

#[async_trait::async_trait]
pub trait Notifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Per-file error notification, sent immediately when a file is skipped.
pub fn load_error_message(file: &str, category: &str, error: &str) -> OutboundMessage {
    OutboundMessage::new(
        "Drive to BQ Upload: Error while loading file",
        format!("Error while loading {file} from {category}\nError: {error}"),
    )
}

/// End-of-run summary: either the list of loaded files or the distinct
/// "nothing happened" message.
pub fn summary_message(files_added: &[String]) -> OutboundMessage {
    if files_added.is_empty() {
        OutboundMessage::new(
            "Drive to BQ Upload: No file uploaded",
            "No file from Drive was added to BQ",
        )
    } else {
        OutboundMessage::new(
            "Drive to BQ Upload: Transfer completed",
            format!("Files added: \n{}", files_added.join("\n")),
        )
    }
}
