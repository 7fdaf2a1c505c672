//! Email message

use std::fmt;

use thiserror::Error;

use super::EmailAddress;

/// Errors that can occur when constructing a [`Message`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message has no primary recipients
    #[error("at least one recipient is required")]
    NoRecipients,

    /// The subject is empty
    #[error("subject cannot be empty")]
    EmptySubject,

    /// The attachment has no usable file name
    #[error("attachment file name \"{0}\" is invalid")]
    InvalidAttachmentName(String),
}

/// How the body of a message should be rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentKind {
    /// `text/plain`
    #[default]
    Plain,

    /// `text/html`
    Html,
}

impl ContentKind {
    /// Selects the content kind from an `is_html` flag
    pub fn from_html_flag(is_html: bool) -> Self {
        if is_html {
            Self::Html
        } else {
            Self::Plain
        }
    }

    /// The MIME type of the body
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Plain => "text/plain",
            Self::Html => "text/html",
        }
    }
}

/// The configured sender of every message sent by this service instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    /// The sender address, absent when not configured
    pub address: Option<EmailAddress>,

    /// The display name
    pub name: String,
}

impl Sender {
    /// Create a new sender
    pub fn new(address: Option<EmailAddress>, name: &str) -> Self {
        Self {
            address,
            name: name.to_string(),
        }
    }
}

/// A file attached to a message, held fully in memory
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment. Only the final path component of `filename`
    /// is kept.
    pub fn new(filename: &str, content: Vec<u8>) -> Result<Self, MessageError> {
        let basename = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if basename.is_empty() || basename == "." || basename == ".." {
            return Err(MessageError::InvalidAttachmentName(filename.to_string()));
        }

        Ok(Self {
            filename: basename.to_string(),
            content,
        })
    }

    /// The file name
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The raw bytes
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.content.len())
            .finish()
    }
}

/// A single email to be delivered
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    sender: Sender,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    subject: String,
    body: String,
    content_kind: ContentKind,
    attachments: Vec<Attachment>,
}

impl Message {
    /// Create a new message
    ///
    /// # Errors
    /// * [`MessageError::NoRecipients`] if `to` is empty.
    /// * [`MessageError::EmptySubject`] if `subject` is blank.
    pub fn new(
        sender: Sender,
        to: Vec<EmailAddress>,
        subject: &str,
        body: &str,
        content_kind: ContentKind,
    ) -> Result<Self, MessageError> {
        if to.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        if subject.trim().is_empty() {
            return Err(MessageError::EmptySubject);
        }

        Ok(Self {
            sender,
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.to_string(),
            body: body.to_string(),
            content_kind,
            attachments: Vec::new(),
        })
    }

    /// Set the carbon copy recipients
    #[must_use]
    pub fn with_cc(mut self, cc: Vec<EmailAddress>) -> Self {
        self.cc = cc;
        self
    }

    /// Set the blind carbon copy recipients
    #[must_use]
    pub fn with_bcc(mut self, bcc: Vec<EmailAddress>) -> Self {
        self.bcc = bcc;
        self
    }

    /// Set the attachments
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// The sender
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// The primary recipients, never empty
    pub fn to(&self) -> &[EmailAddress] {
        &self.to
    }

    /// The carbon copy recipients
    pub fn cc(&self) -> &[EmailAddress] {
        &self.cc
    }

    /// The blind carbon copy recipients
    pub fn bcc(&self) -> &[EmailAddress] {
        &self.bcc
    }

    /// The subject line
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The body text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// How the body is rendered
    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    /// The attachments
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Every address the message is delivered to: to, then cc, then bcc
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// Number of addresses in the delivery envelope
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Whether the message is simple enough for the HTTP provider: no
    /// attachments, no cc and no bcc.
    pub fn is_provider_eligible(&self) -> bool {
        self.attachments.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }
}

#[cfg(test)]
pub mod tests {
    use testresult::TestResult;

    use super::*;

    pub fn sender() -> Sender {
        Sender::new(
            Some(EmailAddress::new("sender@example.com").unwrap()),
            "Email Sender API",
        )
    }

    pub fn address(raw: &str) -> EmailAddress {
        EmailAddress::new(raw).unwrap()
    }

    pub fn simple_message() -> Message {
        Message::new(
            sender(),
            vec![address("to@example.com")],
            "Hello",
            "Hello, world!",
            ContentKind::Plain,
        )
        .unwrap()
    }

    #[test]
    fn test_message_requires_recipients() {
        let result = Message::new(sender(), vec![], "Hello", "body", ContentKind::Plain);

        assert_eq!(result, Err(MessageError::NoRecipients));
    }

    #[test]
    fn test_message_requires_subject() {
        let result = Message::new(
            sender(),
            vec![address("to@example.com")],
            "  ",
            "body",
            ContentKind::Plain,
        );

        assert_eq!(result, Err(MessageError::EmptySubject));
    }

    #[test]
    fn test_recipient_count_includes_cc_and_bcc() {
        let message = simple_message()
            .with_cc(vec![address("cc@example.com")])
            .with_bcc(vec![address("bcc1@example.com"), address("bcc2@example.com")]);

        assert_eq!(message.recipient_count(), 4);

        let envelope: Vec<&str> = message.envelope_recipients().map(|a| a.as_str()).collect();

        assert_eq!(
            envelope,
            vec![
                "to@example.com",
                "cc@example.com",
                "bcc1@example.com",
                "bcc2@example.com"
            ]
        );
    }

    #[test]
    fn test_provider_eligibility() -> TestResult {
        assert!(simple_message().is_provider_eligible());
        assert!(!simple_message()
            .with_cc(vec![address("cc@example.com")])
            .is_provider_eligible());
        assert!(!simple_message()
            .with_bcc(vec![address("bcc@example.com")])
            .is_provider_eligible());
        assert!(!simple_message()
            .with_attachments(vec![Attachment::new("a.txt", b"a".to_vec())?])
            .is_provider_eligible());

        Ok(())
    }

    #[test]
    fn test_attachment_keeps_basename() -> TestResult {
        let attachment = Attachment::new("/tmp/uploads/report.pdf", vec![1, 2, 3])?;

        assert_eq!(attachment.filename(), "report.pdf");
        assert_eq!(attachment.content(), &[1, 2, 3]);

        let windows = Attachment::new(r"C:\Users\me\notes.txt", vec![])?;

        assert_eq!(windows.filename(), "notes.txt");

        Ok(())
    }

    #[test]
    fn test_attachment_rejects_empty_name() {
        assert_eq!(
            Attachment::new("/tmp/", vec![]),
            Err(MessageError::InvalidAttachmentName("/tmp/".to_string()))
        );
        assert!(Attachment::new("..", vec![]).is_err());
    }

    #[test]
    fn test_attachment_debug_hides_content() -> TestResult {
        let attachment = Attachment::new("secret.bin", vec![0; 16])?;

        assert_eq!(
            format!("{attachment:?}"),
            "Attachment { filename: \"secret.bin\", size: 16 }"
        );

        Ok(())
    }

    #[test]
    fn test_content_kind() {
        assert_eq!(ContentKind::from_html_flag(true), ContentKind::Html);
        assert_eq!(ContentKind::from_html_flag(false).mime_type(), "text/plain");
        assert_eq!(ContentKind::Html.mime_type(), "text/html");
    }
}
