//! MIME composition of outgoing messages

use lettre::{
    address::{AddressError, Envelope},
    message::{
        header::{ContentTransferEncoding, ContentType, ContentTypeErr},
        Attachment as AttachmentPart, Body, Mailbox, MultiPart, SinglePart,
    },
    Address, Message as MimeMessage,
};
use thiserror::Error;

use crate::domain::delivery::{ContentKind, EmailAddress, Message};

/// Errors that can occur while composing a MIME message
#[derive(Debug, Error)]
pub enum ComposeError {
    /// No sender address is configured
    #[error("sender email address is not configured")]
    SenderMissing,

    /// An address was rejected by the MIME builder
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// The attachment content type could not be built
    #[error("invalid content type: {0}")]
    ContentType(#[from] ContentTypeErr),

    /// The attachment could not be encoded
    #[error("could not encode attachment \"{0}\"")]
    Encoding(String),

    /// The message could not be assembled
    #[error(transparent)]
    Build(#[from] lettre::error::Error),
}

/// Builds a `multipart/mixed` message with one body part and one base64
/// part per attachment. Bcc recipients are placed only in the envelope.
pub fn compose(message: &Message) -> Result<MimeMessage, ComposeError> {
    let sender = message.sender();
    let from_address = sender
        .address
        .as_ref()
        .ok_or(ComposeError::SenderMissing)?
        .as_str()
        .parse::<Address>()?;

    let recipients = message
        .envelope_recipients()
        .map(|recipient| recipient.as_str().parse::<Address>())
        .collect::<Result<Vec<_>, _>>()?;

    let envelope = Envelope::new(Some(from_address.clone()), recipients)?;

    let mut builder = MimeMessage::builder()
        .from(Mailbox::new(Some(sender.name.clone()), from_address))
        .subject(message.subject())
        .envelope(envelope);

    for to in message.to() {
        builder = builder.to(mailbox(to)?);
    }

    for cc in message.cc() {
        builder = builder.cc(mailbox(cc)?);
    }

    let body_type = match message.content_kind() {
        ContentKind::Plain => ContentType::TEXT_PLAIN,
        ContentKind::Html => ContentType::TEXT_HTML,
    };

    let mut multipart = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(body_type)
            .body(message.body().to_string()),
    );

    for attachment in message.attachments() {
        let body = Body::new_with_encoding(
            attachment.content().to_vec(),
            ContentTransferEncoding::Base64,
        )
        .map_err(|_| ComposeError::Encoding(attachment.filename().to_string()))?;

        multipart = multipart.singlepart(
            AttachmentPart::new(attachment.filename().to_string())
                .body(body, ContentType::parse("application/octet-stream")?),
        );
    }

    Ok(builder.multipart(multipart)?)
}

fn mailbox(address: &EmailAddress) -> Result<Mailbox, AddressError> {
    Ok(Mailbox::new(None, address.as_str().parse()?))
}

#[cfg(test)]
mod tests {
    use mailparse::{parse_mail, MailHeaderMap};
    use testresult::TestResult;

    use super::*;
    use crate::domain::delivery::{
        tests::{address, sender, simple_message},
        Attachment, Sender,
    };

    fn envelope_of(email: &MimeMessage) -> Vec<String> {
        email
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_headers_and_envelope() -> TestResult {
        let message = simple_message()
            .with_cc(vec![address("cc1@example.com"), address("cc2@example.com")])
            .with_bcc(vec![address("hidden@example.com")]);

        let email = compose(&message)?;
        let raw = email.formatted();
        let parsed = parse_mail(&raw)?;

        let from = parsed.headers.get_first_value("From").ok_or("missing From")?;
        let cc = parsed.headers.get_first_value("Cc").ok_or("missing Cc")?;

        assert!(from.contains("Email Sender API"));
        assert!(from.contains("sender@example.com"));
        assert_eq!(
            parsed.headers.get_first_value("To").as_deref(),
            Some("to@example.com")
        );
        assert!(cc.contains("cc1@example.com, cc2@example.com"));
        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Hello")
        );

        assert_eq!(
            envelope_of(&email),
            vec![
                "to@example.com",
                "cc1@example.com",
                "cc2@example.com",
                "hidden@example.com"
            ]
        );

        Ok(())
    }

    #[test]
    fn test_bcc_never_appears_in_headers() -> TestResult {
        let message = simple_message().with_bcc(vec![address("hidden@example.com")]);

        let email = compose(&message)?;
        let raw = String::from_utf8(email.formatted())?;
        let parsed = parse_mail(raw.as_bytes())?;

        assert!(parsed.headers.get_first_value("Bcc").is_none());
        assert!(!raw.contains("hidden@example.com"));
        assert!(envelope_of(&email).contains(&"hidden@example.com".to_string()));

        Ok(())
    }

    #[test]
    fn test_plain_and_html_body_parts() -> TestResult {
        let plain = compose(&simple_message())?.formatted();
        let parsed = parse_mail(&plain)?;

        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        assert_eq!(parsed.subparts.len(), 1);
        assert_eq!(parsed.subparts[0].ctype.mimetype, "text/plain");
        assert_eq!(parsed.subparts[0].ctype.charset.to_lowercase(), "utf-8");
        assert_eq!(parsed.subparts[0].get_body()?.trim_end(), "Hello, world!");

        let message = Message::new(
            sender(),
            vec![address("to@example.com")],
            "Héllo",
            "<p>Ünïcode</p>",
            ContentKind::Html,
        )?;
        let html = compose(&message)?.formatted();
        let parsed = parse_mail(&html)?;

        assert_eq!(parsed.subparts[0].ctype.mimetype, "text/html");
        assert_eq!(parsed.subparts[0].get_body()?.trim_end(), "<p>Ünïcode</p>");
        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Héllo")
        );

        Ok(())
    }

    #[test]
    fn test_attachment_round_trip() -> TestResult {
        let content: Vec<u8> = (0..=255).collect();
        let message = simple_message().with_attachments(vec![
            Attachment::new("/tmp/data.bin", content.clone())?,
            Attachment::new("notes.txt", b"plain ascii".to_vec())?,
        ]);

        let raw = compose(&message)?.formatted();
        let parsed = parse_mail(&raw)?;

        assert_eq!(parsed.subparts.len(), 3);

        let binary = &parsed.subparts[1];

        assert_eq!(binary.ctype.mimetype, "application/octet-stream");
        assert_eq!(
            binary
                .headers
                .get_first_value("Content-Transfer-Encoding")
                .map(|v| v.to_lowercase())
                .as_deref(),
            Some("base64")
        );
        assert_eq!(
            binary
                .get_content_disposition()
                .params
                .get("filename")
                .map(String::as_str),
            Some("data.bin")
        );
        assert_eq!(binary.get_body_raw()?, content);

        let text = &parsed.subparts[2];

        assert_eq!(
            text.headers
                .get_first_value("Content-Transfer-Encoding")
                .map(|v| v.to_lowercase())
                .as_deref(),
            Some("base64")
        );
        assert_eq!(text.get_body_raw()?, b"plain ascii");

        Ok(())
    }

    #[test]
    fn test_missing_sender() -> TestResult {
        let message = Message::new(
            Sender::new(None, "Nobody"),
            vec![address("to@example.com")],
            "Hello",
            "body",
            ContentKind::Plain,
        )?;

        assert!(matches!(compose(&message), Err(ComposeError::SenderMissing)));

        Ok(())
    }
}
