//! SendGrid HTTP API provider

use std::{fmt, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::delivery::{
    DeliveryOutcome, DeliveryStatus, EmailAddress, Message, ProviderCredentials,
    ProviderTransport,
};

/// The default SendGrid v3 send endpoint
pub const DEFAULT_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Upper bound on the response body kept in diagnostics
const MAX_BODY_IN_DIAGNOSTIC: usize = 500;

/// Steps an operator must complete before SendGrid accepts the sender
const SENDER_VERIFICATION_CHECKLIST: [&str; 4] = [
    "Open Settings > Sender Authentication in the SendGrid dashboard",
    "Verify the configured SENDER_EMAIL as a Single Sender, or authenticate its domain",
    "Confirm the verification email sent to that address",
    "Make sure SENDER_EMAIL matches the verified address exactly",
];

/// SendGrid configuration
#[derive(Clone, Default, Parser)]
pub struct SendGridConfig {
    /// The SendGrid API key
    #[clap(long = "sendgrid-api-key", env = "SENDGRID_API_KEY")]
    pub api_key: Option<String>,

    /// The SendGrid send endpoint
    #[clap(long = "sendgrid-api-url", env = "SENDGRID_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// A mail address in a SendGrid payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendGridAddress {
    /// The address
    pub email: String,

    /// The display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Recipients of one SendGrid personalization
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendGridPersonalization {
    /// The recipients
    pub to: Vec<SendGridAddress>,
}

/// A typed body block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendGridContent {
    /// The MIME type
    #[serde(rename = "type")]
    pub mime_type: String,

    /// The body
    pub value: String,
}

/// Body of a `POST /v3/mail/send` request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendGridRequest {
    /// Exactly one personalization with exactly one recipient
    pub personalizations: Vec<SendGridPersonalization>,

    /// The sender
    pub from: SendGridAddress,

    /// The subject line
    pub subject: String,

    /// Exactly one content block
    pub content: Vec<SendGridContent>,
}

impl SendGridRequest {
    /// Builds a single-recipient request
    pub fn new(from: &EmailAddress, from_name: &str, to: &EmailAddress, message: &Message) -> Self {
        Self {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress {
                    email: to.to_string(),
                    name: None,
                }],
            }],
            from: SendGridAddress {
                email: from.to_string(),
                name: Some(from_name.to_string()),
            },
            subject: message.subject().to_string(),
            content: vec![SendGridContent {
                mime_type: message.content_kind().mime_type().to_string(),
                value: message.body().to_string(),
            }],
        }
    }

    /// From, to and subject only, for diagnostics
    fn metadata(&self) -> Value {
        let to: Vec<&str> = self
            .personalizations
            .iter()
            .flat_map(|p| p.to.iter().map(|a| a.email.as_str()))
            .collect();

        json!({
            "from": self.from.email,
            "to": to,
            "subject": self.subject,
        })
    }
}

/// One entry of a SendGrid error response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendGridError {
    /// The error text
    #[serde(default)]
    pub message: String,

    /// The offending field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// A pointer to documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<Value>,
}

impl SendGridError {
    fn mentions_sender_verification(&self) -> bool {
        let message = self.message.to_lowercase();

        message.contains("sender identity")
            || message.contains("verified sender")
            || (message.contains("from address") && message.contains("verif"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendGridErrorBody {
    #[serde(default)]
    errors: Vec<SendGridError>,
}

fn parse_errors(body: &str) -> Vec<SendGridError> {
    serde_json::from_str::<SendGridErrorBody>(body)
        .map(|body| body.errors)
        .unwrap_or_default()
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

/// Turns a SendGrid HTTP response into a [`DeliveryOutcome`]
pub fn interpret_response(status: u16, body: &str, request: &SendGridRequest) -> DeliveryOutcome {
    match status {
        202 => {
            let to = request
                .personalizations
                .first()
                .and_then(|p| p.to.first())
                .map(|a| a.email.as_str())
                .unwrap_or_default();

            DeliveryOutcome::success(format!("Email sent successfully via SendGrid to {to}"), 1)
        }
        401 => DeliveryOutcome::failure(
            DeliveryStatus::Authentication,
            "SendGrid rejected the API key",
        ),
        403 => {
            let errors = parse_errors(body);

            if errors.iter().any(SendGridError::mentions_sender_verification) {
                DeliveryOutcome::failure(
                    DeliveryStatus::SenderNotVerified,
                    format!(
                        "SendGrid has not verified the sender identity {}",
                        request.from.email
                    ),
                )
                .with_diagnostic(json!({
                    "errors": errors,
                    "checklist": SENDER_VERIFICATION_CHECKLIST,
                }))
            } else {
                DeliveryOutcome::failure(
                    DeliveryStatus::Forbidden,
                    "SendGrid refused the request",
                )
                .with_diagnostic(json!({ "errors": errors }))
            }
        }
        400 => DeliveryOutcome::failure(
            DeliveryStatus::BadRequest,
            "SendGrid rejected the request payload",
        )
        .with_diagnostic(json!({
            "errors": parse_errors(body),
            "request": request.metadata(),
        })),
        code => DeliveryOutcome::failure(
            DeliveryStatus::ApiError(code),
            format!("SendGrid API returned HTTP {code}"),
        )
        .with_diagnostic(json!({ "body": truncate(body, MAX_BODY_IN_DIAGNOSTIC) })),
    }
}

/// SendGrid mailer
#[derive(Clone)]
pub struct SendGridMailer {
    credentials: ProviderCredentials,
    api_url: String,
    client: Client,
}

impl SendGridMailer {
    /// Create a new SendGrid mailer with bounded connect and request timeouts
    pub fn new(config: &SendGridConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self::with_client(config, client))
    }

    /// Create a new SendGrid mailer with a custom HTTP client
    pub fn with_client(config: &SendGridConfig, client: Client) -> Self {
        Self {
            credentials: ProviderCredentials::new(config.api_key.clone()),
            api_url: config.api_url.clone(),
            client,
        }
    }

    /// Whether an API key is available
    pub fn is_configured(&self) -> bool {
        self.credentials.is_usable()
    }
}

impl fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("credentials", &self.credentials)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[async_trait]
impl ProviderTransport for SendGridMailer {
    #[instrument(skip_all, fields(provider = "sendgrid"))]
    async fn send_via_provider(&self, to: &EmailAddress, message: &Message) -> DeliveryOutcome {
        let Some(api_key) = self.credentials.api_key() else {
            warn!("SendGrid API key not configured");
            return DeliveryOutcome::failure(
                DeliveryStatus::ConfigMissing,
                "SendGrid API key is not configured",
            );
        };

        let sender = message.sender();

        let Some(from) = sender.address.as_ref() else {
            warn!("sender address not configured");
            return DeliveryOutcome::failure(
                DeliveryStatus::SenderMissing,
                "Sender email address is not configured",
            );
        };

        let request = SendGridRequest::new(from, &sender.name, to, message);

        debug!(url = %self.api_url, "sending email via SendGrid");

        let response = match self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!(error = %err, "SendGrid request timed out");
                return DeliveryOutcome::failure(
                    DeliveryStatus::Timeout,
                    format!("SendGrid request timed out: {err}"),
                );
            }
            Err(err) if err.is_connect() => {
                warn!(error = %err, "could not reach SendGrid");
                return DeliveryOutcome::failure(
                    DeliveryStatus::ConnectionError,
                    format!("Could not connect to SendGrid: {err}"),
                );
            }
            Err(err) => {
                warn!(error = %err, "SendGrid request failed");
                return DeliveryOutcome::failure(
                    DeliveryStatus::Error,
                    format!("SendGrid request failed: {err}"),
                );
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let outcome = interpret_response(status, &body, &request);

        if outcome.is_success() {
            info!("email sent via SendGrid");
        } else {
            warn!(http_status = status, status = %outcome.status, "SendGrid rejected email");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::domain::delivery::{
        tests::{address, sender, simple_message},
        ContentKind,
    };

    /// A one-shot HTTP server built on tokio that records the request and
    /// returns a canned response.
    struct MockSendGridServer {
        listener: TcpListener,
        url: String,
    }

    impl MockSendGridServer {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let url = format!("http://127.0.0.1:{port}/v3/mail/send");

            Self { listener, url }
        }

        /// Accepts one connection, answers with `status_code` and `body`, and
        /// returns the raw request.
        async fn respond_once(self, status_code: u16, body: &str) -> String {
            let (mut stream, _) = self.listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let read = stream.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);

                if let Some(expected) = expected_length(&request) {
                    if request.len() >= expected {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status_code} Status\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8(request).unwrap()
        }
    }

    /// Header length plus `Content-Length`, once the headers are complete
    fn expected_length(request: &[u8]) -> Option<usize> {
        let text = String::from_utf8_lossy(request);
        let header_end = text.find("\r\n\r\n")? + 4;

        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        Some(header_end + content_length)
    }

    fn request_body(raw: &str) -> TestResult<SendGridRequest> {
        let (_, body) = raw.split_once("\r\n\r\n").ok_or("no body")?;

        Ok(serde_json::from_str(body)?)
    }

    fn mailer(url: &str, api_key: Option<&str>) -> SendGridMailer {
        SendGridMailer::new(&SendGridConfig {
            api_key: api_key.map(String::from),
            api_url: url.to_string(),
        })
        .unwrap()
    }

    fn request() -> SendGridRequest {
        let message = simple_message();

        SendGridRequest::new(
            &address("sender@example.com"),
            "Email Sender API",
            &message.to()[0],
            &message,
        )
    }

    #[test]
    fn test_request_shape() -> TestResult {
        let message = Message::new(
            sender(),
            vec![address("first@example.com"), address("second@example.com")],
            "Report",
            "<b>hi</b>",
            ContentKind::Html,
        )?;
        let request = SendGridRequest::new(
            &address("sender@example.com"),
            "Email Sender API",
            &message.to()[0],
            &message,
        );

        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "personalizations": [{ "to": [{ "email": "first@example.com" }] }],
                "from": { "email": "sender@example.com", "name": "Email Sender API" },
                "subject": "Report",
                "content": [{ "type": "text/html", "value": "<b>hi</b>" }],
            })
        );

        Ok(())
    }

    #[test]
    fn test_interpret_accepted() {
        let outcome = interpret_response(202, "", &request());

        assert_eq!(outcome.status, DeliveryStatus::Success);
        assert_eq!(outcome.recipient_count, Some(1));
        assert!(outcome.message.contains("to@example.com"));
    }

    #[test]
    fn test_interpret_unauthorized() {
        let outcome = interpret_response(401, r#"{"errors":[]}"#, &request());

        assert_eq!(outcome.status, DeliveryStatus::Authentication);
    }

    #[test]
    fn test_interpret_sender_not_verified() {
        let body = r#"{"errors":[{"message":"The from address does not match a verified Sender Identity. Mail cannot be sent until this error is resolved.","field":"from","help":null}]}"#;

        let outcome = interpret_response(403, body, &request());

        assert_eq!(outcome.status, DeliveryStatus::SenderNotVerified);

        let diagnostic = outcome.diagnostic.unwrap();

        assert_eq!(diagnostic["errors"][0]["field"], "from");
        assert_eq!(
            diagnostic["checklist"].as_array().map(Vec::len),
            Some(SENDER_VERIFICATION_CHECKLIST.len())
        );
    }

    #[test]
    fn test_interpret_forbidden() {
        let body = r#"{"errors":[{"message":"access forbidden","field":null}]}"#;

        let outcome = interpret_response(403, body, &request());

        assert_eq!(outcome.status, DeliveryStatus::Forbidden);
        assert!(outcome.diagnostic.unwrap().get("checklist").is_none());
    }

    #[test]
    fn test_interpret_forbidden_with_unparseable_body() {
        let outcome = interpret_response(403, "<html>nope</html>", &request());

        assert_eq!(outcome.status, DeliveryStatus::Forbidden);
    }

    #[test]
    fn test_interpret_bad_request_attaches_metadata_only() {
        let body = r#"{"errors":[{"message":"The subject is required.","field":"subject"}]}"#;

        let outcome = interpret_response(400, body, &request());

        assert_eq!(outcome.status, DeliveryStatus::BadRequest);

        let diagnostic = outcome.diagnostic.unwrap();

        assert_eq!(diagnostic["errors"][0]["message"], "The subject is required.");
        assert_eq!(
            diagnostic["request"],
            json!({
                "from": "sender@example.com",
                "to": ["to@example.com"],
                "subject": "Hello",
            })
        );
        assert!(!diagnostic.to_string().contains("Hello, world!"));
    }

    #[test]
    fn test_interpret_other_status_truncates_body() {
        let body = "x".repeat(2_000);

        let outcome = interpret_response(503, &body, &request());

        assert_eq!(outcome.status, DeliveryStatus::ApiError(503));
        assert_eq!(outcome.status.to_string(), "api_error_503");
        assert_eq!(
            outcome.diagnostic.unwrap()["body"].as_str().map(str::len),
            Some(MAX_BODY_IN_DIAGNOSTIC)
        );
    }

    #[tokio::test]
    async fn test_send_posts_single_recipient_payload() -> TestResult {
        let server = MockSendGridServer::start().await;
        let mailer = mailer(&server.url, Some("SG.test-key"));
        let message = simple_message();

        let handle = tokio::spawn(server.respond_once(202, ""));

        let outcome = mailer
            .send_via_provider(&address("to@example.com"), &message)
            .await;
        let raw = handle.await?;

        assert!(outcome.is_success());
        assert!(raw.starts_with("POST /v3/mail/send"));
        assert!(raw
            .to_lowercase()
            .contains("authorization: bearer sg.test-key"));

        let body = request_body(&raw)?;

        assert_eq!(body.personalizations.len(), 1);
        assert_eq!(body.personalizations[0].to.len(), 1);
        assert_eq!(body.personalizations[0].to[0].email, "to@example.com");
        assert_eq!(body.content[0].mime_type, "text/plain");

        Ok(())
    }

    #[tokio::test]
    async fn test_send_maps_forbidden_response() -> TestResult {
        let server = MockSendGridServer::start().await;
        let mailer = mailer(&server.url, Some("SG.test-key"));

        let handle = tokio::spawn(server.respond_once(
            403,
            r#"{"errors":[{"message":"The from address does not match a verified Sender Identity."}]}"#,
        ));

        let outcome = mailer
            .send_via_provider(&address("to@example.com"), &simple_message())
            .await;
        handle.await?;

        assert_eq!(outcome.status, DeliveryStatus::SenderNotVerified);

        Ok(())
    }

    #[test]
    fn test_is_configured() {
        assert!(mailer(DEFAULT_API_URL, Some("SG.key")).is_configured());
        assert!(!mailer(DEFAULT_API_URL, Some("  ")).is_configured());
        assert!(!mailer(DEFAULT_API_URL, None).is_configured());
    }

    #[tokio::test]
    async fn test_missing_api_key_makes_no_request() -> TestResult {
        let server = MockSendGridServer::start().await;
        let mailer = mailer(&server.url, None);

        let outcome = mailer
            .send_via_provider(&address("to@example.com"), &simple_message())
            .await;

        assert_eq!(outcome.status, DeliveryStatus::ConfigMissing);

        let accepted =
            tokio::time::timeout(Duration::from_millis(200), server.listener.accept()).await;

        assert!(accepted.is_err(), "no connection should have been made");

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_sender() -> TestResult {
        let message = Message::new(
            crate::domain::delivery::Sender::new(None, "Nobody"),
            vec![address("to@example.com")],
            "Hello",
            "body",
            ContentKind::Plain,
        )?;

        let outcome = mailer("http://127.0.0.1:9/v3/mail/send", Some("SG.key"))
            .send_via_provider(&address("to@example.com"), &message)
            .await;

        assert_eq!(outcome.status, DeliveryStatus::SenderMissing);

        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_connection_error() -> TestResult {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let outcome = mailer(
            &format!("http://127.0.0.1:{port}/v3/mail/send"),
            Some("SG.key"),
        )
        .send_via_provider(&address("to@example.com"), &simple_message())
        .await;

        assert_eq!(outcome.status, DeliveryStatus::ConnectionError);

        Ok(())
    }
}
