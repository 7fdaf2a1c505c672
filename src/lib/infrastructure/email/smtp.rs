//! SMTP email service implementation

use std::{error::Error as StdError, fmt, io, time::Duration};

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use lettre::{
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        response::Code,
        Error as SmtpError,
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{debug, error, info, warn};

use crate::domain::delivery::{
    DeliveryOutcome, DeliveryStatus, EncryptionMode, FallbackChain, Message, SmtpTransport,
    TransportConfig,
};

use super::compose::{compose, ComposeError};

/// Reply codes meaning the relay refused the credentials
const AUTH_REJECTION_CODES: [&str; 3] = ["530", "534", "535"];

/// SMTP configuration
#[derive(Clone, Default, Parser)]
pub struct SMTPConfig {
    /// The primary SMTP host
    #[clap(long = "smtp-server", env = "SMTP_SERVER", default_value = "smtp.gmail.com")]
    pub host: String,

    /// The primary SMTP port
    #[clap(long = "smtp-port", env = "SMTP_PORT", default_value = "587")]
    pub port: u16,

    /// How the primary connection is secured (starttls or implicit_tls)
    #[clap(long = "smtp-encryption", env = "SMTP_ENCRYPTION", default_value = "starttls")]
    pub encryption: EncryptionMode,

    /// The SMTP username
    #[clap(long = "smtp-username", env = "SMTP_USERNAME")]
    pub username: Option<String>,

    /// The SMTP password
    #[clap(long = "smtp-password", env = "SMTP_PASSWORD")]
    pub password: Option<String>,

    /// Verify the TLS certificate
    #[clap(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value_t = true, action = ArgAction::Set)]
    pub verify_tls: bool,

    /// Connect and command timeout in seconds
    #[clap(long = "smtp-timeout-secs", env = "SMTP_TIMEOUT_SECS", default_value = "10")]
    pub timeout_secs: u64,

    /// Alternate relays as comma-separated `host:port[:mode]` entries
    #[clap(long = "smtp-fallback-servers", env = "SMTP_FALLBACK_SERVERS", value_delimiter = ',')]
    pub fallbacks: Vec<TransportConfig>,
}

impl SMTPConfig {
    /// Whether both username and password are set
    pub fn has_credentials(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());

        present(&self.username) && present(&self.password)
    }

    /// The primary relay
    pub fn primary(&self) -> TransportConfig {
        TransportConfig::new(&self.host, self.port, self.encryption)
    }

    /// The primary relay followed by the configured alternates, or the
    /// default alternates when none are configured
    pub fn fallback_chain(&self) -> FallbackChain {
        if self.fallbacks.is_empty() {
            FallbackChain::with_defaults(self.primary())
        } else {
            FallbackChain::new(self.primary(), self.fallbacks.clone())
        }
    }
}

impl fmt::Debug for SMTPConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SMTPConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("verify_tls", &self.verify_tls)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

/// SMTP mailer. Opens one connection per attempt and closes it on every
/// exit path.
#[derive(Clone)]
pub struct SMTPMailer {
    username: String,
    password: String,
    verify_tls: bool,
    timeout: Duration,
}

impl SMTPMailer {
    /// Create a new SMTP mailer
    pub fn new(config: &SMTPConfig) -> Self {
        Self {
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            verify_tls: config.verify_tls,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// Upper bound on a whole attempt, in case the relay stalls between
    /// commands
    fn deadline(&self) -> Duration {
        self.timeout.saturating_mul(2)
    }

    /// Builds a transport for a single relay
    fn transport(
        &self,
        config: &TransportConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, SmtpError> {
        let parameters = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(!self.verify_tls)
            .build()?;

        let tls = match config.encryption_mode {
            EncryptionMode::StartTls => Tls::Required(parameters),
            EncryptionMode::ImplicitTls => Tls::Wrapper(parameters),
        };

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .tls(tls)
                .credentials(Credentials::new(
                    self.username.clone(),
                    self.password.clone(),
                ))
                .timeout(Some(self.timeout))
                .build(),
        )
    }
}

impl fmt::Debug for SMTPMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SMTPMailer")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl SmtpTransport for SMTPMailer {
    async fn attempt(&self, config: &TransportConfig, message: &Message) -> DeliveryOutcome {
        let server = config.to_string();

        let email = match compose(message) {
            Ok(email) => email,
            Err(ComposeError::SenderMissing) => {
                return DeliveryOutcome::failure(
                    DeliveryStatus::SenderMissing,
                    "Sender email address is not configured",
                );
            }
            Err(err) => {
                error!(error = %err, "could not compose email");
                return DeliveryOutcome::failure(
                    DeliveryStatus::Error,
                    format!("Could not compose email: {err}"),
                );
            }
        };

        let transport = match self.transport(config) {
            Ok(transport) => transport,
            Err(err) => return failure(&server, &err),
        };

        debug!(
            server = %server,
            mode = %config.encryption_mode,
            recipients = message.recipient_count(),
            "sending email via SMTP"
        );

        match tokio::time::timeout(self.deadline(), transport.send(email)).await {
            Ok(Ok(_)) => {
                let count = message.recipient_count();

                info!(server = %server, recipients = count, "email sent via SMTP");

                DeliveryOutcome::success(
                    format!("Email sent successfully to {count} recipients"),
                    count,
                )
                .with_server(server)
            }
            Ok(Err(err)) => failure(&server, &err),
            Err(_) => {
                warn!(server = %server, "SMTP delivery timed out");

                DeliveryOutcome::failure(
                    DeliveryStatus::Timeout,
                    format!(
                        "SMTP delivery through {server} timed out after {}s",
                        self.deadline().as_secs()
                    ),
                )
            }
        }
    }
}

fn failure(server: &str, err: &SmtpError) -> DeliveryOutcome {
    let status = classify(err);

    warn!(server = %server, status = %status, error = %err, "SMTP attempt failed");

    let summary = match status {
        DeliveryStatus::AuthError => "SMTP authentication failed",
        DeliveryStatus::ConnectionError => "Could not connect to SMTP server",
        DeliveryStatus::NetworkUnreachable => "Network unreachable",
        DeliveryStatus::NetworkError => "Network error",
        _ => "Error sending email",
    };

    DeliveryOutcome::failure(status, format!("{summary} ({server}): {err}"))
}

/// Maps an SMTP client error to the delivery taxonomy. Checked in priority
/// order: credentials, connection setup, unreachable network, other I/O,
/// everything else.
pub(crate) fn classify(err: &SmtpError) -> DeliveryStatus {
    classify_parts(
        err.status(),
        err.is_client(),
        &err.to_string(),
        io_source(err).map(io::Error::kind),
        err.is_tls(),
    )
}

fn classify_parts(
    status: Option<Code>,
    is_client: bool,
    text: &str,
    io_kind: Option<io::ErrorKind>,
    is_tls: bool,
) -> DeliveryStatus {
    if is_auth_rejection(status, is_client, text) {
        return DeliveryStatus::AuthError;
    }

    if let Some(kind) = io_kind {
        return classify_io(kind);
    }

    if is_tls {
        return DeliveryStatus::ConnectionError;
    }

    DeliveryStatus::Error
}

fn is_auth_rejection(status: Option<Code>, is_client: bool, text: &str) -> bool {
    if let Some(code) = status {
        return AUTH_REJECTION_CODES.contains(&code.to_string().as_str());
    }

    is_client && text.to_lowercase().contains("authentication")
}

fn io_source<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);

    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err);
        }

        current = err.source();
    }

    None
}

pub(crate) fn classify_io(kind: io::ErrorKind) -> DeliveryStatus {
    use io::ErrorKind::*;

    match kind {
        ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | TimedOut
        | UnexpectedEof => DeliveryStatus::ConnectionError,
        NetworkUnreachable | HostUnreachable | NetworkDown => DeliveryStatus::NetworkUnreachable,
        _ => DeliveryStatus::NetworkError,
    }
}
