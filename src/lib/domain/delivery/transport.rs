//! SMTP endpoints and the fallback chain

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors that can occur when parsing transport configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportConfigError {
    /// Unknown encryption mode
    #[error("unknown encryption mode \"{0}\", expected starttls or implicit_tls")]
    UnknownEncryptionMode(String),

    /// The endpoint is not of the form `host:port[:mode]`
    #[error("invalid SMTP endpoint \"{0}\", expected host:port[:mode]")]
    InvalidEndpoint(String),

    /// The port is not a valid number
    #[error("invalid SMTP port \"{0}\"")]
    InvalidPort(String),
}

/// How a connection to an SMTP relay is secured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Plaintext connection upgraded in place before authenticating
    #[default]
    StartTls,

    /// Connection is encrypted from the first byte
    ImplicitTls,
}

impl EncryptionMode {
    /// The conventional mode for a port: 465 is implicit TLS, anything else
    /// STARTTLS
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            Self::ImplicitTls
        } else {
            Self::StartTls
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartTls => write!(f, "starttls"),
            Self::ImplicitTls => write!(f, "implicit_tls"),
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = TransportConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "implicit_tls" | "tls" | "ssl" => Ok(Self::ImplicitTls),
            other => Err(TransportConfigError::UnknownEncryptionMode(
                other.to_string(),
            )),
        }
    }
}

/// One candidate SMTP endpoint
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// The relay host name
    pub host: String,

    /// The relay port
    pub port: u16,

    /// How the connection is secured
    pub encryption_mode: EncryptionMode,
}

impl TransportConfig {
    /// Create a new transport configuration
    pub fn new(host: &str, port: u16, encryption_mode: EncryptionMode) -> Self {
        Self {
            host: host.to_string(),
            port,
            encryption_mode,
        }
    }

    /// Whether both configurations point at the same host and port
    pub fn same_endpoint(&self, other: &TransportConfig) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}

/// Displays as `host:port`
impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host:port` or `host:port:mode`
impl FromStr for TransportConfig {
    type Err = TransportConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split(':').map(str::trim).collect();

        let (host, port, mode) = match parts.as_slice() {
            [host, port] => (*host, *port, None),
            [host, port, mode] => (*host, *port, Some(*mode)),
            _ => return Err(TransportConfigError::InvalidEndpoint(raw.to_string())),
        };

        if host.is_empty() {
            return Err(TransportConfigError::InvalidEndpoint(raw.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| TransportConfigError::InvalidPort(port.to_string()))?;

        let encryption_mode = match mode {
            Some(mode) => mode.parse()?,
            None => EncryptionMode::for_port(port),
        };

        Ok(Self::new(host, port, encryption_mode))
    }
}

/// The primary relay followed by its ordered alternates. Built once at start
/// and never reordered.
#[derive(Clone, Debug)]
pub struct FallbackChain {
    primary: TransportConfig,
    fallbacks: Vec<TransportConfig>,
}

impl FallbackChain {
    /// Create a chain from a primary and an ordered list of alternates
    pub fn new(primary: TransportConfig, fallbacks: Vec<TransportConfig>) -> Self {
        Self { primary, fallbacks }
    }

    /// Create a chain whose alternates are the common submission ports of the
    /// primary host
    pub fn with_defaults(primary: TransportConfig) -> Self {
        let fallbacks = vec![
            TransportConfig::new(&primary.host, 587, EncryptionMode::StartTls),
            TransportConfig::new(&primary.host, 465, EncryptionMode::ImplicitTls),
            TransportConfig::new(&primary.host, 2525, EncryptionMode::StartTls),
        ];

        Self::new(primary, fallbacks)
    }

    /// The primary endpoint
    pub fn primary(&self) -> &TransportConfig {
        &self.primary
    }

    /// The alternates in declared order, skipping any that match the primary
    pub fn fallbacks(&self) -> impl Iterator<Item = &TransportConfig> {
        self.fallbacks
            .iter()
            .filter(move |candidate| !candidate.same_endpoint(&self.primary))
    }

    /// The primary followed by every alternate
    pub fn endpoints(&self) -> impl Iterator<Item = &TransportConfig> {
        std::iter::once(&self.primary).chain(self.fallbacks())
    }
}

/// Whether a failed primary attempt may move on to the alternates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Try the fallback chain and the provider after the primary fails
    pub use_fallback: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self { use_fallback: true }
    }
}

/// HTTP provider credentials. A missing key is a configuration condition,
/// not a transient failure.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    api_key: Option<String>,
}

impl ProviderCredentials {
    /// Create provider credentials, treating a blank key as absent
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// The API key, if configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Whether provider sending can be attempted at all
    pub fn is_usable(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
