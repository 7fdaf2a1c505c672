//! Email delivery: messages, transports and the fallback orchestrator.

mod email_address;
mod mailer;
mod message;
mod outcome;
mod probe;
mod service;
mod transport;

pub use email_address::{EmailAddress, EmailAddressError};
pub use mailer::{ProviderTransport, SmtpTransport};
pub use message::{Attachment, ContentKind, Message, MessageError, Sender};
pub use outcome::{DeliveryOutcome, DeliveryStatus};
pub use probe::{ConnectivityProbe, ProbeStatus};
pub use service::{DeliveryService, DeliveryServiceImpl};
pub use transport::{
    EncryptionMode, FallbackChain, FallbackPolicy, ProviderCredentials, TransportConfig,
    TransportConfigError,
};
