//! Transport adapter interfaces

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use super::{DeliveryOutcome, EmailAddress, Message, TransportConfig};

/// Delivers a message through one SMTP relay
#[async_trait]
pub trait SmtpTransport: Clone + Send + Sync + 'static {
    /// Attempt a single delivery through `config`.
    ///
    /// # Arguments
    /// * `config` - The [`TransportConfig`] of the relay to use.
    /// * `message` - The [`Message`] to deliver to its full envelope.
    ///
    /// # Returns
    /// A [`DeliveryOutcome`]. Failures are classified, never raised.
    async fn attempt(&self, config: &TransportConfig, message: &Message) -> DeliveryOutcome;
}

/// Delivers a message through a transactional email HTTP API
#[async_trait]
pub trait ProviderTransport: Clone + Send + Sync + 'static {
    /// Send `message` to the single address `to`.
    ///
    /// # Returns
    /// A [`DeliveryOutcome`] interpreted from the provider's response.
    async fn send_via_provider(&self, to: &EmailAddress, message: &Message) -> DeliveryOutcome;
}

#[cfg(test)]
mock! {
    pub SmtpTransport {}

    impl Clone for SmtpTransport {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl SmtpTransport for SmtpTransport {
        async fn attempt(&self, config: &TransportConfig, message: &Message) -> DeliveryOutcome;
    }
}

#[cfg(test)]
mock! {
    pub ProviderTransport {}

    impl Clone for ProviderTransport {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl ProviderTransport for ProviderTransport {
        async fn send_via_provider(&self, to: &EmailAddress, message: &Message) -> DeliveryOutcome;
    }
}
