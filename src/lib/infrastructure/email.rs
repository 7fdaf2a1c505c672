//! Email adapters

use clap::Parser;

use crate::domain::delivery::{EmailAddress, EmailAddressError, Sender};

pub mod compose;
pub mod sendgrid;
pub mod smtp;

/// Sender identity configuration
#[derive(Clone, Debug, Default, Parser)]
pub struct SenderConfig {
    /// The address every message is sent from
    #[clap(long = "sender-email", env = "SENDER_EMAIL")]
    pub email: Option<String>,

    /// The display name of the sender
    #[clap(long = "sender-name", env = "SENDER_NAME", default_value = "Email Sender API")]
    pub name: String,
}

impl SenderConfig {
    /// Validates the configured sender. An unset or blank address yields a
    /// sender without an address.
    pub fn sender(&self) -> Result<Sender, EmailAddressError> {
        let address = self
            .email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .map(EmailAddress::new)
            .transpose()?;

        Ok(Sender::new(address, &self.name))
    }
}
