#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! REST API for sending email through SMTP relays with an HTTP provider
//! fallback

use anyhow::{Context, Result};
use clap::Parser;
use mail_relay::{
    domain::delivery::DeliveryServiceImpl,
    infrastructure::{
        email::{
            sendgrid::{SendGridConfig, SendGridMailer},
            smtp::{SMTPConfig, SMTPMailer},
            SenderConfig,
        },
        http::{AppConfig, AppState, HttpServer, HttpServerConfig},
        network::probe::{ProbeConfig, TcpConnectivityProbe},
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The HTTP server configuration
    #[clap(flatten)]
    pub server: HttpServerConfig,

    /// The SMTP relay configuration
    #[clap(flatten)]
    pub smtp: SMTPConfig,

    /// The sender identity
    #[clap(flatten)]
    pub sender: SenderConfig,

    /// The SendGrid configuration
    #[clap(flatten)]
    pub sendgrid: SendGridConfig,

    /// The connectivity probe configuration
    #[clap(flatten)]
    pub probe: ProbeConfig,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let sender = args
        .sender
        .sender()
        .context("SENDER_EMAIL is not a valid email address")?;

    if sender.address.is_none() {
        warn!("SENDER_EMAIL is not set, every send will fail with sender_missing");
    }

    if !args.smtp.has_credentials() {
        warn!("SMTP_USERNAME or SMTP_PASSWORD is not set, send endpoints will refuse requests");
    }

    let chain = args.smtp.fallback_chain();

    info!(
        primary = %chain.primary(),
        fallbacks = chain.fallbacks().count(),
        "configured SMTP relays"
    );

    let sendgrid =
        SendGridMailer::new(&args.sendgrid).context("failed to build the SendGrid client")?;

    if !sendgrid.is_configured() {
        warn!("SENDGRID_API_KEY is not set, there is no HTTP fallback after the SMTP relays");
    }

    let deliveries = DeliveryServiceImpl::new(
        chain,
        SMTPMailer::new(&args.smtp),
        sendgrid,
        TcpConnectivityProbe::new(&args.probe),
    );

    let config = AppConfig {
        sender,
        smtp_configured: args.smtp.has_credentials(),
    };

    HttpServer::new(AppState::new(config, deliveries), &args.server)?
        .run()
        .await
}
