//! Delivery orchestration

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::mock;

use super::{
    ConnectivityProbe, DeliveryOutcome, DeliveryStatus, FallbackChain, FallbackPolicy, Message,
    ProviderTransport, SmtpTransport,
};

/// Delivery service
#[async_trait]
pub trait DeliveryService: Clone + Send + Sync + 'static {
    /// Delivers a message, walking the fallback chain when allowed.
    ///
    /// # Arguments
    /// * `message` - The [`Message`] to deliver.
    /// * `policy` - Whether alternates may be tried after the primary fails.
    ///
    /// # Returns
    /// The first successful [`DeliveryOutcome`], or the final failure once
    /// every permitted transport has been tried.
    async fn send(&self, message: &Message, policy: FallbackPolicy) -> DeliveryOutcome;
}

#[cfg(test)]
mock! {
    pub DeliveryService {}

    impl Clone for DeliveryService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl DeliveryService for DeliveryService {
        async fn send(&self, message: &Message, policy: FallbackPolicy) -> DeliveryOutcome;
    }
}

/// Delivery service implementation. Attempts run strictly one after another
/// in chain order.
#[derive(Clone)]
pub struct DeliveryServiceImpl<S, P, C>
where
    S: SmtpTransport,
    P: ProviderTransport,
    C: ConnectivityProbe,
{
    chain: Arc<FallbackChain>,
    smtp: Arc<S>,
    provider: Arc<P>,
    probe: Arc<C>,
}

impl<S, P, C> DeliveryServiceImpl<S, P, C>
where
    S: SmtpTransport,
    P: ProviderTransport,
    C: ConnectivityProbe,
{
    /// Create a new delivery service
    pub fn new(chain: FallbackChain, smtp: S, provider: P, probe: C) -> Self {
        Self {
            chain: Arc::new(chain),
            smtp: Arc::new(smtp),
            provider: Arc::new(provider),
            probe: Arc::new(probe),
        }
    }

    /// Builds the final failure once every SMTP candidate has failed and the
    /// provider cannot be used.
    async fn exhausted(&self, attempts: usize, last_failure: DeliveryOutcome) -> DeliveryOutcome {
        let mut connectivity = Vec::new();

        for endpoint in self.chain.endpoints() {
            let result = self.probe.probe(&endpoint.host, endpoint.port).await;

            debug!(server = %endpoint, %result, "connectivity probe");

            connectivity.push(json!({
                "server": endpoint.to_string(),
                "result": result,
            }));
        }

        let mut diagnostic = json!({
            "attempts": attempts,
            "last_failure": {
                "status": last_failure.status,
                "message": last_failure.message,
            },
            "connectivity": connectivity,
        });

        if let (Some(detail), Value::Object(map)) = (last_failure.diagnostic, &mut diagnostic) {
            map.insert("last_failure_detail".to_string(), detail);
        }

        DeliveryOutcome::failure(
            DeliveryStatus::Error,
            format!(
                "Could not deliver email through any SMTP server (last error {}: {})",
                last_failure.status, last_failure.message
            ),
        )
        .with_diagnostic(diagnostic)
    }
}

impl<S, P, C> fmt::Debug for DeliveryServiceImpl<S, P, C>
where
    S: SmtpTransport,
    P: ProviderTransport,
    C: ConnectivityProbe,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryServiceImpl")
            .field("chain", &self.chain)
            .field("smtp", &"SmtpTransport")
            .field("provider", &"ProviderTransport")
            .field("probe", &"ConnectivityProbe")
            .finish()
    }
}

#[async_trait]
impl<S, P, C> DeliveryService for DeliveryServiceImpl<S, P, C>
where
    S: SmtpTransport,
    P: ProviderTransport,
    C: ConnectivityProbe,
{
    async fn send(&self, message: &Message, policy: FallbackPolicy) -> DeliveryOutcome {
        let primary = self.chain.primary();
        let outcome = self.smtp.attempt(primary, message).await;

        if outcome.is_success() {
            return outcome.with_server(primary.to_string());
        }

        if !policy.use_fallback {
            debug!(server = %primary, status = %outcome.status, "fallback disabled");
            return outcome;
        }

        let mut attempts = 1;
        let mut last_failure = outcome;

        for candidate in self.chain.fallbacks() {
            warn!(
                failed = attempts,
                status = %last_failure.status,
                next = %candidate,
                "trying fallback SMTP server"
            );

            attempts += 1;

            let outcome = self.smtp.attempt(candidate, message).await;

            if outcome.is_success() {
                let server = candidate.to_string();

                info!(server = %server, "delivered through fallback SMTP server");

                return outcome.with_server(server.clone()).with_fallback(server);
            }

            last_failure = outcome;
        }

        match message.to().first() {
            Some(to) if message.is_provider_eligible() => {
                info!(attempts, "SMTP chain exhausted, falling back to HTTP provider");

                self.provider.send_via_provider(to, message).await
            }
            _ => {
                warn!(attempts, "SMTP chain exhausted, message not eligible for provider");

                self.exhausted(attempts, last_failure).await
            }
        }
    }
}
