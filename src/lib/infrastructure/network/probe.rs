//! TCP connectivity probe

use std::{io, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use tokio::{
    net::{lookup_host, TcpStream},
    time::timeout,
};
use tracing::debug;

use crate::domain::delivery::{ConnectivityProbe, ProbeStatus};

/// Probe configuration
#[derive(Clone, Debug, Parser)]
pub struct ProbeConfig {
    /// Seconds allowed for each DNS lookup and each TCP connect
    #[clap(long = "probe-timeout-secs", env = "PROBE_TIMEOUT_SECS", default_value_t = 3)]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 3 }
    }
}

/// Resolves the host and opens, then immediately drops, a TCP connection
#[derive(Clone, Debug)]
pub struct TcpConnectivityProbe {
    timeout: Duration,
}

impl TcpConnectivityProbe {
    /// Create a new probe
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpConnectivityProbe {
    async fn probe(&self, host: &str, port: u16) -> ProbeStatus {
        let addresses = match timeout(self.timeout, lookup_host((host, port))).await {
            Ok(Ok(addresses)) => addresses.collect::<Vec<_>>(),
            Ok(Err(err)) => {
                debug!(host, port, error = %err, "lookup failed");
                return ProbeStatus::DnsError;
            }
            Err(_) => {
                debug!(host, port, "lookup timed out");
                return ProbeStatus::DnsError;
            }
        };

        let Some(address) = addresses.first() else {
            return ProbeStatus::DnsError;
        };

        let status = match timeout(self.timeout, TcpStream::connect(*address)).await {
            Ok(Ok(_)) => ProbeStatus::Reachable,
            Ok(Err(err)) => connect_failure(&err),
            Err(_) => ProbeStatus::Unreachable,
        };

        debug!(host, port, %status, "probed");

        status
    }
}

fn connect_failure(err: &io::Error) -> ProbeStatus {
    use io::ErrorKind::*;

    match err.kind() {
        ConnectionRefused | ConnectionReset | ConnectionAborted | TimedOut | NotConnected
        | HostUnreachable | NetworkUnreachable | NetworkDown | AddrNotAvailable => {
            ProbeStatus::Unreachable
        }
        _ => ProbeStatus::ProbeError,
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn probe() -> TcpConnectivityProbe {
        TcpConnectivityProbe::new(&ProbeConfig { timeout_secs: 2 })
    }

    #[tokio::test]
    async fn test_reachable_listener() -> TestResult {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        assert_eq!(probe().probe("127.0.0.1", port).await, ProbeStatus::Reachable);

        Ok(())
    }

    #[tokio::test]
    async fn test_zero_timeout_is_raised() -> TestResult {
        let probe = TcpConnectivityProbe::new(&ProbeConfig { timeout_secs: 0 });

        assert_eq!(probe.timeout, Duration::from_secs(1));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        assert_eq!(probe.probe("127.0.0.1", port).await, ProbeStatus::Reachable);

        Ok(())
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() -> TestResult {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        assert_eq!(
            probe().probe("127.0.0.1", port).await,
            ProbeStatus::Unreachable
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        assert_eq!(
            probe().probe("nonexistent.invalid", 587).await,
            ProbeStatus::DnsError
        );
    }

    #[test]
    fn test_connect_failure_classification() {
        assert_eq!(
            connect_failure(&io::Error::from(io::ErrorKind::ConnectionRefused)),
            ProbeStatus::Unreachable
        );
        assert_eq!(
            connect_failure(&io::Error::from(io::ErrorKind::PermissionDenied)),
            ProbeStatus::ProbeError
        );
    }
}
