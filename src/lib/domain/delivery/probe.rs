//! Connectivity probing for operator diagnostics

use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

#[cfg(test)]
use mockall::mock;

/// Result of a TCP reachability check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStatus {
    /// A TCP connection was established
    Reachable,
    /// The host resolved but refused, dropped or timed out the connection
    Unreachable,
    /// The host name could not be resolved
    DnsError,
    /// The probe itself failed
    ProbeError,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reachable => "reachable",
            Self::Unreachable => "unreachable",
            Self::DnsError => "dns_error",
            Self::ProbeError => "probe_error",
        })
    }
}

impl Serialize for ProbeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Checks whether an endpoint accepts TCP connections. Never used for
/// routing.
#[async_trait]
pub trait ConnectivityProbe: Clone + Send + Sync + 'static {
    /// Probe `host:port` with a bare TCP connect
    async fn probe(&self, host: &str, port: u16) -> ProbeStatus;
}

#[cfg(test)]
mock! {
    pub ConnectivityProbe {}

    impl Clone for ConnectivityProbe {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl ConnectivityProbe for ConnectivityProbe {
        async fn probe(&self, host: &str, port: u16) -> ProbeStatus;
    }
}
