//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tracing::debug;

/// Host resolved by the connectivity probe.
pub const DEFAULT_PROBE_HOST: &str = "www.google.com:443";

/// Desktop network monitor
///
/// Connectivity is a DNS lookup of a known-good host, bounded by a short
/// timeout. Lookup failure and timeout both report `Disconnected`.
pub struct DesktopNetworkMonitor {
    probe_host: String,
    probe_timeout: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::with_probe(DEFAULT_PROBE_HOST, Duration::from_secs(3))
    }

    /// Probe a custom `host:port` with a custom timeout.
    pub fn with_probe(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe_host: host.into(),
            probe_timeout: timeout,
        }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        let lookup = tokio::net::lookup_host(self.probe_host.as_str());
        match tokio::time::timeout(self.probe_timeout, lookup).await {
            Ok(Ok(mut addrs)) => {
                if addrs.next().is_some() {
                    NetworkStatus::Connected
                } else {
                    NetworkStatus::Disconnected
                }
            }
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => {
                debug!(host = %self.probe_host, "Connectivity probe timed out");
                NetworkStatus::Disconnected
            }
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, "Network info updated");

        Ok(NetworkInfo {
            status,
            // Desktop cannot tell WiFi from Ethernet without platform APIs
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
        })
    }
}
