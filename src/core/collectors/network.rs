use std::{net::IpAddr, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::debug;

use super::{error::CollectorError, traits::DataProducer, types::CollectorResult};
use crate::config::monitor::ExternalIpConfig;

/// Reported when no routable local address could be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Any public address works; the socket is connected but never sends.
const ROUTE_PROBE_TARGET: &str = "8.8.8.8:80";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "internalIP")]
    pub internal_ip: String,
    #[serde(rename = "externalIP", skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
}

impl NetworkInfo {
    pub fn degraded() -> Self {
        NetworkInfo {
            internal_ip: UNKNOWN_ADDRESS.to_string(),
            external_ip: None,
        }
    }
}

/// Local address the kernel would use for outbound traffic.
async fn internal_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(ROUTE_PROBE_TARGET).await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Public address as echoed by a plain-text "what is my IP" service.
struct ExternalIpLookup {
    client: Client,
    url: String,
}

impl ExternalIpLookup {
    async fn fetch(&self) -> CollectorResult<IpAddr> {
        let http_error = |source| CollectorError::Http {
            url: self.url.clone(),
            source,
        };

        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(http_error)?
            .text()
            .await
            .map_err(http_error)?;

        body.trim()
            .parse()
            .map_err(|_| CollectorError::InvalidFormat {
                location: self.url.clone(),
                reason: format!("not an IP address: {}", body.trim()),
            })
    }
}

/// Producer for the network section.
pub struct NetworkCollector {
    external: Option<ExternalIpLookup>,
}

impl NetworkCollector {
    /// Builds the collector; the HTTP client only exists when the external
    /// lookup is enabled.
    pub fn new(config: &ExternalIpConfig) -> CollectorResult<Self> {
        if !config.enabled {
            return Ok(NetworkCollector { external: None });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| CollectorError::Http {
                url: config.url.clone(),
                source,
            })?;

        Ok(NetworkCollector {
            external: Some(ExternalIpLookup {
                client,
                url: config.url.clone(),
            }),
        })
    }

    pub fn external_lookup_enabled(&self) -> bool {
        self.external.is_some()
    }
}

#[async_trait::async_trait]
impl DataProducer for NetworkCollector {
    type Output = NetworkInfo;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let internal_ip = match internal_ip().await {
            Some(ip) => ip.to_string(),
            None => {
                debug!("No routable local address found");
                UNKNOWN_ADDRESS.to_string()
            }
        };

        let external_ip = match &self.external {
            Some(lookup) => match lookup.fetch().await {
                Ok(ip) => Some(ip.to_string()),
                Err(e) => {
                    debug!("External IP lookup failed: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(NetworkInfo {
            internal_ip,
            external_ip,
        })
    }
}
