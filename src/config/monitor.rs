//! Configuration for the monitored node services and the status probes.
//!
//! Everything here is read once at startup and treated as immutable: the
//! peer measurement strategy in particular is never switched at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How the execution client's peer count is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStrategy {
    /// Count established sockets of the client process via `lsof`.
    #[default]
    Lsof,
    /// Count established TCP sessions from the socket table (`ss` / `netstat`).
    Netstat,
    /// Read the last peer-count token from the client's own log output.
    Logs,
}

impl PeerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStrategy::Lsof => "lsof",
            PeerStrategy::Netstat => "netstat",
            PeerStrategy::Logs => "logs",
        }
    }
}

impl fmt::Display for PeerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The execution client: where its logs live and how its process is named.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExecutionConfig {
    /// Systemd unit or docker container name used for log retrieval.
    #[validate(length(min = 1, message = "Service name must not be empty"))]
    pub service: String,

    /// Process name used for PID lookup and socket attribution.
    #[validate(length(min = 1, message = "Process name must not be empty"))]
    pub process: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            service: "geth".to_string(),
            process: "geth".to_string(),
        }
    }
}

/// The consensus client. Only its logs are read.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsensusConfig {
    #[validate(length(min = 1, message = "Service name must not be empty"))]
    pub service: String,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            service: "prysm".to_string(),
        }
    }
}

/// Optional public address lookup.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExternalIpConfig {
    pub enabled: bool,

    /// Endpoint returning the caller's public address as plain text.
    #[validate(length(min = 1))]
    pub url: String,

    #[validate(range(min = 1, max = 10, message = "External IP timeout must be 1-10 seconds"))]
    pub timeout_secs: u64,
}

impl Default for ExternalIpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.ipify.org".to_string(),
            timeout_secs: 2,
        }
    }
}

/// Top-level monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorConfig {
    /// Execution client (chain/state sync, block height, peers).
    #[validate(nested)]
    pub execution: ExecutionConfig,

    /// Consensus client (slots, epochs, connection breakdown).
    #[validate(nested)]
    pub consensus: ConsensusConfig,

    pub peer_strategy: PeerStrategy,

    /// Lifetime of cached peer counts, in seconds.
    #[validate(range(min = 1, message = "Cache TTL must be at least 1 second"))]
    pub cache_ttl_secs: u64,

    /// Number of recent log lines retrieved per service.
    #[validate(range(min = 10, max = 5000, message = "log_lines must be between 10 and 5000"))]
    pub log_lines: usize,

    /// Upper bound for a single log retrieval attempt, in seconds.
    #[validate(range(min = 1, message = "Log retrieval timeout must be at least 1 second"))]
    pub log_timeout_secs: u64,

    #[validate(nested)]
    pub external_ip: ExternalIpConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            consensus: ConsensusConfig::default(),
            peer_strategy: PeerStrategy::default(),
            cache_ttl_secs: 3,
            log_lines: 500,
            log_timeout_secs: 5,
            external_ip: ExternalIpConfig::default(),
        }
    }
}
