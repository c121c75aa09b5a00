/// System load average collector module.
/// Reads the 1, 5 and 15-minute load averages from `/proc/loadavg`.
pub mod avg;

/// Consensus-client metrics parsed from its log window.
/// Slot, epoch, peer count and the QUIC/TCP connection breakdown.
pub mod consensus;

/// CPU core count from `/proc/stat`.
pub mod cpu;

/// Error and warning lines surfaced from client logs.
pub mod diagnostics;

/// Root filesystem usage via `df`.
pub mod disk;

/// Error types and handling utilities.
/// Common error types used across all collectors.
pub mod error;

/// Execution-client sync progress parsed from its log window.
/// Chain/state download percentage, ETA, block height and error lines.
pub mod execution;

/// Block-device and CPU share statistics via `iostat`.
pub mod iostat;

/// Internal and external IP addresses.
pub mod network;

/// Execution-client peer count with a cached, configurable strategy.
pub mod peers;

/// Physical memory usage from `/proc/meminfo`.
pub mod ram;

/// Host resources section assembled from the readers above.
pub mod system;

/// Core trait implemented by every producer.
pub mod traits;

/// Common type aliases used across collectors.
pub mod types;

/// Time since boot from `/proc/uptime`.
pub mod uptime;

pub use consensus::{ConsensusCollector, ConsensusReport, ConsensusState};
pub use diagnostics::{ErrorLevel, ErrorRecord};
pub use error::CollectorError;
pub use execution::{ExecutionCollector, ExecutionReport, SyncState};
pub use network::{NetworkCollector, NetworkInfo};
pub use peers::PeerCountResolver;
pub use system::{ResourceSnapshot, SystemCollector};
pub use traits::DataProducer;
pub use types::CollectorResult;

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
