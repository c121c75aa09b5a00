//! Status snapshot assembly.
//!
//! The `SnapshotAssembler` fans the four section producers out as separate
//! tokio tasks. A producer that returns an error or panics only costs its own
//! section, which is replaced by that section's degraded record; the failure
//! is logged and the rest of the snapshot is served as usual.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, error, warn};

use super::{
    collectors::{
        CollectorResult, ConsensusCollector, ConsensusReport, ConsensusState, DataProducer,
        ErrorRecord, ExecutionCollector, ExecutionReport, NetworkCollector, NetworkInfo,
        PeerCountResolver, ResourceSnapshot, SyncState, SystemCollector,
    },
    probe::{CommandLogSource, CommandProbe, LogSource},
};
use crate::config::monitor::{MonitorConfig, PeerStrategy};

/// Error records kept across both clients.
pub const MAX_ERRORS: usize = 10;

/// Hostname reported when the system call fails.
const UNKNOWN_HOST: &str = "unknown";

/// Failures outside the per-section guards. These fail the whole request.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to format snapshot timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub measurement_strategy: String,
    pub hostname: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

/// The document served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub execution: SyncState,
    pub consensus: ConsensusState,
    pub system: ResourceSnapshot,
    pub network: NetworkInfo,
    pub errors: Vec<ErrorRecord>,
    pub meta: SnapshotMeta,
}

type Producer<T> = Arc<dyn DataProducer<Output = T>>;

/// Builds [`StatusSnapshot`]s from the section producers.
pub struct SnapshotAssembler {
    execution: Producer<ExecutionReport>,
    consensus: Producer<ConsensusReport>,
    system: Producer<ResourceSnapshot>,
    network: Producer<NetworkInfo>,
    strategy: PeerStrategy,
    hostname: String,
}

impl SnapshotAssembler {
    /// Creates an assembler over the given producers.
    ///
    /// # Arguments
    /// * `strategy` - Peer strategy name reported in the snapshot metadata
    pub fn new(
        execution: Producer<ExecutionReport>,
        consensus: Producer<ConsensusReport>,
        system: Producer<ResourceSnapshot>,
        network: Producer<NetworkInfo>,
        strategy: PeerStrategy,
    ) -> Self {
        SnapshotAssembler {
            execution,
            consensus,
            system,
            network,
            strategy,
            hostname: local_hostname(),
        }
    }

    /// Wires the production producers from the monitor configuration.
    ///
    /// Fails only if the HTTP client for the external IP lookup cannot be
    /// built.
    pub fn from_config(
        config: &MonitorConfig,
        probe: Arc<dyn CommandProbe>,
    ) -> CollectorResult<Self> {
        let logs: Arc<dyn LogSource> = Arc::new(CommandLogSource::new(
            probe.clone(),
            config.log_lines,
            Duration::from_secs(config.log_timeout_secs),
        ));

        let peers = Arc::new(PeerCountResolver::new(
            config.peer_strategy,
            config.execution.process.clone(),
            probe.clone(),
            Duration::from_secs(config.cache_ttl_secs),
        ));

        Ok(SnapshotAssembler::new(
            Arc::new(ExecutionCollector::new(
                config.execution.service.clone(),
                logs.clone(),
                peers,
            )),
            Arc::new(ConsensusCollector::new(config.consensus.service.clone(), logs)),
            Arc::new(SystemCollector::new(probe)),
            Arc::new(NetworkCollector::new(&config.external_ip)?),
            config.peer_strategy,
        ))
    }

    /// Overrides the reported hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Runs every producer and assembles one snapshot.
    pub async fn assemble(&self) -> Result<StatusSnapshot, SnapshotError> {
        let (execution, consensus, system, network) = tokio::join!(
            isolated("execution", self.execution.clone(), ExecutionReport::degraded),
            isolated("consensus", self.consensus.clone(), ConsensusReport::degraded),
            isolated("system", self.system.clone(), ResourceSnapshot::degraded),
            isolated("network", self.network.clone(), NetworkInfo::degraded),
        );

        let errors = merge_errors(execution.errors, consensus.errors);
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
        debug!("Snapshot assembled with {} error records", errors.len());

        Ok(StatusSnapshot {
            execution: execution.state,
            consensus: consensus.state,
            system,
            network,
            errors,
            meta: SnapshotMeta {
                measurement_strategy: self.strategy.to_string(),
                hostname: self.hostname.clone(),
                timestamp,
            },
        })
    }
}

/// Runs `producer` in its own task and falls back to `degraded()` when it
/// fails or panics.
async fn isolated<T, F>(section: &'static str, producer: Producer<T>, degraded: F) -> T
where
    T: Send + Sync + 'static,
    F: FnOnce() -> T,
{
    match tokio::spawn(async move { producer.produce().await }).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Section '{}' degraded: {}", section, e);
            degraded()
        }
        Err(e) => {
            error!("Producer task for section '{}' failed: {}", section, e);
            degraded()
        }
    }
}

/// Execution records first, then consensus, capped at [`MAX_ERRORS`].
pub fn merge_errors(execution: Vec<ErrorRecord>, consensus: Vec<ErrorRecord>) -> Vec<ErrorRecord> {
    execution.into_iter().chain(consensus).take(MAX_ERRORS).collect()
}

fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Could not determine hostname: {}", e);
            UNKNOWN_HOST.to_string()
        }
    }
}
