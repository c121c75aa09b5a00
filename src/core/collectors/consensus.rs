use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    diagnostics::{scan_error_records, ErrorLevel, ErrorRecord},
    traits::DataProducer,
    types::CollectorResult,
};
use crate::core::{
    logtext::{extract_kv, LogText},
    probe::LogSource,
};

/// Service tag carried by consensus-client error records.
pub const CONSENSUS_SERVICE: &str = "consensus";

static SYNCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)synced new block").expect("static regex"));
static CONNECTED_PEERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)connected peers").expect("static regex"));
static ERROR_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(ERRO|ERROR|CRIT)\b|level=(error|fatal)\b").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConsensusLine {
    SyncedBlock,
    ConnectedPeers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsensusStatus {
    Active,
    Error,
}

/// Peer connections of the consensus client split by transport and direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connections {
    pub quic_in: u64,
    pub quic_out: u64,
    pub tcp_in: u64,
    pub tcp_out: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusState {
    pub slot: u64,
    pub epoch: u64,
    pub peers: u64,
    pub connections: Connections,
    pub status: ConsensusStatus,
}

impl ConsensusState {
    pub fn degraded() -> Self {
        ConsensusState {
            slot: 0,
            epoch: 0,
            peers: 0,
            connections: Connections::default(),
            status: ConsensusStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusReport {
    pub state: ConsensusState,
    pub errors: Vec<ErrorRecord>,
}

impl ConsensusReport {
    pub fn degraded() -> Self {
        ConsensusReport {
            state: ConsensusState::degraded(),
            errors: Vec::new(),
        }
    }
}

/// Reads a non-negative counter, tolerating quoting. Anything else is 0.
fn counter(kv: Option<&HashMap<&str, &str>>, key: &str) -> u64 {
    kv.and_then(|kv| kv.get(key))
        .and_then(|value| value.trim_matches('"').parse().ok())
        .unwrap_or(0)
}

/// Derives [`ConsensusState`] from the consensus client's log window.
///
/// Slot and epoch come from the last "Synced new block" line, the peer
/// breakdown from the last "Connected peers" line. Every field defaults to 0
/// on its own.
pub fn parse_consensus_state(logs: &LogText) -> ConsensusState {
    let latest = logs.latest(&[
        (ConsensusLine::SyncedBlock, &*SYNCED_BLOCK),
        (ConsensusLine::ConnectedPeers, &*CONNECTED_PEERS),
    ]);

    let block = latest.get(&ConsensusLine::SyncedBlock).map(|line| extract_kv(line));
    let peers = latest
        .get(&ConsensusLine::ConnectedPeers)
        .map(|line| extract_kv(line));

    ConsensusState {
        slot: counter(block.as_ref(), "slot"),
        epoch: counter(block.as_ref(), "epoch"),
        peers: counter(peers.as_ref(), "total"),
        connections: Connections {
            quic_in: counter(peers.as_ref(), "inboundQUIC"),
            quic_out: counter(peers.as_ref(), "outboundQUIC"),
            tcp_in: counter(peers.as_ref(), "inboundTCP"),
            tcp_out: counter(peers.as_ref(), "outboundTCP"),
        },
        status: ConsensusStatus::Active,
    }
}

/// Recent lines of the consensus client carrying an error-level marker.
pub fn consensus_errors(logs: &LogText) -> Vec<ErrorRecord> {
    scan_error_records(logs, &ERROR_MARKER, CONSENSUS_SERVICE, |_| ErrorLevel::Error)
}

/// Producer for the consensus section.
pub struct ConsensusCollector {
    service: String,
    logs: Arc<dyn LogSource>,
}

impl ConsensusCollector {
    pub fn new(service: impl Into<String>, logs: Arc<dyn LogSource>) -> Self {
        ConsensusCollector {
            service: service.into(),
            logs,
        }
    }
}

#[async_trait::async_trait]
impl DataProducer for ConsensusCollector {
    type Output = ConsensusReport;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let logs = self.logs.fetch(&self.service).await;
        let state = parse_consensus_state(&logs);
        trace!(
            "Consensus '{}': slot={} epoch={} peers={}",
            self.service,
            state.slot,
            state.epoch,
            state.peers
        );

        Ok(ConsensusReport {
            state,
            errors: consensus_errors(&logs),
        })
    }
}
