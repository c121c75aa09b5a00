use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    diagnostics::{scan_error_records, ErrorLevel, ErrorRecord},
    error::CollectorError,
    peers::PeerCountResolver,
    traits::DataProducer,
    types::CollectorResult,
};
use crate::core::{
    logtext::{extract_kv, LogText},
    probe::LogSource,
};

/// Service tag carried by execution-client error records.
pub const EXECUTION_SERVICE: &str = "execution";

/// Rendered when a sync line carries no usable ETA.
pub const ETA_COMPUTING: &str = "computing...";

/// Rendered in place of an ETA when the whole record is degraded.
pub const ETA_ERROR: &str = "error";

static CHAIN_SYNC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)chain download in progress").expect("static regex"));
static STATE_SYNC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)state download in progress").expect("static regex"));
static FORKCHOICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)forkchoice").expect("static regex"));

/// Go-style duration as printed by the client, e.g. `3h15m`, `12m34.5s`.
static ETA_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:\d+(?:\.\d+)?s)?$").expect("static regex")
});

static ERROR_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(ERROR|WARN)\b|\b(?:lvl|level)=(error|warn)\b").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SyncLine {
    Chain,
    State,
    Forkchoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Syncing,
    Synced,
    Error,
}

/// Sync progress of the execution client as seen in its recent logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Chain download completion, 0 to 100.
    pub chain_sync: f64,
    /// State download completion, 0 to 100.
    pub state_sync: f64,
    #[serde(rename = "chainETA")]
    pub chain_eta: String,
    #[serde(rename = "stateETA")]
    pub state_eta: String,
    /// The lesser of the two percentages.
    pub overall_progress: f64,
    /// Latest head announced by the consensus layer.
    pub blocks: u64,
    pub peers: u64,
    pub status: SyncStatus,
}

impl SyncState {
    /// Record reported when the execution section could not be produced.
    pub fn degraded() -> Self {
        SyncState {
            chain_sync: 0.0,
            state_sync: 0.0,
            chain_eta: ETA_ERROR.to_string(),
            state_eta: ETA_ERROR.to_string(),
            overall_progress: 0.0,
            blocks: 0,
            peers: 0,
            status: SyncStatus::Error,
        }
    }
}

/// Execution section of the snapshot plus the error lines found alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub state: SyncState,
    pub errors: Vec<ErrorRecord>,
}

impl ExecutionReport {
    pub fn degraded() -> Self {
        ExecutionReport {
            state: SyncState::degraded(),
            errors: Vec::new(),
        }
    }
}

/// Derives [`SyncState`] from the execution client's log window.
///
/// Only the most recent chain-download, state-download and forkchoice lines
/// are considered. Missing lines leave the corresponding fields at their
/// defaults; a percentage that is present but not a finite number fails the
/// whole record.
pub fn parse_sync_state(logs: &LogText, peers: u64) -> CollectorResult<SyncState> {
    let latest = logs.latest(&[
        (SyncLine::Chain, &*CHAIN_SYNC),
        (SyncLine::State, &*STATE_SYNC),
        (SyncLine::Forkchoice, &*FORKCHOICE),
    ]);

    let chain = latest.get(&SyncLine::Chain).map(|line| extract_kv(line));
    let state = latest.get(&SyncLine::State).map(|line| extract_kv(line));

    let chain_sync = parse_percentage(chain.as_ref().and_then(|kv| kv.get("synced").copied()))?;
    let state_sync = parse_percentage(state.as_ref().and_then(|kv| kv.get("synced").copied()))?;
    let chain_eta = format_eta(chain.as_ref().and_then(|kv| kv.get("eta").copied()));
    let state_eta = format_eta(state.as_ref().and_then(|kv| kv.get("eta").copied()));

    let blocks = latest
        .get(&SyncLine::Forkchoice)
        .map(|line| parse_block_height(line))
        .unwrap_or(0);

    let status = if chain_sync >= 100.0 && state_sync >= 100.0 {
        SyncStatus::Synced
    } else {
        SyncStatus::Syncing
    };

    Ok(SyncState {
        chain_sync,
        state_sync,
        chain_eta,
        state_eta,
        overall_progress: chain_sync.min(state_sync),
        blocks,
        peers,
        status,
    })
}

/// Parses a `synced=` value such as `42.50%`.
///
/// Absent or unparseable values are 0. Parsed values are clamped to 0..=100.
fn parse_percentage(raw: Option<&str>) -> CollectorResult<f64> {
    let Some(raw) = raw else {
        return Ok(0.0);
    };

    let value = match raw.trim_end_matches('%').parse::<f64>() {
        Ok(value) => value,
        Err(_) => return Ok(0.0),
    };

    if !value.is_finite() {
        return Err(CollectorError::ParseError {
            metric: "synced".to_string(),
            location: "execution logs".to_string(),
            reason: format!("non-finite percentage: {}", raw),
        });
    }

    Ok(value.clamp(0.0, 100.0))
}

/// Renders an `eta=` value as `"<H>h <M>m"`.
fn format_eta(raw: Option<&str>) -> String {
    let caps = match raw {
        Some(raw) if !raw.is_empty() => ETA_FORMAT.captures(raw),
        _ => None,
    };

    match caps {
        Some(caps) => {
            let hours = caps.get(1).map_or("0", |m| m.as_str());
            let minutes = caps.get(2).map_or("0", |m| m.as_str());
            format!("{}h {}m", hours, minutes)
        }
        None => ETA_COMPUTING.to_string(),
    }
}

fn parse_block_height(line: &str) -> u64 {
    extract_kv(line)
        .get("number")
        .and_then(|number| number.replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// Recent `ERROR`/`WARN` lines of the execution client.
pub fn execution_errors(logs: &LogText) -> Vec<ErrorRecord> {
    scan_error_records(logs, &ERROR_MARKER, EXECUTION_SERVICE, |caps| {
        let level = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        match level {
            Some(level) if level.eq_ignore_ascii_case("error") => ErrorLevel::Error,
            _ => ErrorLevel::Warn,
        }
    })
}

/// Producer for the execution section.
pub struct ExecutionCollector {
    service: String,
    logs: Arc<dyn LogSource>,
    peers: Arc<PeerCountResolver>,
}

impl ExecutionCollector {
    pub fn new(
        service: impl Into<String>,
        logs: Arc<dyn LogSource>,
        peers: Arc<PeerCountResolver>,
    ) -> Self {
        ExecutionCollector {
            service: service.into(),
            logs,
            peers,
        }
    }
}

#[async_trait::async_trait]
impl DataProducer for ExecutionCollector {
    type Output = ExecutionReport;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let logs = self.logs.fetch(&self.service).await;
        let peers = self.peers.resolve(&logs).await;
        let state = parse_sync_state(&logs, peers)?;
        trace!(
            "Execution '{}': chain={} state={} blocks={} peers={}",
            self.service,
            state.chain_sync,
            state.state_sync,
            state.blocks,
            state.peers
        );

        Ok(ExecutionReport {
            state,
            errors: execution_errors(&logs),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::monitor::PeerStrategy,
        core::probe::testing::{ScriptedProbe, StaticLogSource},
    };

    const GETH_SYNCING: &str = "\
INFO [10-19|09:59:58.000] Forkchoice requested sync to new head    number=19,234,560 hash=0x1f..aa
INFO [10-19|10:00:01.000] Syncing: chain download in progress      synced=40.00% chain=120.00GiB headers=19,000,000@5GiB eta=4h1m12.000s
INFO [10-19|10:00:02.000] Syncing: state download in progress      synced=12.31% state=30.00GiB accounts=1,000,000@1GiB eta=12h30m
WARN [10-19|10:00:03.000] Snapshot extension registration failed   peer=ab12cd34 err=\"peer connected on snap without compatible eth support\"
INFO [10-19|10:00:05.000] Looking for peers                        peercount=3 tried=10 static=0
INFO [10-19|10:00:09.000] Syncing: chain download in progress      synced=42.50% chain=125.00GiB headers=19,100,000@5GiB eta=3h15m
INFO [10-19|10:00:10.000] Forkchoice requested sync to new head    number=19,234,567 hash=0x2a..bb
ERROR[10-19|10:00:11.000] Beacon backfilling failed                err=\"retrieved hash chain is invalid\"
";

    #[test]
    fn test_parse_sync_state_uses_latest_lines() {
        let state = parse_sync_state(&LogText::new(GETH_SYNCING), 7).unwrap();

        assert_eq!(state.chain_sync, 42.5);
        assert_eq!(state.chain_eta, "3h 15m");
        assert_eq!(state.state_sync, 12.31);
        assert_eq!(state.state_eta, "12h 30m");
        assert_eq!(state.overall_progress, 12.31);
        assert_eq!(state.blocks, 19_234_567);
        assert_eq!(state.peers, 7);
        assert_eq!(state.status, SyncStatus::Syncing);
    }

    #[test]
    fn test_parse_sync_state_without_sync_lines() {
        let logs = LogText::new("INFO Starting Geth on Ethereum mainnet...\n");
        let state = parse_sync_state(&logs, 0).unwrap();

        assert_eq!(state.chain_sync, 0.0);
        assert_eq!(state.state_sync, 0.0);
        assert_eq!(state.chain_eta, ETA_COMPUTING);
        assert_eq!(state.state_eta, ETA_COMPUTING);
        assert_eq!(state.overall_progress, 0.0);
        assert_eq!(state.blocks, 0);
        assert_eq!(state.status, SyncStatus::Syncing);
    }

    #[test]
    fn test_synced_requires_both_phases() {
        let logs = LogText::new(
            "Syncing: chain download in progress synced=100.00% eta=0s\n\
             Syncing: state download in progress synced=99.99% eta=1m\n",
        );
        let state = parse_sync_state(&logs, 0).unwrap();
        assert_eq!(state.status, SyncStatus::Syncing);
        assert_eq!(state.overall_progress, 99.99);

        let logs = LogText::new(
            "Syncing: chain download in progress synced=100.00% eta=0s\n\
             Syncing: state download in progress synced=100.00% eta=0s\n",
        );
        let state = parse_sync_state(&logs, 0).unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
        assert_eq!(state.chain_eta, "0h 0m");
    }

    #[test]
    fn test_sync_lines_match_case_insensitively() {
        let logs = LogText::new("syncing: CHAIN DOWNLOAD IN PROGRESS synced=55.5% eta=1h2m\n");
        let state = parse_sync_state(&logs, 0).unwrap();
        assert_eq!(state.chain_sync, 55.5);
        assert_eq!(state.chain_eta, "1h 2m");
    }

    #[test]
    fn test_non_finite_percentage_fails_record() {
        let logs = LogText::new("Syncing: chain download in progress synced=NaN% eta=1h\n");
        assert!(matches!(
            parse_sync_state(&logs, 0),
            Err(CollectorError::ParseError { .. })
        ));
    }

    #[test]
    fn test_parse_percentage_defaults() {
        assert_eq!(parse_percentage(None).unwrap(), 0.0);
        assert_eq!(parse_percentage(Some("garbage%")).unwrap(), 0.0);
        assert_eq!(parse_percentage(Some("42.50%")).unwrap(), 42.5);
        assert_eq!(parse_percentage(Some("120%")).unwrap(), 100.0);
    }

    #[test]
    fn test_format_eta_variants() {
        assert_eq!(format_eta(Some("3h15m")), "3h 15m");
        assert_eq!(format_eta(Some("4h1m12.000s")), "4h 1m");
        assert_eq!(format_eta(Some("12m34.5s")), "0h 12m");
        assert_eq!(format_eta(Some("7h")), "7h 0m");
        assert_eq!(format_eta(Some("45s")), "0h 0m");
        assert_eq!(format_eta(Some("unknown")), ETA_COMPUTING);
        assert_eq!(format_eta(Some("")), ETA_COMPUTING);
        assert_eq!(format_eta(None), ETA_COMPUTING);
    }

    #[test]
    fn test_block_height_defaults_to_zero() {
        assert_eq!(parse_block_height("Forkchoice updated hash=0xabc"), 0);
        assert_eq!(parse_block_height("Forkchoice number=1,000"), 1000);
        assert_eq!(parse_block_height("Forkchoice number=abc"), 0);
    }

    #[test]
    fn test_execution_errors_levels_and_order() {
        let records = execution_errors(&LogText::new(GETH_SYNCING));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, ErrorLevel::Warn);
        assert!(records[0].message.contains("Snapshot extension"));
        assert_eq!(records[1].level, ErrorLevel::Error);
        assert!(records[1].message.contains("Beacon backfilling failed"));

        let structured = execution_errors(&LogText::new(
            "ts=1 level=error msg=\"db closed\"\nts=2 level=warn msg=\"slow\"\nts=3 level=info\n",
        ));
        assert_eq!(structured.len(), 2);
        assert_eq!(structured[0].level, ErrorLevel::Error);
        assert_eq!(structured[1].level, ErrorLevel::Warn);
    }

    #[test]
    fn test_execution_errors_logfmt_lvl_key() {
        let logs = LogText::new(
            "t=2024-05-01T10:00:00+0000 lvl=info msg=\"Imported new chain segment\"\n\
             t=2024-05-01T10:00:01+0000 lvl=warn msg=\"Snapshot extension registration failed\"\n\
             t=2024-05-01T10:00:02+0000 lvl=error msg=\"Beacon backfilling failed\"\n",
        );

        let errors = execution_errors(&logs);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].level, ErrorLevel::Warn);
        assert!(errors[0].message.contains("Snapshot extension"));
        assert_eq!(errors[1].level, ErrorLevel::Error);
        assert!(errors[1].message.contains("Beacon backfilling"));
    }

    #[test]
    fn test_degraded_record_shape() {
        let json = serde_json::to_value(SyncState::degraded()).unwrap();
        assert_eq!(json["chainSync"], 0.0);
        assert_eq!(json["chainETA"], "error");
        assert_eq!(json["stateETA"], "error");
        assert_eq!(json["overallProgress"], 0.0);
        assert_eq!(json["blocks"], 0);
        assert_eq!(json["peers"], 0);
        assert_eq!(json["status"], "ERROR");
    }

    #[tokio::test]
    async fn test_collector_uses_log_strategy_peers() {
        let logs = Arc::new(StaticLogSource::new().with("geth", GETH_SYNCING));
        let peers = Arc::new(PeerCountResolver::new(
            PeerStrategy::Logs,
            "geth",
            Arc::new(ScriptedProbe::new()),
            Duration::from_secs(3),
        ));
        let collector = ExecutionCollector::new("geth", logs, peers);

        let report = collector.produce().await.unwrap();
        assert_eq!(report.state.peers, 3);
        assert_eq!(report.state.blocks, 19_234_567);
        assert_eq!(report.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_collector_without_logs_reports_defaults() {
        let peers = Arc::new(PeerCountResolver::new(
            PeerStrategy::Lsof,
            "geth",
            Arc::new(ScriptedProbe::new()),
            Duration::from_secs(3),
        ));
        let collector = ExecutionCollector::new("geth", Arc::new(StaticLogSource::new()), peers);

        let report = collector.produce().await.unwrap();
        assert_eq!(report.state.peers, 0);
        assert_eq!(report.state.chain_eta, ETA_COMPUTING);
        assert!(report.errors.is_empty());
    }
}
