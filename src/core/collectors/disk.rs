use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ram::percentage, traits::DataProducer, types::CollectorResult};
use crate::core::probe::{first_success, CommandProbe, ProbeAttempt};

const DF_TIMEOUT: Duration = Duration::from_secs(2);

/// Usage of the root filesystem in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

/// Parses `df -B1 /` output.
///
/// ```text
/// Filesystem        1B-blocks          Used     Available Use% Mounted on
/// /dev/nvme0n1p2 1967317549056 1234567890123  632673234944  67% /
/// ```
///
/// The last line is the data line. Columns are read from the right so that a
/// filesystem name wrapped onto its own line still parses. Fewer than five
/// columns, or non-numeric sizes, mean the output is not recognized.
pub fn parse_df(output: &str) -> Option<DiskUsage> {
    let data = output.lines().rev().find(|line| !line.trim().is_empty())?;
    let cols: Vec<&str> = data.split_whitespace().collect();
    if cols.len() < 5 {
        return None;
    }

    let total: u64 = cols[cols.len() - 5].parse().ok()?;
    let used: u64 = cols[cols.len() - 4].parse().ok()?;

    Some(DiskUsage {
        used,
        total,
        percentage: percentage(used, total),
    })
}

/// Measures `/` with `df`. Unrecognized output or a failed probe yields
/// `None`, never an error.
pub struct DiskUsageCollector {
    probe: Arc<dyn CommandProbe>,
}

impl DiskUsageCollector {
    pub fn new(probe: Arc<dyn CommandProbe>) -> Self {
        DiskUsageCollector { probe }
    }
}

#[async_trait::async_trait]
impl DataProducer for DiskUsageCollector {
    type Output = Option<DiskUsage>;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let attempts = [ProbeAttempt::new("df", &["-B1", "/"])];
        match first_success(self.probe.as_ref(), &attempts, DF_TIMEOUT).await {
            Ok(output) => {
                let usage = parse_df(&output);
                if usage.is_none() {
                    debug!("Unrecognized df output: {}", output.trim());
                }
                Ok(usage)
            }
            Err(e) => {
                debug!("Disk usage unavailable: {}", e);
                Ok(None)
            }
        }
    }
}
