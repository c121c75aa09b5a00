//! Block-device and CPU share statistics from `iostat -k`.
//!
//! Columns are located by their header names rather than by position, so
//! sysstat releases without the discard columns parse as well (the missing
//! values read as 0).

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{round2, traits::DataProducer, types::CollectorResult};
use crate::core::probe::{first_success, CommandProbe, ProbeAttempt};

const IOSTAT_TIMEOUT: Duration = Duration::from_secs(2);

/// CPU time split as reported in the `avg-cpu` block, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuShare {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub iowait: f64,
    pub steal: f64,
    pub idle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStat {
    pub name: String,
    pub tps: f64,
    pub kb_read_per_sec: f64,
    pub kb_written_per_sec: f64,
    pub kb_discarded_per_sec: f64,
    pub kb_read: f64,
    pub kb_written: f64,
    pub kb_discarded: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoStat {
    pub cpu: CpuShare,
    pub devices: Vec<DeviceStat>,
}

/// Header row mapped to column positions.
struct Columns<'a> {
    index: HashMap<&'a str, usize>,
}

impl<'a> Columns<'a> {
    fn new(header: impl Iterator<Item = &'a str>) -> Self {
        Columns {
            index: header.enumerate().map(|(i, name)| (name, i)).collect(),
        }
    }

    /// Value of column `name` in `values`, rounded; 0 when the column is
    /// missing or unparseable. Locales printing decimal commas are accepted.
    fn value(&self, values: &[&str], name: &str) -> f64 {
        self.index
            .get(name)
            .and_then(|&i| values.get(i))
            .and_then(|raw| raw.replace(',', ".").parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map(round2)
            .unwrap_or(0.0)
    }
}

fn parse_cpu_share(header: &str, values: &str) -> CpuShare {
    let columns = Columns::new(header.split_whitespace());
    let values: Vec<&str> = values.split_whitespace().collect();

    CpuShare {
        user: columns.value(&values, "%user"),
        nice: columns.value(&values, "%nice"),
        system: columns.value(&values, "%system"),
        iowait: columns.value(&values, "%iowait"),
        steal: columns.value(&values, "%steal"),
        idle: columns.value(&values, "%idle"),
    }
}

fn parse_device(columns: &Columns<'_>, line: &str) -> Option<DeviceStat> {
    let values: Vec<&str> = line.split_whitespace().collect();
    let name = values.first()?;

    Some(DeviceStat {
        name: name.to_string(),
        tps: columns.value(&values, "tps"),
        kb_read_per_sec: columns.value(&values, "kB_read/s"),
        kb_written_per_sec: columns.value(&values, "kB_wrtn/s"),
        kb_discarded_per_sec: columns.value(&values, "kB_dscd/s"),
        kb_read: columns.value(&values, "kB_read"),
        kb_written: columns.value(&values, "kB_wrtn"),
        kb_discarded: columns.value(&values, "kB_dscd"),
    })
}

/// Parses the report printed by `iostat -k`.
///
/// Returns `None` when neither an `avg-cpu` block nor a device table is
/// present.
pub fn parse_iostat(output: &str) -> Option<IoStat> {
    let mut lines = output.lines().map(str::trim);
    let mut cpu = None;
    let mut devices = Vec::new();
    let mut seen_devices = false;

    while let Some(line) = lines.next() {
        if let Some(header) = line.strip_prefix("avg-cpu:") {
            if let Some(values) = lines.by_ref().find(|l| !l.is_empty()) {
                cpu = Some(parse_cpu_share(header, values));
            }
        } else if line.starts_with("Device") {
            seen_devices = true;
            let columns = Columns::new(line.split_whitespace());
            devices.extend(
                lines
                    .by_ref()
                    .take_while(|l| !l.is_empty())
                    .filter_map(|l| parse_device(&columns, l)),
            );
        }
    }

    if cpu.is_none() && !seen_devices {
        return None;
    }

    Some(IoStat {
        cpu: cpu.unwrap_or_default(),
        devices,
    })
}

/// Runs `iostat -k`; a missing tool or unrecognized report omits the section.
pub struct IoStatCollector {
    probe: Arc<dyn CommandProbe>,
}

impl IoStatCollector {
    pub fn new(probe: Arc<dyn CommandProbe>) -> Self {
        IoStatCollector { probe }
    }
}

#[async_trait::async_trait]
impl DataProducer for IoStatCollector {
    type Output = Option<IoStat>;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let attempts = [ProbeAttempt::new("iostat", &["-k"])];
        match first_success(self.probe.as_ref(), &attempts, IOSTAT_TIMEOUT).await {
            Ok(output) => Ok(parse_iostat(&output)),
            Err(e) => {
                debug!("I/O statistics unavailable: {}", e);
                Ok(None)
            }
        }
    }
}
