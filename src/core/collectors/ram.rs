use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{error::CollectorError, traits::DataProducer, types::CollectorResult};

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Physical memory usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// `MemTotal - MemAvailable`. Memory the kernel could not hand out right
    /// now without swapping.
    pub used: u64,
    pub total: u64,
    /// `used / total * 100`, rounded to two decimals.
    pub percentage: f64,
}

/// Parses the contents of `/proc/meminfo`.
///
/// The file has a "key: value unit" format with values in kB:
/// ```text
/// MemTotal:       16384000 kB
/// MemFree:         8192000 kB
/// MemAvailable:   12288000 kB
/// ```
///
/// `MemTotal` is required. `MemAvailable` is missing on very old kernels; in
/// that case `MemFree + Buffers + Cached` is used as the available estimate.
pub fn parse_meminfo(content: &str) -> CollectorResult<MemoryUsage> {
    let mut mem_map: HashMap<&str, u64> = HashMap::with_capacity(64);

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };

        if let Some(Ok(value)) = rest.split_whitespace().next().map(str::parse::<u64>) {
            mem_map.insert(key.trim(), value);
        }
    }

    let total_kb = mem_map
        .get("MemTotal")
        .copied()
        .ok_or(CollectorError::MissingField {
            field: "MemTotal".to_string(),
            location: MEMINFO_PATH.to_string(),
        })?;

    let available_kb = match mem_map.get("MemAvailable") {
        Some(available) => *available,
        None => ["MemFree", "Buffers", "Cached"]
            .iter()
            .filter_map(|key| mem_map.get(key))
            .sum(),
    };

    let total = total_kb * 1024;
    let used = total_kb.saturating_sub(available_kb) * 1024;

    Ok(MemoryUsage {
        used,
        total,
        percentage: percentage(used, total),
    })
}

/// `part / whole * 100` rounded to two decimals; 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    super::round2(part as f64 / whole as f64 * 100.0)
}

/// Reads memory usage from `/proc/meminfo`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollector;

impl MemoryCollector {
    pub fn new() -> Self {
        MemoryCollector
    }
}

#[async_trait::async_trait]
impl DataProducer for MemoryCollector {
    type Output = MemoryUsage;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let content = tokio::fs::read_to_string(MEMINFO_PATH)
            .await
            .map_err(|source| CollectorError::FileRead {
                path: MEMINFO_PATH.to_string(),
                source,
            })?;

        parse_meminfo(&content)
    }
}
