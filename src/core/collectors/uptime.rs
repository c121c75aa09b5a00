use serde::{Deserialize, Serialize};

use super::{error::CollectorError, traits::DataProducer, types::CollectorResult};

const UPTIME_PATH: &str = "/proc/uptime";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Time since boot, whole seconds, with its calendar breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeInfo {
    pub seconds: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub secs: u64,
    /// `"3d 4h 5m"`, `"4h 5m"` or `"5m"`: leading zero units are omitted.
    pub formatted: String,
}

impl UptimeInfo {
    pub fn from_seconds(seconds: u64) -> Self {
        let days = seconds / DAY;
        let hours = (seconds % DAY) / HOUR;
        let minutes = (seconds % HOUR) / MINUTE;

        let formatted = if days > 0 {
            format!("{}d {}h {}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}m", minutes)
        };

        UptimeInfo {
            seconds,
            days,
            hours,
            minutes,
            secs: seconds % MINUTE,
            formatted,
        }
    }
}

/// Parses `/proc/uptime` (`"123456.78 987654.32"`); only the first field,
/// uptime in seconds, is used. Fractions are truncated.
pub fn parse_uptime(content: &str) -> CollectorResult<UptimeInfo> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| CollectorError::InvalidFormat {
            location: UPTIME_PATH.to_string(),
            reason: "Expected at least 1 field".to_string(),
        })?;

    let uptime_seconds = first
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .ok_or_else(|| CollectorError::ParseError {
            metric: "uptime_seconds".to_string(),
            location: UPTIME_PATH.to_string(),
            reason: format!("invalid value: {}", first),
        })?;

    Ok(UptimeInfo::from_seconds(uptime_seconds as u64))
}

/// Collector for `/proc/uptime`.
#[derive(Debug, Clone, Default)]
pub struct UptimeCollector;

impl UptimeCollector {
    pub fn new() -> Self {
        UptimeCollector
    }
}

#[async_trait::async_trait]
impl DataProducer for UptimeCollector {
    type Output = UptimeInfo;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let content = tokio::fs::read_to_string(UPTIME_PATH)
            .await
            .map_err(|source| CollectorError::FileRead {
                path: UPTIME_PATH.to_string(),
                source,
            })?;

        parse_uptime(&content)
    }
}
