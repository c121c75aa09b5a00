use serde::{Deserialize, Serialize};

use super::{error::CollectorError, traits::DataProducer, types::CollectorResult};

const LOADAVG_PATH: &str = "/proc/loadavg";

/// System load average over the usual three windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1m")]
    pub one_minute: f64,
    #[serde(rename = "5m")]
    pub five_minutes: f64,
    #[serde(rename = "15m")]
    pub fifteen_minutes: f64,
}

fn parse_field(parts: &[&str], index: usize, metric: &str) -> CollectorResult<f64> {
    parts[index]
        .parse::<f64>()
        .map_err(|_| CollectorError::ParseError {
            metric: metric.to_string(),
            location: LOADAVG_PATH.to_string(),
            reason: format!("invalid value: {}", parts[index]),
        })
}

/// Parses `/proc/loadavg`, e.g. `"1.23 1.45 1.67 1/234 12345"`.
pub fn parse_loadavg(content: &str) -> CollectorResult<LoadAverage> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(CollectorError::InvalidFormat {
            location: LOADAVG_PATH.to_string(),
            reason: "Expected at least 3 fields".to_string(),
        });
    }

    Ok(LoadAverage {
        one_minute: parse_field(&parts, 0, "one_minute")?,
        five_minutes: parse_field(&parts, 1, "five_minutes")?,
        fifteen_minutes: parse_field(&parts, 2, "fifteen_minutes")?,
    })
}

/// Collector for `/proc/loadavg`.
#[derive(Debug, Clone, Default)]
pub struct LoadAverageCollector;

impl LoadAverageCollector {
    pub fn new() -> Self {
        LoadAverageCollector
    }
}

#[async_trait::async_trait]
impl DataProducer for LoadAverageCollector {
    type Output = LoadAverage;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let content = tokio::fs::read_to_string(LOADAVG_PATH)
            .await
            .map_err(|source| CollectorError::FileRead {
                path: LOADAVG_PATH.to_string(),
                source,
            })?;

        parse_loadavg(&content)
    }
}
