use super::{error::CollectorError, traits::DataProducer, types::CollectorResult};

const STAT_PATH: &str = "/proc/stat";

/// Counts per-core `cpuN` lines in `/proc/stat`, skipping the aggregate `cpu`
/// line.
pub fn count_cores(content: &str) -> CollectorResult<u32> {
    let cores = content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|label| {
            label
                .strip_prefix("cpu")
                .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        })
        .count() as u32;

    if cores == 0 {
        return Err(CollectorError::MissingField {
            field: "cpuN".to_string(),
            location: STAT_PATH.to_string(),
        });
    }

    Ok(cores)
}

/// Collector for the number of CPU cores online.
#[derive(Debug, Clone, Default)]
pub struct CpuCoreCollector;

impl CpuCoreCollector {
    pub fn new() -> Self {
        CpuCoreCollector
    }
}

#[async_trait::async_trait]
impl DataProducer for CpuCoreCollector {
    type Output = u32;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let content = tokio::fs::read_to_string(STAT_PATH)
            .await
            .map_err(|source| CollectorError::FileRead {
                path: STAT_PATH.to_string(),
                source,
            })?;

        count_cores(&content)
    }
}
