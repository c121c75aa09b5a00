use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    avg::{LoadAverage, LoadAverageCollector},
    cpu::CpuCoreCollector,
    disk::{DiskUsage, DiskUsageCollector},
    iostat::{IoStat, IoStatCollector},
    ram::{MemoryCollector, MemoryUsage},
    traits::DataProducer,
    types::CollectorResult,
    uptime::{UptimeCollector, UptimeInfo},
};
use crate::core::probe::CommandProbe;

/// Host resources section of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub memory: MemoryUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskUsage>,
    pub load: LoadAverage,
    pub cpu_cores: u32,
    pub uptime: UptimeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iostat: Option<IoStat>,
}

impl ResourceSnapshot {
    /// All zeros; disk and I/O statistics absent.
    pub fn degraded() -> Self {
        ResourceSnapshot::default()
    }
}

/// Combines the `/proc` readers with the `df` and `iostat` probes.
///
/// Any `/proc` failure fails the section. Disk and I/O statistics are
/// optional and only ever come back as `None`.
pub struct SystemCollector {
    memory: MemoryCollector,
    load: LoadAverageCollector,
    cores: CpuCoreCollector,
    uptime: UptimeCollector,
    disk: DiskUsageCollector,
    iostat: IoStatCollector,
}

impl SystemCollector {
    pub fn new(probe: Arc<dyn CommandProbe>) -> Self {
        SystemCollector {
            memory: MemoryCollector::new(),
            load: LoadAverageCollector::new(),
            cores: CpuCoreCollector::new(),
            uptime: UptimeCollector::new(),
            disk: DiskUsageCollector::new(probe.clone()),
            iostat: IoStatCollector::new(probe),
        }
    }
}

#[async_trait::async_trait]
impl DataProducer for SystemCollector {
    type Output = ResourceSnapshot;

    async fn produce(&self) -> CollectorResult<Self::Output> {
        let (memory, load, cores, uptime, disk, iostat) = tokio::join!(
            self.memory.produce(),
            self.load.produce(),
            self.cores.produce(),
            self.uptime.produce(),
            self.disk.produce(),
            self.iostat.produce(),
        );

        let snapshot = ResourceSnapshot {
            memory: memory?,
            disk: disk?,
            load: load?,
            cpu_cores: cores?,
            uptime: uptime?,
            iostat: iostat?,
        };
        trace!(
            "System: mem={}% cores={} disk={}",
            snapshot.memory.percentage,
            snapshot.cpu_cores,
            snapshot.disk.is_some()
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probe::testing::ScriptedProbe;

    #[test]
    fn test_degraded_omits_optional_sections() {
        let json = serde_json::to_value(ResourceSnapshot::degraded()).unwrap();
        assert_eq!(json["memory"]["total"], 0);
        assert_eq!(json["cpuCores"], 0);
        assert_eq!(json["uptime"]["formatted"], "");
        assert!(json.get("disk").is_none());
        assert!(json.get("iostat").is_none());
    }

    #[tokio::test]
    async fn test_collects_from_proc_without_probes() {
        if !std::path::Path::new("/proc/meminfo").exists() {
            return;
        }
        let collector = SystemCollector::new(Arc::new(ScriptedProbe::new()));
        let snapshot = collector.produce().await.unwrap();

        assert!(snapshot.memory.total > 0);
        assert!(snapshot.cpu_cores >= 1);
        assert_eq!(snapshot.disk, None);
        assert_eq!(snapshot.iostat, None);
    }
}
