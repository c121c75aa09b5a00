use std::{
    sync::Arc,
    time::Duration,
};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{error::CollectorError, types::CollectorResult};
use crate::{
    config::monitor::PeerStrategy,
    core::{
        cache::TtlCache,
        logtext::LogText,
        probe::{first_success, CommandProbe, ProbeAttempt},
    },
};

/// Every strategy shares this key, so a cached count is reused regardless of
/// which strategy produced it. The strategy is fixed for the process
/// lifetime.
pub const PEERS_CACHE_KEY: &str = "execution_peers";

const PID_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);
const LSOF_TIMEOUT: Duration = Duration::from_secs(2);
const SOCKET_TABLE_TIMEOUT: Duration = Duration::from_secs(1);

static PEER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:peercount|peers|connected_peers)=(\d+)").expect("static regex")
});

/// Measures the execution client's peer count with the configured strategy.
///
/// Results, failures included, are cached for the TTL so that polling the
/// status endpoint does not hammer `lsof`/`ss`. A failing strategy yields 0;
/// there is no fallback to another strategy.
pub struct PeerCountResolver {
    strategy: PeerStrategy,
    process: String,
    probe: Arc<dyn CommandProbe>,
    cache: Mutex<TtlCache<&'static str, u64>>,
}

impl PeerCountResolver {
    pub fn new(
        strategy: PeerStrategy,
        process: impl Into<String>,
        probe: Arc<dyn CommandProbe>,
        ttl: Duration,
    ) -> Self {
        Self::with_cache(strategy, process, probe, TtlCache::new(ttl))
    }

    /// Builds a resolver around a caller-supplied cache (e.g. one driven by a
    /// manual clock).
    pub fn with_cache(
        strategy: PeerStrategy,
        process: impl Into<String>,
        probe: Arc<dyn CommandProbe>,
        cache: TtlCache<&'static str, u64>,
    ) -> Self {
        PeerCountResolver {
            strategy,
            process: process.into(),
            probe,
            cache: Mutex::new(cache),
        }
    }

    pub fn strategy(&self) -> PeerStrategy {
        self.strategy
    }

    /// Current peer count. `logs` is only consulted by the log strategy.
    ///
    /// The cache lock is held across the measurement, so concurrent callers
    /// wait for one probe run instead of each starting their own.
    pub async fn resolve(&self, logs: &LogText) -> u64 {
        let mut cache = self.cache.lock().await;
        if let Some(count) = cache.get(&PEERS_CACHE_KEY) {
            trace!("Peer count served from cache: {}", count);
            return count;
        }

        let measured = match self.strategy {
            PeerStrategy::Lsof => self.count_with_lsof().await,
            PeerStrategy::Netstat => self.count_with_socket_table().await,
            PeerStrategy::Logs => Ok(count_from_logs(logs)),
        };

        let count = measured.unwrap_or_else(|e| {
            debug!("Peer count via {} failed: {}", self.strategy, e);
            0
        });

        cache.set(PEERS_CACHE_KEY, count);
        count
    }

    async fn count_with_lsof(&self) -> CollectorResult<u64> {
        let lookup = [
            ProbeAttempt::new("pgrep", &["-x", self.process.as_str()]),
            ProbeAttempt::new("pidof", &[self.process.as_str()]),
        ];
        let pids = first_success(self.probe.as_ref(), &lookup, PID_LOOKUP_TIMEOUT).await?;
        let pid = first_pid(&pids).ok_or_else(|| CollectorError::ParseError {
            metric: "pid".to_string(),
            location: "pgrep/pidof".to_string(),
            reason: format!("no pid in output: {}", pids.trim()),
        })?;

        let pid = pid.to_string();
        let listing = [ProbeAttempt::new(
            "lsof",
            &["-nP", "-a", "-p", pid.as_str(), "-iTCP", "-sTCP:ESTABLISHED"],
        )];
        let output = first_success(self.probe.as_ref(), &listing, LSOF_TIMEOUT).await?;
        Ok(count_lsof_connections(&output))
    }

    async fn count_with_socket_table(&self) -> CollectorResult<u64> {
        let attempts = [
            ProbeAttempt::new("ss", &["-Htnp", "state", "established"]),
            ProbeAttempt::new("netstat", &["-tnp"]),
        ];
        let output = first_success(self.probe.as_ref(), &attempts, SOCKET_TABLE_TIMEOUT).await?;
        Ok(count_socket_table(&output, &self.process))
    }
}

fn first_pid(output: &str) -> Option<u32> {
    output.split_whitespace().next()?.parse().ok()
}

/// Counts connection rows of `lsof` output, skipping the header.
fn count_lsof_connections(output: &str) -> u64 {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("COMMAND"))
        .count() as u64
}

/// Counts established TCP sessions owned by `process` in `ss -Htnp` or
/// `netstat -tnp` output.
fn count_socket_table(output: &str, process: &str) -> u64 {
    let ss_owner = format!("\"{}\"", process);
    let netstat_owner = format!("/{}", process);

    output
        .lines()
        .filter(|line| {
            line.contains(&ss_owner)
                || (line.contains("ESTABLISHED")
                    && line
                        .split_whitespace()
                        .any(|field| field.ends_with(&netstat_owner)))
        })
        .count() as u64
}

/// Peer count from the most recent peer-count token in the log window.
fn count_from_logs(logs: &LogText) -> u64 {
    logs.last_matching(&PEER_TOKEN)
        .and_then(|line| PEER_TOKEN.captures_iter(line).last())
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::{cache::ManualClock, probe::testing::ScriptedProbe};

    const LSOF_OUTPUT: &str = "\
COMMAND  PID USER   FD   TYPE  DEVICE SIZE/OFF NODE NAME
geth    4242 geth   12u  IPv4 1234567      0t0  TCP 10.0.0.5:30303->1.2.3.4:51234 (ESTABLISHED)
geth    4242 geth   13u  IPv4 1234568      0t0  TCP 10.0.0.5:30303->5.6.7.8:40001 (ESTABLISHED)
geth    4242 geth   14u  IPv6 1234569      0t0  TCP [::1]:8551->[::1]:53422 (ESTABLISHED)
";

    const SS_OUTPUT: &str = "\
0      0      10.0.0.5:30303     1.2.3.4:51234     users:((\"geth\",pid=4242,fd=12))
0      0      10.0.0.5:30303     5.6.7.8:40001     users:((\"geth\",pid=4242,fd=13))
0      0      10.0.0.5:13000     9.9.9.9:13000     users:((\"beacon-chain\",pid=777,fd=40))
";

    const NETSTAT_OUTPUT: &str = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 10.0.0.5:30303          1.2.3.4:51234           ESTABLISHED 4242/geth
tcp        0      0 10.0.0.5:30303          5.6.7.8:40001           TIME_WAIT   -
tcp        0      0 10.0.0.5:13000          9.9.9.9:13000           ESTABLISHED 777/beacon-chain
";

    fn resolver(
        strategy: PeerStrategy,
        probe: ScriptedProbe,
    ) -> (PeerCountResolver, Arc<ScriptedProbe>, Arc<ManualClock>) {
        let probe = Arc::new(probe);
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(Duration::from_secs(3), clock.clone());
        let resolver = PeerCountResolver::with_cache(strategy, "geth", probe.clone(), cache);
        (resolver, probe, clock)
    }

    #[test]
    fn test_count_lsof_connections_skips_header() {
        assert_eq!(count_lsof_connections(LSOF_OUTPUT), 3);
        assert_eq!(count_lsof_connections(""), 0);
    }

    #[test]
    fn test_count_socket_table_ss_and_netstat() {
        assert_eq!(count_socket_table(SS_OUTPUT, "geth"), 2);
        assert_eq!(count_socket_table(NETSTAT_OUTPUT, "geth"), 1);
        assert_eq!(count_socket_table(NETSTAT_OUTPUT, "beacon-chain"), 1);
        assert_eq!(count_socket_table(SS_OUTPUT, "reth"), 0);
    }

    #[test]
    fn test_count_from_logs_last_token_wins() {
        let logs = LogText::new(
            "Looking for peers peercount=1 tried=10 static=0\n\
             Imported new potential chain segment number=100\n\
             Looking for peers peercount=7 tried=3 static=0\n\
             Imported new potential chain segment number=101\n",
        );
        assert_eq!(count_from_logs(&logs), 7);
        assert_eq!(count_from_logs(&LogText::empty()), 0);
    }

    #[test]
    fn test_count_from_logs_other_token_names() {
        let logs = LogText::new("Status connected_peers=12 latest_block=200\n");
        assert_eq!(count_from_logs(&logs), 12);
    }

    #[tokio::test]
    async fn test_lsof_strategy_counts_connections() {
        let probe = ScriptedProbe::new()
            .respond("pgrep", "4242\n4243\n")
            .respond("lsof", LSOF_OUTPUT);
        let (resolver, probe, _clock) = resolver(PeerStrategy::Lsof, probe);

        assert_eq!(resolver.resolve(&LogText::empty()).await, 3);
        let calls = probe.calls();
        assert_eq!(calls[0], "pgrep -x geth");
        assert_eq!(calls[1], "lsof -nP -a -p 4242 -iTCP -sTCP:ESTABLISHED");
    }

    #[tokio::test]
    async fn test_lsof_strategy_pidof_fallback() {
        let probe = ScriptedProbe::new()
            .fail("pgrep")
            .respond("pidof", "4242")
            .respond("lsof", LSOF_OUTPUT);
        let (resolver, _probe, _clock) = resolver(PeerStrategy::Lsof, probe);

        assert_eq!(resolver.resolve(&LogText::empty()).await, 3);
    }

    #[tokio::test]
    async fn test_lsof_strategy_missing_process_is_zero_without_fallback() {
        let logs = LogText::new("Looking for peers peercount=9\n");
        let (resolver, probe, _clock) = resolver(PeerStrategy::Lsof, ScriptedProbe::new());

        assert_eq!(resolver.resolve(&logs).await, 0);
        assert!(!probe.calls().iter().any(|c| c.starts_with("lsof")));
    }

    #[tokio::test]
    async fn test_netstat_strategy_falls_back_from_ss() {
        let probe = ScriptedProbe::new()
            .fail("ss")
            .respond("netstat", NETSTAT_OUTPUT);
        let (resolver, _probe, _clock) = resolver(PeerStrategy::Netstat, probe);

        assert_eq!(resolver.resolve(&LogText::empty()).await, 1);
        assert_eq!(resolver.strategy(), PeerStrategy::Netstat);
    }

    #[tokio::test]
    async fn test_cached_value_reused_within_ttl() {
        let probe = ScriptedProbe::new().respond("ss", SS_OUTPUT);
        let (resolver, probe, clock) = resolver(PeerStrategy::Netstat, probe);

        assert_eq!(resolver.resolve(&LogText::empty()).await, 2);
        clock.advance(Duration::from_secs(2));
        assert_eq!(resolver.resolve(&LogText::empty()).await, 2);
        assert_eq!(probe.calls().len(), 1);

        clock.advance(Duration::from_secs(2));
        assert_eq!(resolver.resolve(&LogText::empty()).await, 2);
        assert_eq!(probe.calls().len(), 2);
    }

    /// Answers every attempt with `ss` output after a short delay.
    struct SlowSocketTable {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CommandProbe for SlowSocketTable {
        async fn run(
            &self,
            _attempt: &ProbeAttempt,
            _timeout: Duration,
        ) -> CollectorResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(SS_OUTPUT.to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_measurement() {
        let probe = Arc::new(SlowSocketTable {
            calls: AtomicUsize::new(0),
        });
        let resolver = PeerCountResolver::new(
            PeerStrategy::Netstat,
            "geth",
            probe.clone(),
            Duration::from_secs(3),
        );
        let logs = LogText::empty();

        let (a, b, c) = tokio::join!(
            resolver.resolve(&logs),
            resolver.resolve(&logs),
            resolver.resolve(&logs)
        );
        assert_eq!((a, b, c), (2, 2, 2));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logs_strategy_uses_cache() {
        let (resolver, probe, clock) = resolver(PeerStrategy::Logs, ScriptedProbe::new());

        let first = LogText::new("Looking for peers peercount=4\n");
        let second = LogText::new("Looking for peers peercount=11\n");

        assert_eq!(resolver.resolve(&first).await, 4);
        assert_eq!(resolver.resolve(&second).await, 4);
        clock.advance(Duration::from_secs(3));
        assert_eq!(resolver.resolve(&second).await, 11);
        assert!(probe.calls().is_empty());
    }
}
