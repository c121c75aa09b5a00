//! External command probes and log retrieval.
//!
//! Every subprocess the status producers rely on (`pgrep`, `lsof`, `ss`,
//! `df`, `iostat`, `journalctl`, ...) runs through [`CommandProbe`] with an
//! explicit timeout. A probe that times out, exits unsuccessfully, or prints
//! nothing is a failed probe. Alternatives are expressed as an ordered list of
//! [`ProbeAttempt`]s where the first success wins.

use std::{process::Stdio, sync::Arc, time::Duration};

use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    collectors::{error::CollectorError, types::CollectorResult},
    logtext::LogText,
};

/// One concrete command line to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub program: String,
    pub args: Vec<String>,
    /// Capture stderr interleaved with stdout through one pipe, in write
    /// order. Needed for sources like `docker logs` that replay the
    /// container's stderr on stderr.
    pub merge_stderr: bool,
}

impl ProbeAttempt {
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        ProbeAttempt {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            merge_stderr: false,
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    /// Human readable form used in logs and error messages.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Runs a single probe attempt under a time box.
#[async_trait::async_trait]
pub trait CommandProbe: Send + Sync {
    /// Returns the captured output, or an error if the command could not be
    /// spawned, timed out, exited unsuccessfully, or printed nothing.
    async fn run(&self, attempt: &ProbeAttempt, timeout: Duration) -> CollectorResult<String>;
}

/// [`CommandProbe`] backed by real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

#[async_trait::async_trait]
impl CommandProbe for SystemProbe {
    async fn run(&self, attempt: &ProbeAttempt, timeout: Duration) -> CollectorResult<String> {
        let command = attempt.command_line();
        trace!("Running probe: {}", command);

        let mut cmd = if attempt.merge_stderr {
            // Both streams share the stdout pipe so lines keep their order.
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(r#"exec "$0" "$@" 2>&1"#)
                .arg(&attempt.program)
                .args(&attempt.args);
            cmd
        } else {
            let mut cmd = Command::new(&attempt.program);
            cmd.args(&attempt.args);
            cmd
        };
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| CollectorError::CommandExecution {
                command: command.clone(),
                source,
            })?,
            Err(_) => return Err(CollectorError::Timeout { command, timeout }),
        };

        if !output.status.success() {
            return Err(CollectorError::CommandFailed {
                command,
                reason: format!("exit status {}", output.status),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        if text.trim().is_empty() {
            return Err(CollectorError::CommandFailed {
                command,
                reason: "empty output".to_string(),
            });
        }

        Ok(text)
    }
}

/// Tries each attempt in order and returns the first usable output.
///
/// Each attempt gets its own `timeout`. The error of the last attempt is
/// returned when all of them fail.
pub async fn first_success(
    probe: &dyn CommandProbe,
    attempts: &[ProbeAttempt],
    timeout: Duration,
) -> CollectorResult<String> {
    let mut last_error = None;

    for attempt in attempts {
        match probe.run(attempt, timeout).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                debug!("Probe attempt '{}' failed: {}", attempt.command_line(), e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CollectorError::Other("no probe attempts given".to_string())))
}

/// Supplies the recent log window of a named service.
///
/// Retrieval never fails: an unknown service or an empty buffer yields an
/// empty [`LogText`].
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch(&self, service: &str) -> LogText;
}

/// Reads logs from journald, falling back to `docker logs`.
pub struct CommandLogSource {
    probe: Arc<dyn CommandProbe>,
    lines: usize,
    timeout: Duration,
}

impl CommandLogSource {
    pub fn new(probe: Arc<dyn CommandProbe>, lines: usize, timeout: Duration) -> Self {
        CommandLogSource {
            probe,
            lines,
            timeout,
        }
    }

    fn attempts(&self, service: &str) -> Vec<ProbeAttempt> {
        let lines = self.lines.to_string();
        vec![
            ProbeAttempt::new(
                "journalctl",
                &["-u", service, "-n", lines.as_str(), "--no-pager", "-o", "cat"],
            ),
            ProbeAttempt::new("docker", &["logs", "--tail", lines.as_str(), service]).with_stderr(),
        ]
    }
}

#[async_trait::async_trait]
impl LogSource for CommandLogSource {
    async fn fetch(&self, service: &str) -> LogText {
        match first_success(self.probe.as_ref(), &self.attempts(service), self.timeout).await {
            Ok(text) => {
                let logs = LogText::from(text);
                trace!("Fetched {} log lines for '{}'", logs.len(), service);
                logs
            }
            Err(e) => {
                debug!("No logs available for '{}': {}", service, e);
                LogText::empty()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::ScriptedProbe, *};

    #[test]
    fn test_command_line_rendering() {
        let attempt = ProbeAttempt::new("ss", &["-Htnp", "state", "established"]);
        assert_eq!(attempt.command_line(), "ss -Htnp state established");
        assert!(!attempt.merge_stderr);

        let bare = ProbeAttempt::new::<&str>("iostat", &[]);
        assert_eq!(bare.command_line(), "iostat");
        assert!(bare.with_stderr().merge_stderr);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let probe = ScriptedProbe::new()
            .fail("pgrep")
            .respond("pidof", "4242\n")
            .respond("never", "unused");
        let attempts = vec![
            ProbeAttempt::new("pgrep", &["-x", "geth"]),
            ProbeAttempt::new("pidof", &["geth"]),
            ProbeAttempt::new::<&str>("never", &[]),
        ];

        let output = first_success(&probe, &attempts, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output, "4242\n");
        assert_eq!(probe.calls(), vec!["pgrep -x geth", "pidof geth"]);
    }

    #[tokio::test]
    async fn test_first_success_all_fail_returns_last_error() {
        let probe = ScriptedProbe::new();
        let attempts = vec![ProbeAttempt::new("ss", &["-Htnp"])];

        let result = first_success(&probe, &attempts, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CollectorError::CommandFailed { .. })));

        let result = first_success(&probe, &[], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CollectorError::Other(_))));
    }

    #[tokio::test]
    async fn test_log_source_falls_back_to_docker() {
        let probe = Arc::new(
            ScriptedProbe::new()
                .fail("journalctl")
                .respond("docker", "line one\nline two\n"),
        );
        let source = CommandLogSource::new(probe.clone(), 200, Duration::from_secs(5));

        let logs = source.fetch("geth").await;
        assert_eq!(logs.len(), 2);

        let calls = probe.calls();
        assert_eq!(calls[0], "journalctl -u geth -n 200 --no-pager -o cat");
        assert_eq!(calls[1], "docker logs --tail 200 geth");
    }

    #[tokio::test]
    async fn test_log_source_failure_yields_empty_text() {
        let source = CommandLogSource::new(
            Arc::new(ScriptedProbe::new()),
            100,
            Duration::from_secs(5),
        );
        assert!(source.fetch("missing").await.is_empty());
    }

    #[tokio::test]
    async fn test_system_probe_captures_stdout() {
        let attempt = ProbeAttempt::new("echo", &["hello"]);
        let output = SystemProbe
            .run(&attempt, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_probe_merges_stderr() {
        let attempt = ProbeAttempt::new("sh", &["-c", "echo err 1>&2"]).with_stderr();
        let output = SystemProbe
            .run(&attempt, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(output.trim(), "err");
    }

    #[tokio::test]
    async fn test_system_probe_merged_output_keeps_write_order() {
        let attempt = ProbeAttempt::new(
            "sh",
            &["-c", "echo first-stderr 1>&2; sleep 0.05; echo second-stdout"],
        )
        .with_stderr();
        let output = SystemProbe
            .run(&attempt, Duration::from_secs(2))
            .await
            .unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, vec!["first-stderr", "second-stdout"]);
        assert_eq!(LogText::from(output).lines().last(), Some("second-stdout"));
    }

    #[tokio::test]
    async fn test_system_probe_failure_modes() {
        let timeout = Duration::from_millis(100);

        let result = SystemProbe
            .run(&ProbeAttempt::new("sleep", &["5"]), timeout)
            .await;
        assert!(matches!(result, Err(CollectorError::Timeout { .. })));

        let result = SystemProbe
            .run(&ProbeAttempt::new::<&str>("false", &[]), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(CollectorError::CommandFailed { .. })));

        let result = SystemProbe
            .run(&ProbeAttempt::new::<&str>("true", &[]), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(CollectorError::CommandFailed { .. })));

        let result = SystemProbe
            .run(
                &ProbeAttempt::new::<&str>("nodepulse-no-such-binary", &[]),
                Duration::from_secs(2),
            )
            .await;
        assert!(matches!(result, Err(CollectorError::CommandExecution { .. })));
    }
}
