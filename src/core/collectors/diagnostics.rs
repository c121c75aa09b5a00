//! Error and warning lines surfaced from client logs.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::core::logtext::LogText;

/// Most recent records kept per service.
pub const MAX_RECORDS_PER_SERVICE: usize = 5;

/// Messages are cut to this many characters.
pub const MAX_MESSAGE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    Error,
    Warn,
}

/// One notable log line of a monitored client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub service: String,
    pub level: ErrorLevel,
    pub message: String,
}

impl ErrorRecord {
    /// Builds a record from a raw log line, trimming and truncating it.
    pub fn from_line(service: &str, level: ErrorLevel, line: &str) -> Self {
        ErrorRecord {
            service: service.to_string(),
            level,
            message: truncate_message(line),
        }
    }
}

/// Trims surrounding whitespace and keeps at most [`MAX_MESSAGE_CHARS`]
/// characters.
pub fn truncate_message(line: &str) -> String {
    line.trim().chars().take(MAX_MESSAGE_CHARS).collect()
}

/// Turns the most recent lines matching `marker` into records, oldest first.
///
/// `classify` receives the captures of the first marker match in the line and
/// picks the record level.
pub fn scan_error_records<F>(
    logs: &LogText,
    marker: &Regex,
    service: &str,
    classify: F,
) -> Vec<ErrorRecord>
where
    F: Fn(&Captures<'_>) -> ErrorLevel,
{
    logs.recent_matching(marker, MAX_RECORDS_PER_SERVICE)
        .into_iter()
        .filter_map(|line| {
            let caps = marker.captures(line)?;
            Some(ErrorRecord::from_line(service, classify(&caps), line))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_is_char_safe() {
        let long = format!("  {}  ", "ü".repeat(200));
        let message = truncate_message(&long);
        assert_eq!(message.chars().count(), MAX_MESSAGE_CHARS);
        assert!(message.starts_with('ü'));

        assert_eq!(truncate_message("  short line \n"), "short line");
    }

    #[test]
    fn test_scan_keeps_five_most_recent() {
        let text: String = (1..=7)
            .map(|i| format!("ERROR[10-19|10:00:0{}] Failure {}\nINFO ok\n", i, i))
            .collect();
        let logs = LogText::from(text);
        let marker = Regex::new(r"\b(ERROR)\b").unwrap();

        let records = scan_error_records(&logs, &marker, "execution", |_| ErrorLevel::Error);

        assert_eq!(records.len(), MAX_RECORDS_PER_SERVICE);
        assert!(records[0].message.ends_with("Failure 3"));
        assert!(records[4].message.ends_with("Failure 7"));
        assert!(records.iter().all(|r| r.service == "execution"));
    }

    #[test]
    fn test_record_serializes_upper_case_level() {
        let record = ErrorRecord::from_line("consensus", ErrorLevel::Warn, "WARN something");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["service"], "consensus");
        assert_eq!(json["message"], "WARN something");
    }
}
