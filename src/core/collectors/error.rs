use std::time::Duration;

use thiserror::Error;

/// Error type for the status producers.
///
/// None of these ever reach an HTTP client directly: the assembler turns a
/// failed producer into that section's degraded record and logs the error.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Failed to read a file such as `/proc/meminfo`.
    #[error("Failed to read file {path}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A metric was found but its value could not be parsed.
    #[error("Failed to parse {metric} from {location}: {reason}")]
    ParseError {
        metric: String,
        location: String,
        reason: String,
    },

    /// A required field was not present in the probed data.
    #[error("Missing required field: {field} in {location}")]
    MissingField { field: String, location: String },

    /// Data was found but did not conform to the expected layout.
    #[error("Invalid format in {location}: {reason}")]
    InvalidFormat { location: String, reason: String },

    /// The command could not be spawned (missing binary, permissions).
    #[error("Command '{command}' failed: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully or printed nothing usable.
    #[error("Command '{command}' produced no usable output: {reason}")]
    CommandFailed { command: String, reason: String },

    /// The probe did not finish within its time box.
    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// An outbound HTTP lookup failed.
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A catch-all for miscellaneous errors that don't fit other variants.
    #[error("Other error: {0}")]
    Other(String),
}
