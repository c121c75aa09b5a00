use super::error::CollectorError;

/// Result type returned by every producer and probe in the collector system.
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;
