use super::types::CollectorResult;

/// A core trait that every status producer implements.
///
/// Producers are shared across request tasks behind an `Arc`, so they must be
/// `Send + Sync + 'static`. Each call derives a fresh value from live inputs;
/// the only state a producer may carry between calls is an explicit cache.
#[async_trait::async_trait]
pub trait DataProducer: Send + Sync + 'static {
    /// The section of the status snapshot this producer fills in.
    type Output: Send + Sync + 'static;

    /// Collects and returns the data for this section.
    ///
    /// Probe failures that have a documented default should be absorbed
    /// here; an `Err` means the whole section must be replaced by its
    /// degraded form.
    async fn produce(&self) -> CollectorResult<Self::Output>;
}
