use async_trait::async_trait;
use calendar_scaler_error::ScalerError;

pub mod helpers;

/// # Description
/// A trait for building a component from its configuration.
/// # Notes
/// Construction is async because most components open a connection or load
/// credentials while being built. Implementations should fail fast and report
/// the failure through a `ScalerError` so that callers can map it to a status.
#[async_trait]
pub trait Configurable<T> {
    async fn try_from_config(config: &T) -> Result<Self, Box<dyn ScalerError>>
    where
        Self: Sized;
}
