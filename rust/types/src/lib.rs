mod event;
mod scaled_object;

pub use event::*;
pub use scaled_object::*;

#[allow(clippy::all)]
pub mod externalscaler {
    tonic::include_proto!("externalscaler");
}

/// Name of the single external metric this scaler reports.
pub const METRIC_NAME: &str = "eventTerm";

/// Target value paired with [`METRIC_NAME`]. One replica per unit of metric.
pub const METRIC_TARGET_SIZE: i64 = 1;
