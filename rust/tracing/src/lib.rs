#[cfg(feature = "grpc")]
pub mod grpc_server_trace_layer;
pub mod init_tracer;
pub mod util;

#[cfg(feature = "grpc")]
pub use grpc_server_trace_layer::*;
pub use init_tracer::{init_otel_tracing, init_stdout_tracing, OtelFilter, OtelFilterLevel};
