use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use calendar_scaler_config::Configurable;
use calendar_scaler_error::{ScalerError, TonicMissingFieldError};
use calendar_scaler_types::externalscaler::{
    external_scaler_server::{ExternalScaler, ExternalScalerServer},
    GetMetricSpecResponse, GetMetricsRequest, GetMetricsResponse, IsActiveResponse, MetricSpec,
    MetricValue, ScaledObjectRef,
};
use calendar_scaler_types::{Decision, ScaledObject, METRIC_NAME, METRIC_TARGET_SIZE};
use futures::stream::BoxStream;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tonic::{transport::Server, Request, Response, Status};

use crate::backend::BackendFactory;
use crate::config::ScalerServiceConfig;

pub struct ExternalScalerService {
    port: u16,
    grpc_shutdown_grace_period: Duration,
    backends: BackendFactory,
}

impl ExternalScalerService {
    pub fn new(port: u16, grpc_shutdown_grace_period: Duration, backends: BackendFactory) -> Self {
        Self {
            port,
            grpc_shutdown_grace_period,
            backends,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let addr: SocketAddr = format!("[::]:{}", self.port).parse()?;
        tracing::info!("Calendar scaler listening on {}", addr);

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<ExternalScalerServer<ExternalScalerService>>()
            .await;

        let shutdown_grace_period = self.grpc_shutdown_grace_period;
        Server::builder()
            .layer(calendar_scaler_tracing::GrpcServerTraceLayer)
            .add_service(health_service)
            .add_service(ExternalScalerServer::new(self))
            .serve_with_shutdown(addr, async move {
                let signal = select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };
                tracing::info!("Received {}, waiting for grace period...", signal);
                tokio::time::sleep(shutdown_grace_period).await;
                tracing::info!("Grace period ended, shutting down server...");
            })
            .await?;
        Ok(())
    }

    async fn decide(&self, scaled_object: ScaledObject) -> Result<Decision, Status> {
        let events = self
            .backends
            .get_events(&scaled_object)
            .await
            .map_err(|err| {
                if err.should_trace_error() {
                    tracing::error!(
                        namespace = %scaled_object.namespace,
                        scaled_object = %scaled_object.name,
                        error = %err,
                        "Failed to get events"
                    );
                } else {
                    tracing::debug!(
                        namespace = %scaled_object.namespace,
                        scaled_object = %scaled_object.name,
                        error = %err,
                        "Rejected scaler metadata"
                    );
                }
                err.boxed()
            })?;
        let decision = Decision::from_events(&events);
        tracing::debug!(
            namespace = %scaled_object.namespace,
            scaled_object = %scaled_object.name,
            events = events.len(),
            is_active = decision.is_active,
            desired_replicas = decision.desired_replicas,
            "Evaluated calendar"
        );
        Ok(decision)
    }
}

#[async_trait]
impl Configurable<ScalerServiceConfig> for ExternalScalerService {
    async fn try_from_config(config: &ScalerServiceConfig) -> Result<Self, Box<dyn ScalerError>> {
        let backends = BackendFactory::try_from_config(config).await?;
        Ok(ExternalScalerService::new(
            config.port,
            config.grpc_shutdown_grace_period,
            backends,
        ))
    }
}

#[async_trait]
impl ExternalScaler for ExternalScalerService {
    type StreamIsActiveStream = BoxStream<'static, Result<IsActiveResponse, Status>>;

    async fn is_active(
        &self,
        request: Request<ScaledObjectRef>,
    ) -> Result<Response<IsActiveResponse>, Status> {
        let decision = self.decide(request.into_inner().into()).await?;
        Ok(Response::new(IsActiveResponse {
            result: decision.is_active,
        }))
    }

    async fn stream_is_active(
        &self,
        _request: Request<ScaledObjectRef>,
    ) -> Result<Response<Self::StreamIsActiveStream>, Status> {
        Err(Status::internal("The external-push is not implemented."))
    }

    async fn get_metric_spec(
        &self,
        _request: Request<ScaledObjectRef>,
    ) -> Result<Response<GetMetricSpecResponse>, Status> {
        Ok(Response::new(GetMetricSpecResponse {
            metric_specs: vec![MetricSpec {
                metric_name: METRIC_NAME.to_string(),
                target_size: METRIC_TARGET_SIZE,
                target_size_float: METRIC_TARGET_SIZE as f64,
            }],
        }))
    }

    async fn get_metrics(
        &self,
        request: Request<GetMetricsRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let scaled_object_ref = request
            .into_inner()
            .scaled_object_ref
            .ok_or_else(|| TonicMissingFieldError("scaled_object_ref").boxed())?;
        let decision = self.decide(scaled_object_ref.into()).await?;
        Ok(Response::new(GetMetricsResponse {
            metric_values: vec![MetricValue {
                metric_name: METRIC_NAME.to_string(),
                metric_value: decision.desired_replicas,
                metric_value_float: decision.desired_replicas as f64,
            }],
        }))
    }
}
