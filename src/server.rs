use crate::cli::ServeArgs;
use crate::infra::{seed_sample_directory, AppState, InMemoryEventPublisher};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use mdt_engine::config::{AppConfig, AppEnvironment};
use mdt_engine::error::AppError;
use mdt_engine::telemetry;
use mdt_engine::workflows::second_opinion::{MemoryStore, SecondOpinionService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(SecondOpinionService::new(
        Arc::new(MemoryStore::default()),
        Arc::new(InMemoryEventPublisher::default()),
    ));
    let algorithm = service.publish_config(config.assignment.clone())?;
    if config.environment != AppEnvironment::Production {
        let committees = seed_sample_directory(&service)?;
        info!(committees = committees.len(), "sample committee directory registered");
    }

    let app = with_platform_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        config_version = algorithm.version,
        "second-opinion engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
