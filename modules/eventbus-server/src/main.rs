use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventbus::serializers::Site;
use eventbus::{load_config, EventBusFactory, EventBusHooks, ReqwestTransport};
use eventbus_server::config::ServerConfig;
use eventbus_server::jobs::JobRegistry;
use eventbus_server::{router, AppState, EXECUTE_JOB_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("eventbus=info".parse()?))
        .init();

    let server = ServerConfig::from_env()?;
    let config = load_config(&server.config_path)
        .with_context(|| format!("loading {}", server.config_path.display()))?;

    let site = Site::new(
        server
            .site_server
            .clone()
            .unwrap_or_else(|| format!("https://{}", config.domain)),
        server.site_database.clone(),
    );

    info!(
        producer = %config.producer_name,
        default_service = %config.default_service,
        services = config.services.len(),
        enabled = %config.enabled_event_types,
        "Loaded event bus config"
    );

    let factory = Arc::new(EventBusFactory::new(config, Arc::new(ReqwestTransport::new())));
    let hooks = EventBusHooks::new(factory.clone(), site).with_job_secret(server.secret.clone());

    let state = Arc::new(AppState {
        factory,
        hooks: Some(Arc::new(hooks)),
        jobs: JobRegistry::with_builtins(),
        secret: server.secret.clone(),
    });

    let app = router(state).layer(
        tower_http::trace::TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        }),
    );

    let addr = server.addr();
    info!("EventBus job runner starting on {addr}");
    info!("Jobs accepted at http://{addr}{EXECUTE_JOB_PATH}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
