//! Product registry API server entry point.

use std::sync::Arc;

use product_registry::application::command_consumer::CommandConsumer;
use product_registry::application::command_handlers::RegistryCommandHandler;
use product_registry::application::event_router::EventRouter;
use registry_api::config::AppConfig;
use registry_api::error::AppError;
use registry_api::state::AppState;
use registry_api::{build_router, telemetry};
use registry_core::clock::SystemClock;
use registry_core::repository::EventRepository;
use registry_event_store::pg_event_repository::PgEventRepository;
use registry_messaging::{BrokerConfig, InMemoryBroker};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!(registry_id = %config.registry_id, "starting product registry API server");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    let event_repository: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool));

    let broker = InMemoryBroker::new(BrokerConfig {
        max_redeliveries: config.max_redeliveries,
        result_channel_prefix: config.result_channel_prefix.clone(),
        unclaimed_channel_ttl: config.quiet_timeout,
    });

    let handler = Arc::new(RegistryCommandHandler::new(
        event_repository.clone(),
        Arc::new(SystemClock),
    ));
    let consumer = CommandConsumer::new(
        config.registry_id,
        handler,
        EventRouter::new(Arc::new(broker.clone())),
    );
    let receiver = broker.command_receiver()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(async move { consumer.run(receiver, shutdown_rx).await });

    let app_state = AppState::new(
        config.registry_id,
        Arc::new(broker.clone()),
        Arc::new(broker.clone()),
        event_repository,
        config.quiet_timeout,
    );
    let app = build_router(app_state);

    let addr = config.bind_address()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if shutdown_tx.send(true).is_err() {
        warn!("command consumer already stopped");
    }
    match consumer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "command consumer failed"),
        Err(err) => error!(error = %err, "command consumer task panicked"),
    }
    broker.shutdown();
    info!("product registry API server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
