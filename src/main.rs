use std::sync::Arc;

use tracing::{error, info};

use freshline_api::{app_router, config, db, events, logging, schema, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    logging::init(&config);

    let pool = db::establish_connection_from_app_config(&config).await?;
    if config.auto_migrate {
        schema::ensure_schema(&pool).await?;
    }
    let pool = Arc::new(pool);

    let (event_sender, event_receiver) = events::channel(config.event_buffer_size);
    let event_task = tokio::spawn(events::run_event_logger(event_receiver));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(pool, config, Some(Arc::new(event_sender)));
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "freshline-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    event_task.abort();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
    }
    info!("shutdown signal received");
}
