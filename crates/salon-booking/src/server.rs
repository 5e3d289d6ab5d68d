//! Server startup: storage, sample data, the chat agent and the HTTP router.

use chrono::Local;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    agent::ChatAgent,
    api::build_router,
    booking_db::BookingDatabase,
    config::Config,
    seed::seed_sample_data,
    shared_state::AppState,
};

/// Open the configured database, falling back to an in-memory one so the API still starts.
pub fn open_database(cfg: &Config) -> anyhow::Result<Arc<BookingDatabase>> {
    match BookingDatabase::new(&cfg.database_path) {
        Ok(db) => {
            info!("Booking database initialized at: {}", cfg.database_path.display());
            Ok(Arc::new(db))
        }
        Err(e) => {
            warn!("Failed to initialize booking database: {}. Falling back to in-memory.", e);
            Ok(Arc::new(BookingDatabase::new_in_memory()?))
        }
    }
}

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics()?;
    cfg.print_config();

    let database = open_database(&cfg)?;

    if cfg.seed_sample_data {
        let today = Local::now().date_naive();
        if let Err(e) = seed_sample_data(&database, today, &cfg.operating_hours()) {
            warn!("Failed to seed sample data: {}", e);
        }
    }

    tokio::fs::create_dir_all(&cfg.upload_dir).await?;

    let agent = ChatAgent::from_config(&cfg, database.clone())?;
    let addr = cfg.api_addr()?;
    let state = AppState::new(cfg, database, agent);
    let app = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
