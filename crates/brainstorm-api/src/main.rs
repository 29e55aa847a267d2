//! Brainstorm API server entry point.

use std::sync::Arc;

use brainstorm_api::config::ApiConfig;
use brainstorm_api::error::AppError;
use brainstorm_api::routes;
use brainstorm_api::state::AppState;
use brainstorm_api::telemetry;
use brainstorm_core::clock::{Clock, SystemClock};
use brainstorm_event_store::MIGRATOR;
use brainstorm_event_store::memory_event_repository::InMemoryEventRepository;
use brainstorm_event_store::pg_event_repository::PgEventRepository;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ApiConfig::from_env()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting brainstorm API server");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            MIGRATOR.run(&pool).await?;
            info!("using PostgreSQL event store");
            AppState::with_store(clock, Arc::new(PgEventRepository::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; rooms are kept in memory and lost on restart");
            AppState::with_store(clock, Arc::new(InMemoryEventRepository::new()))
        }
    };

    let app = routes::app(app_state);

    let addr = config.socket_addr()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
