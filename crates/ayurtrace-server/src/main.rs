use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ayurtrace_core::{ProvenanceService, SystemClock};
use ayurtrace_db::{init_database, RedbLedger};
use ayurtrace_server::{routes, AppState, Config};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: AYURTRACE_LISTEN_ADDR, AYURTRACE_DB_PATH");
            eprintln!("Optional: AYURTRACE_APPROVED_ZONES (e.g. 26.9124,75.7873;28.6139,77.2090)");
            eprintln!("Optional: AYURTRACE_SEASON_CALENDAR (e.g. ashwagandha:11-3;tulsi:6-9)");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting AyurTrace server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database path: {}", config.db_path.display());
    tracing::info!("Approved zones: {}", config.geo_fence.len());
    if config.season_calendar.is_none() {
        tracing::info!("No season calendar configured; all harvest dates accepted");
    }

    // Initialize database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let service = ProvenanceService::new(
        RedbLedger::new(db),
        config.validator(),
        Arc::new(SystemClock),
    );
    let app = routes::create_router(AppState::new(service));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app).await.expect("Server error");
}
