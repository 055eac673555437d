use std::panic;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use collabdoc::auth::AllowAll;
use collabdoc::config::Config;
use collabdoc::routes::create_app;
use collabdoc::store::{ChatStore, DocumentStore, MemoryStore, PgStore};
use collabdoc::ws::SessionCoordinator;
use collabdoc::AppState;

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "collabdoc=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Wire up stores: Postgres when a database URL is configured, an
    // in-memory fallback otherwise.
    let (documents, chat): (Arc<dyn DocumentStore>, Arc<dyn ChatStore>) = match &config.db_url {
        Some(db_url) => match PgStore::new(db_url).await {
            Ok(store) => {
                if let Err(e) = store.init_schema().await {
                    error!("Failed to initialize database schema: {}", e);
                }
                info!("Database initialized successfully");
                let store = Arc::new(store);
                (store.clone(), store)
            }
            Err(e) => {
                error!("Failed to connect to database: {}", e);
                warn!("Falling back to in-memory stores - documents will not survive restarts");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        },
        None => {
            warn!("No database URL configured - using in-memory stores");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let coordinator = Arc::new(SessionCoordinator::new(
        documents,
        chat,
        Arc::new(AllowAll),
        config.autosave_interval(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        coordinator,
    });
    let app = create_app(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!(
        "📚 Swagger UI available at http://{}/swagger",
        config.server_address()
    );

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
