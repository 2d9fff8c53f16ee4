use campus_portal::{
    AppState,
    config::AppConfig,
    create_router,
    registry::{SessionRegistry, StoreFactory},
    session_store::{SessionStoreState, SupabaseSessionStore},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Bootstraps the portal: configuration, logging, the per-browser session registry and the
/// HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading
    dotenv::dotenv().ok();

    // 2. Logging Filter Setup. RUST_LOG wins over the defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campus_portal=debug,tower_http=info".into());

    // The format depends on APP_ENV, which is read before AppConfig so that warnings
    // emitted while loading the configuration are already captured.
    let production = std::env::var("APP_ENV").as_deref() == Ok("production");
    if production {
        // PROD: JSON lines for log aggregation.
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // LOCAL: Pretty print output for human readability.
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    let config = AppConfig::load();

    tracing::info!(
        env = ?config.env,
        auth_configured = config.is_auth_configured(),
        storage_key = %config.storage_key,
        "Campus portal starting"
    );

    // 3. Session Store Factory. Each browser gets its own provider client state; the HTTP
    // connection pool is shared.
    let http = reqwest::Client::new();
    let settings = config.supabase.clone();
    let factory: StoreFactory = Arc::new(move || {
        settings.clone().map(|settings| {
            Arc::new(SupabaseSessionStore::new(http.clone(), settings)) as SessionStoreState
        })
    });

    // 4. Unified State Assembly
    let app_state = AppState {
        registry: Arc::new(SessionRegistry::new(factory)),
        config: config.clone(),
    };

    // 5. Router and Server Startup
    let app = create_router(app_state);

    let listener = match TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}
