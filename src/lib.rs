use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authentication core.
pub mod auth_context;
pub mod guard;
pub mod navigation;
pub mod role;
pub mod session_store;

// Service plumbing.
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod registry;

// Module for routing segregation (Public, Session, Dashboard).
pub mod routes;
use routes::{dashboard, public, session};

// --- Public Re-exports ---

pub use auth_context::{AuthContext, AuthState};
pub use config::AppConfig;
pub use error::AuthError;
pub use guard::{GuardDecision, Redirect, RouteGuard};
pub use models::Role;
pub use registry::{RegistryState, SessionRegistry, StoreFactory};
pub use session_store::{InMemorySessionStore, SessionStore, SessionStoreState, SupabaseSessionStore};

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::login, handlers::signup, handlers::logout,
        handlers::me, handlers::refresh_role, handlers::close_session, handlers::dashboard
    ),
    components(
        schemas(
            models::Role, models::LoginRequest, models::SignupRequest, models::AuthResult,
            models::UserProfile, models::AuthSnapshot, models::RoleResponse,
            models::DashboardPage, navigation::DashboardView,
        )
    ),
    tags(
        (name = "campus-portal", description = "Campus placement portal authentication API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of the portal's services. Cloned per request; everything
/// inside is reference counted or immutable.
#[derive(Clone)]
pub struct AppState {
    /// One Auth Context per browser.
    pub registry: RegistryState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RegistryState {
    fn from_ref(app_state: &AppState) -> RegistryState {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, applies the observability layers and registers the state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration. The SPA is served from a different origin and must be able
    // to read the portal session header.
    let x_portal_session = HeaderName::from_static(extract::PORTAL_SESSION_HEADER);
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any)
        .expose_headers([x_portal_session]);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(session::session_routes())
        .merge(dashboard::dashboard_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, carrying the `x-request-id` so all its log lines correlate.
/// The portal session id is a bearer credential and never goes into a span.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
