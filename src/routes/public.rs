use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a portal session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers; also reports whether auth is configured.
        .route("/health", get(handlers::health))
        // POST /auth/login
        // Password sign-in. Returns the portal session id in `x-portal-session`.
        .route("/auth/login", post(handlers::login))
        // POST /auth/signup
        // Account creation with the desired role stored in user metadata.
        .route("/auth/signup", post(handlers::signup))
}
