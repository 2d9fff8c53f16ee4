use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Session Router Module
///
/// Endpoints operating on the caller's Auth Context. Handlers resolve it through the
/// `PortalSession`/`MaybePortalSession` extractors; a browser without a context is treated
/// as signed out, except for `/auth/refresh-role` which rejects it with 401.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/logout
        // Clears the browser's session, even when the provider's sign-out fails.
        .route("/auth/logout", post(handlers::logout))
        // GET /auth/me
        // Snapshot of user, role and bootstrap state. Never exposes tokens.
        .route("/auth/me", get(handlers::me))
        // POST /auth/refresh-role
        // Forces role re-resolution for the signed-in user.
        .route("/auth/refresh-role", post(handlers::refresh_role))
        // DELETE /auth/session
        // Tears the Auth Context down and forgets the portal session id.
        .route("/auth/session", delete(handlers::close_session))
}
