use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Dashboard Router Module
///
/// Every dashboard navigation goes through `handlers::dashboard`, which looks the path up
/// in the protected route table and runs the route guard before answering.
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        // GET /dashboard/{role}
        // 200 with the page descriptor, 307 to /login or to the caller's own dashboard,
        // 404 for paths outside the route table.
        .route("/dashboard/{role}", get(handlers::dashboard))
}
