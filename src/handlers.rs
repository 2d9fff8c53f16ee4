use crate::{
    AppState,
    auth_context::AuthContext,
    extract::{MaybePortalSession, PORTAL_SESSION_HEADER, PortalSession, requested_session_id},
    guard::{GuardDecision, Redirect as GuardRedirect, RouteGuard},
    models::{AuthResult, AuthSnapshot, DashboardPage, LoginRequest, RoleResponse, SignupRequest},
    navigation::find_route,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use uuid::Uuid;

/// Picks the status code of a login/signup response. The body is always the `AuthResult`.
fn auth_status(result: &AuthResult, configured: bool, rejected: StatusCode) -> StatusCode {
    match (result.success, configured) {
        (true, _) => StatusCode::OK,
        (false, false) => StatusCode::SERVICE_UNAVAILABLE,
        (false, true) => rejected,
    }
}

/// Answers a login/signup. A context minted for this request is kept, and its id handed out,
/// only when the operation left it signed in; otherwise it is released.
async fn settle(
    state: &AppState,
    requested: Option<Uuid>,
    (id, ctx): (Uuid, Arc<AuthContext>),
    status: StatusCode,
    result: AuthResult,
) -> Response {
    let minted = requested != Some(id);
    if minted && !ctx.snapshot().is_authenticated() {
        state.registry.close(id).await;
        return (status, Json(result)).into_response();
    }
    (status, [(PORTAL_SESSION_HEADER, id.to_string())], Json(result)).into_response()
}

fn redirect_response(redirect: &GuardRedirect) -> Response {
    Redirect::temporary(&redirect.location()).into_response()
}

/// health
///
/// [Public Route] Liveness probe. Reports whether the auth provider is configured.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "Campus Portal",
        "auth_configured": state.config.is_auth_configured(),
    }))
}

/// login
///
/// [Public Route] Password sign-in for the calling browser. Mounts an Auth Context for
/// browsers that do not present one yet and, once signed in, returns its id in
/// `x-portal-session`.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, or confirmation required", body = AuthResult),
        (status = 401, description = "Rejected by the provider", body = AuthResult),
        (status = 503, description = "Auth provider not configured", body = AuthResult)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let requested = requested_session_id(&headers);
    let (id, ctx) = state.registry.open(requested).await;
    let result = ctx.login(&payload.email, &payload.password).await;
    let status = auth_status(&result, ctx.is_configured(), StatusCode::UNAUTHORIZED);
    settle(&state, requested, (id, ctx), status, result).await
}

/// signup
///
/// [Public Route] Creates an account with the desired role attached as user metadata.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created, possibly awaiting confirmation", body = AuthResult),
        (status = 400, description = "Rejected by the provider", body = AuthResult),
        (status = 503, description = "Auth provider not configured", body = AuthResult)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignupRequest>,
) -> Response {
    let requested = requested_session_id(&headers);
    let (id, ctx) = state.registry.open(requested).await;
    let result = ctx
        .signup(
            &payload.email,
            &payload.password,
            &payload.first_name,
            &payload.last_name,
            payload.role,
        )
        .await;
    let status = auth_status(&result, ctx.is_configured(), StatusCode::BAD_REQUEST);
    settle(&state, requested, (id, ctx), status, result).await
}

/// logout
///
/// [Session Route] Signs the browser out and releases its Auth Context. Local state is
/// cleared even if the provider fails.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Signed out"))
)]
pub async fn logout(
    State(state): State<AppState>,
    MaybePortalSession(session): MaybePortalSession,
) -> StatusCode {
    if let Some(PortalSession { id, context }) = session {
        context.logout().await;
        state.registry.close(id).await;
    }
    StatusCode::NO_CONTENT
}

/// me
///
/// [Session Route] Snapshot of the browser's authentication state.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Current auth state", body = AuthSnapshot))
)]
pub async fn me(MaybePortalSession(session): MaybePortalSession) -> Json<AuthSnapshot> {
    let snapshot = match session {
        Some(PortalSession { context, .. }) => {
            context.revalidate().await;
            context.snapshot().snapshot()
        }
        None => AuthSnapshot {
            user: None,
            role: None,
            authenticated: false,
            initializing: false,
            expires_at: None,
        },
    };
    Json(snapshot)
}

/// refresh_role
///
/// [Session Route] Forces role re-resolution for the signed-in user.
#[utoipa::path(
    post,
    path = "/auth/refresh-role",
    responses(
        (status = 200, description = "Resolved role", body = RoleResponse),
        (status = 401, description = "No portal session")
    )
)]
pub async fn refresh_role(PortalSession { context, .. }: PortalSession) -> Json<RoleResponse> {
    Json(RoleResponse {
        role: context.refresh_role().await,
    })
}

/// close_session
///
/// [Session Route] Tears down the browser's Auth Context entirely.
#[utoipa::path(
    delete,
    path = "/auth/session",
    responses(
        (status = 204, description = "Context released"),
        (status = 404, description = "No such portal session")
    )
)]
pub async fn close_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match requested_session_id(&headers) {
        Some(id) if state.registry.close(id).await => StatusCode::NO_CONTENT,
        _ => StatusCode::NOT_FOUND,
    }
}

/// dashboard
///
/// [Guarded Route] Resolves a dashboard navigation. Permitted browsers get the page
/// descriptor; everyone else is redirected to the login page (with the requested path kept
/// in `from`) or to their own dashboard.
#[utoipa::path(
    get,
    path = "/dashboard/{role}",
    params(("role" = String, Path, description = "Dashboard segment, e.g. `student`")),
    responses(
        (status = 200, description = "Access granted", body = DashboardPage),
        (status = 307, description = "Redirect to login or to the caller's own dashboard"),
        (status = 404, description = "No such dashboard")
    )
)]
pub async fn dashboard(
    MaybePortalSession(session): MaybePortalSession,
    Path(segment): Path<String>,
) -> Response {
    let path = format!("/dashboard/{segment}");
    let Some(route) = find_route(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some(PortalSession { context, .. }) = session else {
        return redirect_response(&GuardRedirect::to_login(route.path));
    };

    let mut guard = RouteGuard::for_route(route);
    match guard.check(&context).await {
        GuardDecision::Allowed => Json(DashboardPage {
            role: context.role(),
            view: route.view,
            title: route.view.title().to_string(),
            path: route.path.to_string(),
        })
        .into_response(),
        GuardDecision::Denied(redirect) => {
            tracing::debug!(path = %route.path, target = %redirect.target_path, "navigation redirected");
            redirect_response(&redirect)
        }
        // `check` only returns once a final decision is reached.
        GuardDecision::Checking => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
