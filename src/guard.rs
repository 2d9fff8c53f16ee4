use crate::{
    auth_context::{AuthContext, AuthState},
    models::Role,
    navigation::{LOGIN_PATH, ProtectedRoute},
};

/// Redirect
///
/// Navigation instruction produced when a guard denies access. `replace` asks the router to
/// replace the current history entry; `preserve_origin_to` is the path to return to after
/// signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub target_path: String,
    pub replace: bool,
    pub preserve_origin_to: Option<String>,
}

impl Redirect {
    pub fn to(target_path: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            replace: true,
            preserve_origin_to: None,
        }
    }

    pub fn to_login(origin: impl Into<String>) -> Self {
        Self {
            target_path: LOGIN_PATH.to_string(),
            replace: true,
            preserve_origin_to: Some(origin.into()),
        }
    }

    /// The target as a URL, with the origin carried in the `from` query parameter.
    pub fn location(&self) -> String {
        match &self.preserve_origin_to {
            Some(from) => format!("{}?from={}", self.target_path, urlencoding::encode(from)),
            None => self.target_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Still bootstrapping, or a role refresh is pending.
    Checking,
    Denied(Redirect),
    Allowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RefreshState {
    #[default]
    Idle,
    InFlight,
    Done,
}

/// RouteGuard
///
/// Gates one navigation to a protected path. A guard instance triggers at most one role
/// refresh over its lifetime.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    path: String,
    allowed: Option<Vec<Role>>,
    refresh: RefreshState,
}

impl RouteGuard {
    /// `allowed` of `None` admits any signed-in user.
    pub fn new(path: impl Into<String>, allowed: Option<Vec<Role>>) -> Self {
        Self {
            path: path.into(),
            allowed,
            refresh: RefreshState::Idle,
        }
    }

    pub fn for_route(route: &ProtectedRoute) -> Self {
        let allowed = (!route.roles.is_empty()).then(|| route.roles.to_vec());
        Self::new(route.path, allowed)
    }

    fn needs_refresh(&self, state: &AuthState) -> bool {
        !state.initializing
            && state.session.is_some()
            && state.role.is_none()
            && self.refresh == RefreshState::Idle
    }

    /// evaluate
    ///
    /// Pure decision for the given state. Call again whenever the state changes.
    pub fn evaluate(&self, state: &AuthState) -> GuardDecision {
        if state.initializing || self.refresh == RefreshState::InFlight || self.needs_refresh(state)
        {
            return GuardDecision::Checking;
        }

        if state.session.is_none() {
            return GuardDecision::Denied(Redirect::to_login(&self.path));
        }

        // Only a resolved role outside the allow-list is denied; an unresolved one renders.
        match (state.role, &self.allowed) {
            (Some(role), Some(allowed)) if !allowed.contains(&role) => {
                GuardDecision::Denied(Redirect::to(role.dashboard_route()))
            }
            _ => GuardDecision::Allowed,
        }
    }

    /// check
    ///
    /// Drives the guard to a final decision: revalidates the session so an expired one is
    /// renewed or dropped, waits out the bootstrap window and performs the single role
    /// refresh when a session has no role yet.
    pub async fn check(&mut self, ctx: &AuthContext) -> GuardDecision {
        ctx.revalidate().await;
        let mut changes = ctx.watch();
        loop {
            let state = changes.borrow_and_update().clone();

            if self.needs_refresh(&state) {
                self.refresh = RefreshState::InFlight;
                let role = ctx.refresh_role().await;
                self.refresh = RefreshState::Done;
                tracing::debug!(path = %self.path, role = ?role, "role refreshed for guarded route");
                continue;
            }

            match self.evaluate(&state) {
                GuardDecision::Checking => {
                    if changes.changed().await.is_err() {
                        return GuardDecision::Denied(Redirect::to_login(&self.path));
                    }
                }
                decision => return decision,
            }
        }
    }
}
