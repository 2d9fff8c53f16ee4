use serde_json::json;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    error::AuthError,
    models::{AuthResult, AuthSnapshot, Metadata, Role, Session, User, UserProfile},
    role::{ResolveOptions, resolve_role},
    session_store::{Notification, SessionStoreState, Subscription},
};

pub const SIGN_IN_CONFIRMATION_PROMPT: &str = "Check your email to confirm sign-in.";
pub const SIGN_UP_CONFIRMATION_PROMPT: &str =
    "Check your email to confirm your account before signing in.";

/// AuthState
///
/// The four fields every consumer reads. `role` is only ever set together with `session`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<User>,
    pub role: Option<Role>,
    pub initializing: bool,
}

impl AuthState {
    fn bootstrapping() -> Self {
        Self {
            session: None,
            user: None,
            role: None,
            initializing: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn set_session(&mut self, session: Option<Session>) {
        match session {
            Some(session) => {
                self.role = resolve_role(&session.user, &session, ResolveOptions::default());
                self.user = Some(session.user.clone());
                self.session = Some(session);
            }
            None => self.clear(),
        }
    }

    fn clear(&mut self) {
        self.session = None;
        self.user = None;
        self.role = None;
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            user: self.user.as_ref().map(UserProfile::from),
            role: self.role,
            authenticated: self.is_authenticated(),
            initializing: self.initializing,
            expires_at: self.session.as_ref().and_then(Session::expires_at),
        }
    }
}

/// AuthContext
///
/// Single source of truth for one browser's authentication state. It is constructed
/// explicitly with `mount`, follows the session store's notifications until `teardown`, and
/// is the only writer of its state. Consumers call its operations or read snapshots.
pub struct AuthContext {
    store: Option<SessionStoreState>,
    state: Arc<watch::Sender<AuthState>>,
    active: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthContext {
    /// mount
    ///
    /// Bootstraps from the persisted session (if any) and subscribes to change notifications.
    /// Without a store the context settles immediately as signed out and every operation
    /// reports the configuration error.
    pub async fn mount(store: Option<SessionStoreState>) -> Arc<Self> {
        let (tx, _) = watch::channel(AuthState::bootstrapping());
        let ctx = Arc::new(Self {
            store: store.clone(),
            state: Arc::new(tx),
            active: Arc::new(AtomicBool::new(true)),
            listener: Mutex::new(None),
        });

        let Some(store) = store else {
            tracing::warn!("{}", AuthError::NotConfigured);
            ctx.commit(|state| state.initializing = false);
            return ctx;
        };

        // Subscribe before the first read so nothing emitted in between is missed.
        let subscription = store.on_auth_state_change();

        match store.get_session().await {
            Ok(session) => {
                if let Some(session) = &session {
                    tracing::info!(user_id = %session.user.id, "restored persisted session");
                }
                ctx.commit(|state| {
                    if session.is_some() {
                        state.set_session(session);
                    }
                    state.initializing = false;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read persisted session");
                ctx.commit(|state| state.initializing = false);
            }
        }

        let handle = tokio::spawn(listen(
            subscription,
            store,
            ctx.state.clone(),
            ctx.active.clone(),
        ));
        *ctx.lock_listener() = Some(handle);

        ctx
    }

    /// Stops following notifications and discards any result still in flight.
    pub fn teardown(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(handle) = self.lock_listener().take() {
                handle.abort();
            }
            tracing::debug!("auth context torn down");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// A receiver that observes every subsequent state change.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn role(&self) -> Option<Role> {
        self.state.borrow().role
    }

    /// login
    ///
    /// Password sign-in. Failures leave the state untouched and carry the provider message.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult {
        let Some(store) = &self.store else {
            return AuthResult::failure(AuthError::NotConfigured.to_string());
        };

        let response = match store.sign_in_with_password(email, password).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(error = %e, "login rejected");
                return AuthResult::failure(e.to_string());
            }
        };

        let (Some(user), Some(session)) = (response.user, response.session) else {
            return AuthResult::confirmation_required(None, SIGN_IN_CONFIRMATION_PROMPT);
        };

        let role = resolve_role(&user, &session, ResolveOptions::forced())
            .or_else(|| resolve_role(&user, &session, ResolveOptions::default()));

        tracing::info!(user_id = %user.id, role = ?role, "login succeeded");
        self.commit(|state| {
            state.session = Some(session);
            state.user = Some(user);
            state.role = role;
        });

        AuthResult::success(role)
    }

    /// signup
    ///
    /// Creates an account carrying the names and the desired role as user metadata. The
    /// desired role is trusted as-is since the provider echoes it back in that metadata.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        desired_role: Role,
    ) -> AuthResult {
        let Some(store) = &self.store else {
            return AuthResult::failure(AuthError::NotConfigured.to_string());
        };

        let metadata: Metadata = [
            ("firstName".to_string(), json!(first_name)),
            ("lastName".to_string(), json!(last_name)),
            ("role".to_string(), json!(desired_role)),
        ]
        .into_iter()
        .collect();

        let response = match store.sign_up(email, password, metadata).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(error = %e, "signup rejected");
                return AuthResult::failure(e.to_string());
            }
        };

        match (response.user, response.session) {
            (Some(user), Some(session)) => {
                tracing::info!(user_id = %user.id, role = %desired_role, "account created");
                self.commit(|state| {
                    state.session = Some(session);
                    state.user = Some(user);
                    state.role = Some(desired_role);
                });
                AuthResult::success(Some(desired_role))
            }
            _ => AuthResult::confirmation_required(Some(desired_role), SIGN_UP_CONFIRMATION_PROMPT),
        }
    }

    /// Signs out at the provider and clears the state whatever the provider answered.
    pub async fn logout(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.sign_out().await {
                tracing::warn!(error = %e, "provider sign-out failed; clearing local session anyway");
            }
        }
        self.commit(AuthState::clear);
    }

    /// Re-derives the role of the signed-in user. `None` without a session.
    pub async fn refresh_role(&self) -> Option<Role> {
        let (user, session) = {
            let state = self.state.borrow();
            match (&state.user, &state.session) {
                (Some(user), Some(session)) => (user.clone(), session.clone()),
                _ => return None,
            }
        };

        let role = resolve_role(&user, &session, ResolveOptions::forced());
        self.commit(|state| {
            // The session may have been replaced while resolving; only keep the role if it
            // still belongs to the current one.
            if state.session.as_ref().map(|s| &s.access_token) == Some(&session.access_token) {
                state.role = role;
            }
        });
        role
    }

    /// revalidate
    ///
    /// Re-reads the session from the store, which renews an expired access token or drops
    /// the session when renewal is impossible, and commits what it returns. Read errors
    /// leave the state as it is.
    pub async fn revalidate(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.snapshot().is_authenticated() {
            return;
        }

        match store.get_session().await {
            Ok(session) => self.commit(|state| {
                let current = state.session.as_ref().map(|s| &s.access_token);
                if current != session.as_ref().map(|s| &s.access_token) {
                    if session.is_none() {
                        tracing::info!("session expired");
                    }
                    state.set_session(session);
                }
            }),
            Err(e) => tracing::warn!(error = %e, "could not revalidate session"),
        }
    }

    fn commit(&self, update: impl FnOnce(&mut AuthState)) {
        if self.is_active() {
            self.state.send_modify(update);
        }
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Applies store notifications to the state until torn down. Every write replaces all four
/// fields, so duplicate or late notifications converge on the store's latest view.
async fn listen(
    mut subscription: Subscription,
    store: SessionStoreState,
    state: Arc<watch::Sender<AuthState>>,
    active: Arc<AtomicBool>,
) {
    loop {
        let notification = subscription.next().await;
        if !active.load(Ordering::Acquire) {
            break;
        }

        match notification {
            Notification::Event(event) => {
                tracing::debug!(kind = ?event.kind, signed_in = event.session.is_some(), "auth state changed");
                state.send_modify(|s| {
                    s.set_session(event.session);
                    s.initializing = false;
                });
            }
            Notification::Lagged(missed) => {
                tracing::warn!(missed, "auth notifications dropped; resynchronising");
                match store.get_session().await {
                    Ok(session) if active.load(Ordering::Acquire) => {
                        state.send_modify(|s| s.set_session(session));
                    }
                    Ok(_) => break,
                    Err(e) => tracing::warn!(error = %e, "resynchronisation failed"),
                }
            }
            Notification::Closed => break,
        }
    }
    subscription.unsubscribe();
}
