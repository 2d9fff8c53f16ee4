use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use super::{AuthChangeEvent, AuthEvents, AuthResponse, SessionStore, Subscription};
use crate::{
    error::AuthError,
    models::{Metadata, Session, User},
};

const DEFAULT_SECRET: &str = "campus-portal-in-memory-secret";
const DEFAULT_TTL_SECS: i64 = 3600;

/// Claims minted into in-memory access tokens, shaped like the hosted provider's.
#[derive(Debug, Serialize)]
struct AccessClaims<'a> {
    sub: Uuid,
    email: Option<&'a str>,
    aud: &'static str,
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_role: Option<&'a Value>,
    iat: i64,
    exp: i64,
}

struct Account {
    password: String,
    user: User,
    confirmed: bool,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
    require_confirmation: bool,
    sign_in_without_session: bool,
    sign_out_failure: Option<String>,
    sign_out_calls: usize,
}

/// InMemorySessionStore
///
/// A self-contained identity provider used by tests and local demos. Accounts live in a
/// map, access tokens are real HS256 JWTs, and every state change is broadcast exactly
/// like the hosted provider does.
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
    events: AuthEvents,
    secret: String,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_secret(DEFAULT_SECRET)
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events: AuthEvents::new(),
            secret: secret.to_string(),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    /// Overrides the access token lifetime. Non-positive values mint already-expired tokens.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds a confirmed account.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        user_metadata: Metadata,
        app_metadata: Metadata,
    ) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata,
            app_metadata,
        };
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
                confirmed: true,
            },
        );
        user
    }

    /// New sign-ups stay unconfirmed and receive no session until `confirm_email`.
    pub fn set_requires_confirmation(&self, required: bool) {
        self.lock().require_confirmation = required;
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        match self.lock().accounts.get_mut(email) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Password sign-ins succeed but return only the user, as the provider does while a
    /// second confirmation step is pending.
    pub fn set_sign_in_without_session(&self, enabled: bool) {
        self.lock().sign_in_without_session = enabled;
    }

    /// Makes every following `sign_out` fail with `message`, leaving the session in place.
    pub fn fail_sign_out(&self, message: Option<&str>) {
        self.lock().sign_out_failure = message.map(str::to_string);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.lock().sign_out_calls
    }

    /// Number of live change-notification subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    /// Signs `email` in without emitting anything, as if a session had been persisted by an
    /// earlier visit.
    pub fn persist_session_for(&self, email: &str) -> Result<Session, AuthError> {
        let mut inner = self.lock();
        let user = inner
            .accounts
            .get(email)
            .map(|account| account.user.clone())
            .ok_or_else(|| AuthError::Provider("User not found".to_string()))?;
        let session = self.issue_session(&user)?;
        inner.current = Some(session.clone());
        Ok(session)
    }

    /// Drops the current session from the provider side and notifies subscribers, as when
    /// the user signs out in another tab.
    pub fn revoke_session(&self) {
        self.lock().current = None;
        self.events.emit(AuthChangeEvent::SignedOut, None);
    }

    /// Replaces the provider-assigned metadata of `email` and re-issues the current session.
    pub fn update_app_metadata(&self, email: &str, app_metadata: Metadata) -> Result<(), AuthError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(email)
            .ok_or_else(|| AuthError::Provider("User not found".to_string()))?;
        account.user.app_metadata = app_metadata;
        let user = account.user.clone();

        let refreshed = match &inner.current {
            Some(current) if current.user.id == user.id => Some(self.issue_session(&user)?),
            _ => None,
        };
        if let Some(session) = refreshed {
            inner.current = Some(session.clone());
            drop(inner);
            self.events.emit(AuthChangeEvent::UserUpdated, Some(session));
        }
        Ok(())
    }

    /// Broadcasts an arbitrary event. Lets tests replay stale or duplicate notifications.
    pub fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        self.events.emit(kind, session);
    }

    fn issue_session(&self, user: &User) -> Result<Session, AuthError> {
        let now = Utc::now();
        let exp = now + self.ttl;
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.as_deref(),
            aud: "authenticated",
            role: "authenticated",
            user_role: user.app_metadata.get("role"),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Provider(format!("Failed to sign access token: {e}")))?;

        Ok(Session {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.ttl.num_seconds(),
            expires_at: Some(exp.timestamp()),
            refresh_token: Uuid::new_v4().simple().to_string(),
            user: user.clone(),
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let mut inner = self.lock();
        match inner.current.clone() {
            Some(session) if session.is_expired(Utc::now()) => {
                inner.current = None;
                drop(inner);
                self.events.emit(AuthChangeEvent::SignedOut, None);
                Ok(None)
            }
            current => Ok(current),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get(email)
            .filter(|account| account.password == password)
            .ok_or_else(|| AuthError::Provider("Invalid login credentials".to_string()))?;
        if !account.confirmed {
            return Err(AuthError::Provider("Email not confirmed".to_string()));
        }

        let user = account.user.clone();
        if inner.sign_in_without_session {
            return Ok(AuthResponse {
                user: Some(user),
                session: None,
            });
        }

        let session = self.issue_session(&user)?;
        inner.current = Some(session.clone());
        drop(inner);

        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Metadata,
    ) -> Result<AuthResponse, AuthError> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(email) {
            return Err(AuthError::Provider("User already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: metadata,
            app_metadata: Metadata::new(),
        };
        let confirmed = !inner.require_confirmation;
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
                confirmed,
            },
        );

        if !confirmed {
            return Ok(AuthResponse {
                user: Some(user),
                session: None,
            });
        }

        let session = self.issue_session(&user)?;
        inner.current = Some(session.clone());
        drop(inner);

        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut inner = self.lock();
        inner.sign_out_calls += 1;
        if let Some(message) = inner.sign_out_failure.clone() {
            return Err(AuthError::Provider(message));
        }
        inner.current = None;
        drop(inner);

        self.events.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    fn on_auth_state_change(&self) -> Subscription {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::Notification;
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn issued_tokens_verify_against_the_store_secret() {
        let store = InMemorySessionStore::with_secret("unit-secret");
        store.register("a@campus.edu", "pw", Metadata::new(), metadata(json!({ "role": "admin" })));

        let response = store.sign_in_with_password("a@campus.edu", "pw").await.unwrap();
        let session = response.session.unwrap();

        let mut validation = Validation::default();
        validation.set_audience(&["authenticated"]);
        let decoded = decode::<Value>(
            &session.access_token,
            &DecodingKey::from_secret(b"unit-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims["user_role"], json!("admin"));
        assert_eq!(decoded.claims["role"], json!("authenticated"));
    }

    #[tokio::test]
    async fn wrong_password_is_a_provider_error() {
        let store = InMemorySessionStore::new();
        store.register("a@campus.edu", "pw", Metadata::new(), Metadata::new());

        let err = store.sign_in_with_password("a@campus.edu", "nope").await.unwrap_err();
        assert_eq!(err, AuthError::Provider("Invalid login credentials".to_string()));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let store = InMemorySessionStore::new();
        store.sign_up("a@campus.edu", "pw", Metadata::new()).await.unwrap();

        let err = store.sign_up("a@campus.edu", "pw", Metadata::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn unconfirmed_sign_up_gets_no_session() {
        let store = InMemorySessionStore::new();
        store.set_requires_confirmation(true);

        let response = store.sign_up("a@campus.edu", "pw", Metadata::new()).await.unwrap();
        assert!(response.user.is_some());
        assert!(response.session.is_none());
        assert!(store.get_session().await.unwrap().is_none());

        assert!(store.sign_in_with_password("a@campus.edu", "pw").await.is_err());
        assert!(store.confirm_email("a@campus.edu"));
        assert!(store.sign_in_with_password("a@campus.edu", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn expired_session_is_dropped_with_a_sign_out_event() {
        let store = InMemorySessionStore::new().with_ttl(Duration::seconds(-5));
        store.register("a@campus.edu", "pw", Metadata::new(), Metadata::new());
        store.persist_session_for("a@campus.edu").unwrap();
        let mut sub = store.on_auth_state_change();

        assert!(store.get_session().await.unwrap().is_none());
        assert!(matches!(
            sub.next().await,
            Notification::Event(e) if e.kind == AuthChangeEvent::SignedOut && e.session.is_none()
        ));
    }
}
