use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{AuthChangeEvent, AuthEvents, AuthResponse, SessionStore, Subscription};
use crate::{
    config::SupabaseSettings,
    error::AuthError,
    models::{Metadata, Session, User},
};

/// ProviderErrorBody
///
/// The auth provider reports failures under different keys depending on the endpoint
/// and version; the first one present is surfaced.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ProviderErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

/// SupabaseSessionStore
///
/// Session store backed by the hosted provider's auth REST API (`/auth/v1`). One instance
/// holds the session of one browser, the way the JS client persists it under its storage key.
pub struct SupabaseSessionStore {
    client: Client,
    settings: SupabaseSettings,
    current: Mutex<Option<Session>>,
    events: AuthEvents,
}

impl SupabaseSessionStore {
    /// `client` is shared between stores so connection pools are reused across browsers.
    pub fn new(client: Client, settings: SupabaseSettings) -> Self {
        Self {
            client,
            settings,
            current: Mutex::new(None),
            events: AuthEvents::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.settings.url, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.settings.anon_key)
            .header("Content-Type", "application/json")
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, AuthError> {
        let url = self.endpoint(&format!("token?grant_type={grant_type}"));
        let response = self
            .request(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        let response = error_for_provider(response).await?;
        let session = response.json::<Session>().await?;
        Ok(stamp_expiry(session))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }
}

/// Converts a non-success response into the provider's own message.
async fn error_for_provider(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ProviderErrorBody>().await.unwrap_or_default();
    let message = body
        .into_message()
        .unwrap_or_else(|| format!("Auth provider responded with status {status}"));
    Err(AuthError::Provider(message))
}

/// Older provider versions omit the absolute expiry; derive it from the lifetime.
fn stamp_expiry(mut session: Session) -> Session {
    if session.expires_at.is_none() && session.expires_in > 0 {
        session.expires_at = Some(Utc::now().timestamp() + session.expires_in);
    }
    session
}

#[async_trait]
impl SessionStore for SupabaseSessionStore {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let mut current = self.current.lock().await;
        let Some(session) = current.clone() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        match self.refresh(&session.refresh_token).await {
            Ok(renewed) => {
                *current = Some(renewed.clone());
                tracing::debug!(user_id = %renewed.user.id, "access token refreshed");
                self.events
                    .emit(AuthChangeEvent::TokenRefreshed, Some(renewed.clone()));
                Ok(Some(renewed))
            }
            Err(e) => {
                *current = None;
                tracing::warn!(error = %e, "session expired and could not be refreshed");
                self.events.emit(AuthChangeEvent::SignedOut, None);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;

        *self.current.lock().await = Some(session.clone());
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Metadata,
    ) -> Result<AuthResponse, AuthError> {
        let response = self
            .request(self.client.post(self.endpoint("signup")))
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        let body = error_for_provider(response).await?.json::<Value>().await?;

        // With auto-confirm the provider answers with a full session, otherwise with the
        // bare (unconfirmed) user record.
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<Session>(body)
                .map(stamp_expiry)
                .map_err(|e| AuthError::Transport(format!("Malformed sign-up session: {e}")))?;
            *self.current.lock().await = Some(session.clone());
            self.events
                .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            return Ok(AuthResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user = serde_json::from_value::<User>(body)
            .map_err(|e| AuthError::Transport(format!("Malformed sign-up user: {e}")))?;
        Ok(AuthResponse {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.current.lock().await.take();
        let Some(session) = previous else {
            return Ok(());
        };

        // The local session is gone whatever the provider says about revoking it.
        self.events.emit(AuthChangeEvent::SignedOut, None);

        let response = self
            .request(self.client.post(self.endpoint("logout")))
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        error_for_provider(response).await.map(|_| ())
    }

    fn on_auth_state_change(&self) -> Subscription {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_prefers_msg_then_message() {
        let body: ProviderErrorBody = serde_json::from_value(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials",
        }))
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid login credentials"));

        let body: ProviderErrorBody = serde_json::from_value(json!({
            "code": 422,
            "msg": "User already registered",
        }))
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("User already registered"));
    }

    #[test]
    fn session_without_absolute_expiry_gets_one() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "a.b.c",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": { "id": "00000000-0000-0000-0000-000000000001", "email": "a@campus.edu" }
        }))
        .unwrap();

        let stamped = stamp_expiry(session);
        let now = Utc::now().timestamp();
        let at = stamped.expires_at.unwrap();
        assert!(at > now && at <= now + 3600);
        assert_eq!(stamped.token_type, "bearer");
    }

    #[tokio::test]
    async fn sign_out_without_session_makes_no_request() {
        let store = SupabaseSessionStore::new(
            Client::new(),
            SupabaseSettings {
                url: "http://127.0.0.1:9".to_string(),
                anon_key: "anon".to_string(),
            },
        );
        assert!(store.sign_out().await.is_ok());
        assert!(store.get_session().await.unwrap().is_none());
    }
}
