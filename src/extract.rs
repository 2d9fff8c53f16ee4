use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
};
use std::{convert::Infallible, sync::Arc};
use uuid::Uuid;

use crate::{auth_context::AuthContext, registry::RegistryState};

/// Header through which the browser presents its portal session id.
pub const PORTAL_SESSION_HEADER: &str = "x-portal-session";

/// The portal session id a request claims, if the header holds a valid UUID.
pub fn requested_session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(PORTAL_SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

/// PortalSession
///
/// The browser's Auth Context, resolved from the `x-portal-session` header.
///
/// Rejection: 401 when the header is missing, malformed, or names no live context.
#[derive(Clone)]
pub struct PortalSession {
    pub id: Uuid,
    pub context: Arc<AuthContext>,
}

impl<S> FromRequestParts<S> for PortalSession
where
    S: Send + Sync,
    RegistryState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(MaybePortalSession(session)) =
            MaybePortalSession::from_request_parts(parts, state).await;
        session.ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// MaybePortalSession
///
/// Like `PortalSession`, for routes that also serve browsers without a context.
pub struct MaybePortalSession(pub Option<PortalSession>);

impl<S> FromRequestParts<S> for MaybePortalSession
where
    S: Send + Sync,
    RegistryState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(id) = requested_session_id(&parts.headers) else {
            return Ok(Self(None));
        };

        let registry = RegistryState::from_ref(state);
        let session = registry
            .get(id)
            .await
            .map(|context| PortalSession { id, context });
        Ok(Self(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_id_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert_eq!(requested_session_id(&headers), None);

        headers.insert(PORTAL_SESSION_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_eq!(requested_session_id(&headers), None);

        let id = Uuid::new_v4();
        headers.insert(
            PORTAL_SESSION_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(requested_session_id(&headers), Some(id));
    }
}
