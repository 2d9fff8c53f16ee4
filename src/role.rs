use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde_json::Value;

use crate::models::{Role, Session, User};

/// JWT segments are unpadded base64url, but some issuers pad them anyway.
const JWT_SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Claim names checked in the access token payload, in priority order.
const ROLE_CLAIMS: [&str; 2] = ["user_role", "role"];

/// Metadata key holding the role hint.
const ROLE_METADATA_KEY: &str = "role";

/// Options for `resolve_role`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Skip the fast path and re-derive the role. There is no dedicated role endpoint on the
    /// provider, so the forced path recomputes from the same local sources.
    pub force_backend: bool,
}

impl ResolveOptions {
    pub fn forced() -> Self {
        Self { force_backend: true }
    }
}

/// resolve_role
///
/// Derives the portal role for `user` from, in order, its metadata and the claims of the
/// session's access token. The first candidate that is a member of the closed role set wins;
/// anything else resolves to `None`. Never fails.
pub fn resolve_role(user: &User, session: &Session, options: ResolveOptions) -> Option<Role> {
    let local = derive_locally(user, session);

    if !options.force_backend && local.is_some() {
        return local;
    }

    tracing::debug!(
        user_id = %user.id,
        forced = options.force_backend,
        "re-deriving role from metadata and token claims"
    );
    derive_locally(user, session)
}

fn derive_locally(user: &User, session: &Session) -> Option<Role> {
    [
        metadata_role_candidate(user),
        token_role_candidate(&session.access_token),
    ]
    .iter()
    .flatten()
    .find_map(Role::from_value)
}

/// Role hint from user metadata. User-supplied metadata shadows provider-assigned metadata,
/// even when its value turns out not to be a valid role.
fn metadata_role_candidate(user: &User) -> Option<Value> {
    [&user.user_metadata, &user.app_metadata]
        .into_iter()
        .find_map(|metadata| metadata.get(ROLE_METADATA_KEY).filter(|v| !v.is_null()))
        .cloned()
}

/// Role claim from the access token payload, without verifying the signature.
///
/// Any decoding problem (missing segment, bad base64, bad JSON, non-object payload) means
/// "no claim found".
fn token_role_candidate(access_token: &str) -> Option<Value> {
    let payload = match decode_payload(access_token) {
        Ok(payload) => payload,
        Err(reason) => {
            tracing::debug!(%reason, "could not read role claim from access token");
            return None;
        }
    };

    ROLE_CLAIMS
        .iter()
        .find_map(|claim| payload.get(*claim).filter(|v| !v.is_null()))
        .cloned()
}

fn decode_payload(access_token: &str) -> Result<serde_json::Map<String, Value>, String> {
    let segment = access_token
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "token has no payload segment".to_string())?;

    let bytes = JWT_SEGMENT
        .decode(segment)
        .map_err(|e| format!("payload is not base64url: {e}"))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("payload is not a JSON object".to_string()),
        Err(e) => Err(format!("payload is not JSON: {e}")),
    }
}
