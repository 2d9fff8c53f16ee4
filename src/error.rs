use thiserror::Error;

/// Fixed message returned by every store-dependent operation when the provider is not configured.
pub const SUPABASE_CONFIG_ERROR: &str =
    "Supabase environment variables are not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY.";

/// AuthError
///
/// Failure taxonomy of the session store boundary. The display text is what ends up in the
/// `message` field of an `AuthResult`, so provider text is rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Provider settings are missing from the environment.
    #[error("{}", SUPABASE_CONFIG_ERROR)]
    NotConfigured,

    /// The provider rejected the operation (bad credentials, duplicate account, ...).
    #[error("{0}")]
    Provider(String),

    /// The provider could not be reached or answered with something undecodable.
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::Transport(format!("Unexpected response from auth provider: {e}"))
        } else {
            AuthError::Transport(e.to_string())
        }
    }
}
