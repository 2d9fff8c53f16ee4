use std::env;

use crate::error::SUPABASE_CONFIG_ERROR;

/// Default label under which the provider session is persisted for a browser.
pub const DEFAULT_STORAGE_KEY: &str = "campus-portal-auth";

/// AppConfig
///
/// Holds the portal's entire configuration state. It is loaded once at startup
/// and never mutated afterwards; handlers pull it out of `AppState` via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the log output format.
    pub env: Env,
    // Hosted auth provider settings. `None` when the environment is incomplete.
    pub supabase: Option<SupabaseSettings>,
    // Address the HTTP server binds to.
    pub bind_addr: String,
    // Label of the persisted provider session, carried in log spans.
    pub storage_key: String,
}

/// SupabaseSettings
///
/// The two environment-supplied strings required to talk to the hosted auth provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupabaseSettings {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`.
    pub url: String,
    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: String,
}

/// Env
///
/// Defines the runtime context. Local gets human-readable logs, Production gets JSON.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Non-panicking configuration for test setup. The auth provider is left unconfigured;
    /// tests inject their own session store.
    fn default() -> Self {
        Self {
            env: Env::Local,
            supabase: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables.
    ///
    /// Missing provider settings do not abort startup: the absence is logged as a warning
    /// and every store-dependent operation later fails fast with the fixed configuration
    /// message instead of attempting network I/O.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let supabase = match (non_blank("SUPABASE_URL"), non_blank("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(SupabaseSettings {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
            }),
            _ => {
                tracing::warn!("{}", SUPABASE_CONFIG_ERROR);
                None
            }
        };

        Self {
            env,
            supabase,
            bind_addr: env::var("PORTAL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            storage_key: non_blank("PORTAL_STORAGE_KEY")
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
        }
    }

    /// Whether the hosted auth provider can be reached at all.
    pub fn is_auth_configured(&self) -> bool {
        self.supabase.is_some()
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
