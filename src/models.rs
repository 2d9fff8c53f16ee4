use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::navigation::DashboardView;

/// Arbitrary key-value mapping attached to a user by the auth provider.
pub type Metadata = HashMap<String, Value>;

// --- Identity ---

/// Role
///
/// The closed set of portal roles. A role is never stored on its own; it is derived from
/// the user's metadata or access token claims each time it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Student,
    Mentor,
    Employer,
    Placement,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Mentor,
        Role::Employer,
        Role::Placement,
        Role::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
            Role::Employer => "employer",
            Role::Placement => "placement",
            Role::Admin => "admin",
        }
    }

    /// Human-readable label shown in navigation.
    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Mentor => "Mentor",
            Role::Employer => "Employer",
            Role::Placement => "Placement Cell",
            Role::Admin => "Admin",
        }
    }

    /// Interprets an untyped claim or metadata value. Only exact string members qualify.
    pub fn from_value(value: &Value) -> Option<Role> {
        value.as_str().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the five portal roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// User
///
/// Identity record as issued by the auth provider. Extra provider fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Supplied by the user at sign-up (first/last name, requested role).
    #[serde(default)]
    pub user_metadata: Metadata,
    /// Assigned by the provider or its administrators.
    #[serde(default)]
    pub app_metadata: Metadata,
}

impl User {
    fn metadata_str(&self, key: &str) -> Option<String> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Session
///
/// Provider-issued proof of authentication: a signed, time-limited access token plus the
/// refresh token used to renew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// Unix timestamp after which the access token is rejected.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    /// Sessions without an expiry timestamp are treated as live.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

// --- Request Payloads ---

/// LoginRequest
///
/// Input payload for POST /auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// SignupRequest
///
/// Input payload for POST /auth/signup. The name fields and the desired role are attached
/// to the new account as user metadata.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

// --- Responses ---

/// AuthResult
///
/// Outcome of a login or signup. Failures never escape as errors; they carry the provider
/// message so forms always have something to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthResult {
    pub success: bool,
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_email_confirmation: bool,
}

impl AuthResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            role: None,
            message: Some(message.into()),
            requires_email_confirmation: false,
        }
    }

    pub fn success(role: Option<Role>) -> Self {
        Self {
            success: true,
            role,
            message: None,
            requires_email_confirmation: false,
        }
    }

    pub fn confirmation_required(role: Option<Role>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            role,
            message: Some(message.into()),
            requires_email_confirmation: true,
        }
    }
}

/// UserProfile
///
/// The slice of the user record exposed to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.metadata_str("firstName"),
            last_name: user.metadata_str("lastName"),
        }
    }
}

/// AuthSnapshot
///
/// Read-only view of a browser's Auth Context (GET /auth/me). Tokens are never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthSnapshot {
    pub user: Option<UserProfile>,
    pub role: Option<Role>,
    pub authenticated: bool,
    pub initializing: bool,
    #[ts(type = "string | null")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// RoleResponse
///
/// Result of POST /auth/refresh-role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleResponse {
    pub role: Option<Role>,
}

/// DashboardPage
///
/// Descriptor of the dashboard a guarded navigation resolved to. The SPA picks the page
/// component from `view`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardPage {
    pub role: Option<Role>,
    pub view: DashboardView,
    pub title: String,
    pub path: String,
}
