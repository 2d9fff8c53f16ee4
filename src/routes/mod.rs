//! Router Module Index
//!
//! Splits the portal's routes by what they require of the caller, so each group's access
//! rules are visible in one place.

/// Routes open to any browser. Login and signup mount an Auth Context on demand.
pub mod public;

/// Routes acting on the Auth Context named by the `x-portal-session` header.
pub mod session;

/// Dashboard navigations, each passed through the route guard.
pub mod dashboard;
