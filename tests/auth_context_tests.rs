use campus_portal::{
    AuthContext, AuthState, InMemorySessionStore, Role,
    auth_context::{SIGN_IN_CONFIRMATION_PROMPT, SIGN_UP_CONFIRMATION_PROMPT},
    error::SUPABASE_CONFIG_ERROR,
    models::Metadata,
    session_store::{AuthChangeEvent, SessionStore, SessionStoreState},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

// --- Helper Functions ---

const PASSWORD: &str = "correct horse battery staple";

fn metadata(value: serde_json::Value) -> Metadata {
    serde_json::from_value(value).unwrap()
}

/// Store with one student (role in user metadata), one admin (role only in provider
/// metadata, hence only in the token) and one account without any role.
fn seeded_store() -> Arc<InMemorySessionStore> {
    let store = InMemorySessionStore::new();
    store.register(
        "student@campus.edu",
        PASSWORD,
        metadata(json!({ "firstName": "Asha", "lastName": "Rao", "role": "student" })),
        Metadata::new(),
    );
    store.register(
        "admin@campus.edu",
        PASSWORD,
        Metadata::new(),
        metadata(json!({ "role": "admin" })),
    );
    store.register("nobody@campus.edu", PASSWORD, Metadata::new(), Metadata::new());
    Arc::new(store)
}

async fn mount(store: &Arc<InMemorySessionStore>) -> Arc<AuthContext> {
    AuthContext::mount(Some(store.clone() as SessionStoreState)).await
}

/// Waits (bounded) until the context state satisfies `predicate`.
async fn wait_for_state(ctx: &AuthContext, predicate: impl FnMut(&AuthState) -> bool) -> AuthState {
    let mut changes = ctx.watch();
    let state = tokio::time::timeout(Duration::from_secs(2), changes.wait_for(predicate))
        .await
        .expect("auth state never reached the expected shape")
        .expect("auth context dropped");
    state.clone()
}

// --- Bootstrap ---

#[tokio::test]
async fn test_mount_without_store_settles_signed_out() {
    let ctx = AuthContext::mount(None).await;
    let state = ctx.snapshot();

    assert!(!state.initializing);
    assert!(state.session.is_none() && state.user.is_none() && state.role.is_none());
    assert!(!ctx.is_configured());
}

#[tokio::test]
async fn test_mount_without_persisted_session() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let state = ctx.snapshot();
    assert!(!state.initializing);
    assert!(!state.is_authenticated());
}

#[tokio::test]
async fn test_mount_restores_persisted_session_and_role() {
    let store = seeded_store();
    store.persist_session_for("student@campus.edu").unwrap();

    let ctx = mount(&store).await;
    let state = ctx.snapshot();

    assert!(!state.initializing);
    assert!(state.session.is_some());
    assert_eq!(state.user.unwrap().email.as_deref(), Some("student@campus.edu"));
    assert_eq!(state.role, Some(Role::Student));
}

// --- Login ---

#[tokio::test]
async fn test_login_success_populates_state() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let result = ctx.login("student@campus.edu", PASSWORD).await;

    assert!(result.success);
    assert_eq!(result.role, Some(Role::Student));
    assert!(!result.requires_email_confirmation);
    let state = ctx.snapshot();
    assert!(state.session.is_some());
    assert!(state.user.is_some());
    assert_eq!(state.role, Some(Role::Student));
}

#[tokio::test]
async fn test_login_resolves_role_from_token_claim() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let result = ctx.login("admin@campus.edu", PASSWORD).await;

    assert!(result.success);
    assert_eq!(result.role, Some(Role::Admin));
}

#[tokio::test]
async fn test_login_without_resolvable_role_still_succeeds() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let result = ctx.login("nobody@campus.edu", PASSWORD).await;

    assert!(result.success);
    assert_eq!(result.role, None);
    assert!(ctx.snapshot().is_authenticated());
}

#[tokio::test]
async fn test_login_failure_leaves_state_untouched() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    assert!(ctx.login("student@campus.edu", PASSWORD).await.success);
    let before = wait_for_state(&ctx, |s| s.role == Some(Role::Student)).await;

    let result = ctx.login("student@campus.edu", "wrong").await;

    assert!(!result.success);
    assert_eq!(result.role, None);
    assert_eq!(result.message.as_deref(), Some("Invalid login credentials"));
    assert_eq!(ctx.snapshot(), before);
}

#[tokio::test]
async fn test_login_on_unconfirmed_account_reports_provider_message() {
    let store = seeded_store();
    store.set_requires_confirmation(true);
    let ctx = mount(&store).await;
    assert!(ctx.signup("new@campus.edu", PASSWORD, "N", "U", Role::Mentor).await.success);

    let result = ctx.login("new@campus.edu", PASSWORD).await;

    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("Email not confirmed"));
    assert!(!ctx.snapshot().is_authenticated());
}

#[tokio::test]
async fn test_login_without_store_returns_configuration_error() {
    let ctx = AuthContext::mount(None).await;

    let result = ctx.login("student@campus.edu", PASSWORD).await;

    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some(SUPABASE_CONFIG_ERROR));
}

#[tokio::test]
async fn test_login_success_without_session_asks_for_confirmation() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    assert!(ctx.login("student@campus.edu", PASSWORD).await.success);
    let before = wait_for_state(&ctx, |s| s.role == Some(Role::Student)).await;
    store.set_sign_in_without_session(true);

    let result = ctx.login("admin@campus.edu", PASSWORD).await;

    assert!(result.success);
    assert_eq!(result.role, None);
    assert!(result.requires_email_confirmation);
    assert_eq!(result.message.as_deref(), Some(SIGN_IN_CONFIRMATION_PROMPT));
    assert_eq!(ctx.snapshot(), before);
}

// --- Signup ---

#[tokio::test]
async fn test_signup_with_immediate_session_trusts_desired_role() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let result = ctx
        .signup("mentor@campus.edu", PASSWORD, "Ravi", "Iyer", Role::Mentor)
        .await;

    assert!(result.success);
    assert_eq!(result.role, Some(Role::Mentor));
    assert!(!result.requires_email_confirmation);
    let state = ctx.snapshot();
    assert_eq!(state.role, Some(Role::Mentor));
    let user = state.user.unwrap();
    assert_eq!(user.user_metadata["firstName"], json!("Ravi"));
    assert_eq!(user.user_metadata["lastName"], json!("Iyer"));
    assert_eq!(user.user_metadata["role"], json!("mentor"));
}

#[tokio::test]
async fn test_signup_requiring_confirmation_does_not_sign_in() {
    let store = seeded_store();
    store.set_requires_confirmation(true);
    let ctx = mount(&store).await;

    let result = ctx
        .signup("employer@corp.example", PASSWORD, "Mina", "Shah", Role::Employer)
        .await;

    assert!(result.success);
    assert_eq!(result.role, Some(Role::Employer));
    assert!(result.requires_email_confirmation);
    assert_eq!(result.message.as_deref(), Some(SIGN_UP_CONFIRMATION_PROMPT));
    assert!(!ctx.snapshot().is_authenticated());
    assert_eq!(ctx.snapshot().role, None);
}

#[tokio::test]
async fn test_signup_duplicate_account_is_reported() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    let result = ctx
        .signup("student@campus.edu", PASSWORD, "A", "R", Role::Student)
        .await;

    assert!(!result.success);
    assert_eq!(result.role, None);
    assert_eq!(result.message.as_deref(), Some("User already registered"));
}

// --- Logout ---

#[tokio::test]
async fn test_logout_clears_state() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("student@campus.edu", PASSWORD).await;

    ctx.logout().await;

    let state = ctx.snapshot();
    assert!(state.session.is_none() && state.user.is_none() && state.role.is_none());
    assert!(store.get_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_clears_state_even_when_provider_fails() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("student@campus.edu", PASSWORD).await;
    store.fail_sign_out(Some("network unreachable"));

    ctx.logout().await;

    let state = ctx.snapshot();
    assert!(state.session.is_none() && state.user.is_none() && state.role.is_none());
    assert_eq!(store.sign_out_calls(), 1);
}

// --- Role refresh ---

#[tokio::test]
async fn test_refresh_role_without_session_is_none() {
    let store = seeded_store();
    let ctx = mount(&store).await;

    assert_eq!(ctx.refresh_role().await, None);
}

#[tokio::test]
async fn test_refresh_role_is_idempotent() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("admin@campus.edu", PASSWORD).await;

    let first = ctx.refresh_role().await;
    let second = ctx.refresh_role().await;

    assert_eq!(first, Some(Role::Admin));
    assert_eq!(first, second);
    assert_eq!(ctx.role(), Some(Role::Admin));
}

// --- Expiry ---

#[tokio::test]
async fn test_revalidate_drops_expired_session() {
    let store = InMemorySessionStore::new().with_ttl(chrono::Duration::seconds(-60));
    store.register(
        "student@campus.edu",
        PASSWORD,
        metadata(json!({ "role": "student" })),
        Metadata::new(),
    );
    let store = Arc::new(store);
    let ctx = mount(&store).await;
    assert!(ctx.login("student@campus.edu", PASSWORD).await.success);
    assert!(ctx.snapshot().is_authenticated());

    ctx.revalidate().await;

    let state = ctx.snapshot();
    assert!(state.session.is_none() && state.user.is_none() && state.role.is_none());
    assert!(store.get_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_revalidate_keeps_live_session() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("student@campus.edu", PASSWORD).await;
    let before = wait_for_state(&ctx, |s| s.role == Some(Role::Student)).await;

    ctx.revalidate().await;

    assert_eq!(ctx.snapshot(), before);
}

// --- Change notifications ---

#[tokio::test]
async fn test_sign_out_elsewhere_clears_state() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("student@campus.edu", PASSWORD).await;

    store.revoke_session();

    let state = wait_for_state(&ctx, |s| s.session.is_none()).await;
    assert!(state.user.is_none());
    assert!(state.role.is_none());
}

#[tokio::test]
async fn test_user_update_notification_re_resolves_role() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("nobody@campus.edu", PASSWORD).await;
    assert_eq!(ctx.role(), None);

    store
        .update_app_metadata("nobody@campus.edu", metadata(json!({ "role": "placement" })))
        .unwrap();

    let state = wait_for_state(&ctx, |s| s.role.is_some()).await;
    assert_eq!(state.role, Some(Role::Placement));
}

#[tokio::test]
async fn test_replayed_stale_notification_converges_on_latest() {
    let store = seeded_store();
    let stale = store.persist_session_for("student@campus.edu").unwrap();
    let ctx = mount(&store).await;

    ctx.logout().await;
    store.emit(AuthChangeEvent::InitialSession, Some(stale));
    store.emit(AuthChangeEvent::SignedOut, None);

    // Both notifications are applied in order; the last one wins.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = ctx.snapshot();
    assert!(state.session.is_none() && state.role.is_none());
}

#[tokio::test]
async fn test_teardown_stops_notifications_and_releases_subscription() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.login("student@campus.edu", PASSWORD).await;
    assert_eq!(store.subscriber_count(), 1);

    ctx.teardown();
    store.revoke_session();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!ctx.is_active());
    assert!(ctx.snapshot().is_authenticated());
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn test_results_after_teardown_are_discarded() {
    let store = seeded_store();
    let ctx = mount(&store).await;
    ctx.teardown();

    let result = ctx.login("student@campus.edu", PASSWORD).await;

    assert!(result.success);
    assert!(!ctx.snapshot().is_authenticated());
}
