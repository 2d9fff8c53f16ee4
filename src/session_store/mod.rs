use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::AuthError,
    models::{Metadata, Session, User},
};

pub mod memory;
pub mod supabase;

pub use memory::InMemorySessionStore;
pub use supabase::SupabaseSessionStore;

/// Events buffered per subscriber before it is considered lagging.
const EVENT_BUFFER: usize = 32;

// 1. SessionStore Contract
/// SessionStore
///
/// Abstract contract of the hosted identity provider. It owns the session; callers only hold
/// clones of it. Swapping the Supabase client for the in-memory store in tests does not
/// affect the Auth Context.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The currently persisted session, if any. Expired sessions are renewed or dropped.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Password sign-in. A response without a session means the account awaits confirmation.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError>;

    /// Creates an account with `metadata` attached as user metadata.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Metadata,
    ) -> Result<AuthResponse, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Opens a change-notification stream. Dropping or unsubscribing the handle releases it.
    fn on_auth_state_change(&self) -> Subscription;
}

/// The concrete type used to share a session store.
pub type SessionStoreState = Arc<dyn SessionStore>;

/// AuthResponse
///
/// Payload of a successful sign-in or sign-up.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

// 2. Change Notifications

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// AuthEvent
///
/// A single notification. `session` is `None` once the browser is signed out.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<Session>,
}

/// AuthEvents
///
/// Producer side of the notification stream, owned by a session store. Every subscriber
/// sees every event in emission order.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        // No subscribers is not an error.
        let delivered = self.tx.send(AuthEvent { kind, session }).unwrap_or(0);
        tracing::trace!(?kind, delivered, "auth event emitted");
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// What a subscriber observed on its next receive.
#[derive(Debug)]
pub enum Notification {
    Event(AuthEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
    /// Unsubscribed, or the producer is gone.
    Closed,
}

/// Subscription
///
/// Consumer handle of the notification stream. After `unsubscribe` nothing more is
/// delivered through it.
#[derive(Debug)]
pub struct Subscription {
    rx: Option<broadcast::Receiver<AuthEvent>>,
}

impl Subscription {
    pub async fn next(&mut self) -> Notification {
        let Some(rx) = self.rx.as_mut() else {
            return Notification::Closed;
        };

        match rx.recv().await {
            Ok(event) => Notification::Event(event),
            Err(RecvError::Lagged(missed)) => Notification::Lagged(missed),
            Err(RecvError::Closed) => {
                self.rx = None;
                Notification::Closed
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.rx = None;
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}
