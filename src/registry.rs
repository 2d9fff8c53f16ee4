use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{auth_context::AuthContext, session_store::SessionStoreState};

/// Builds the session store for a newly seen browser. `None` when the provider is not configured.
pub type StoreFactory = Arc<dyn Fn() -> Option<SessionStoreState> + Send + Sync>;

/// SessionRegistry
///
/// Owns one `AuthContext` per browser, keyed by the portal session id the browser presents
/// in the `x-portal-session` header. Each context gets its own store, so sessions of
/// different browsers never mix.
pub struct SessionRegistry {
    contexts: RwLock<HashMap<Uuid, Arc<AuthContext>>>,
    factory: StoreFactory,
}

/// The concrete type used to share the registry across the application state.
pub type RegistryState = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new(factory: StoreFactory) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            factory,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<AuthContext>> {
        self.contexts.read().await.get(&id).cloned()
    }

    /// Returns the context for `id`, mounting a fresh one (under a new id) when the browser
    /// presented none or an unknown one.
    pub async fn open(&self, id: Option<Uuid>) -> (Uuid, Arc<AuthContext>) {
        if let Some(id) = id {
            if let Some(ctx) = self.get(id).await {
                return (id, ctx);
            }
        }

        // Mount outside the lock; bootstrapping may hit the network.
        let ctx = AuthContext::mount((self.factory)()).await;
        let id = Uuid::new_v4();
        self.contexts.write().await.insert(id, ctx.clone());
        tracing::debug!(portal_session = %id, "auth context mounted");
        (id, ctx)
    }

    /// Tears the context down and forgets it. Returns whether it existed.
    pub async fn close(&self, id: Uuid) -> bool {
        let removed = self.contexts.write().await.remove(&id);
        match removed {
            Some(ctx) => {
                ctx.teardown();
                tracing::debug!(portal_session = %id, "auth context closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}
