//! The gift exchange service.
//!
//! [`Exchange`] owns the store, the authorization boundary and the admin lock.
//! Its operations are split by concern: participant registry, wishlists, the
//! assignment engine and assignment lookup.
//!
//! Create, delete, shuffle and reset all run under one admin-wide
//! [`tokio::sync::Mutex`], so at most one of them is in flight at a time no
//! matter how many requests are being served. Reads skip the lock and rely on
//! the store's snapshot reads instead. Store writes may touch the snapshot
//! file, so they run on the blocking pool.

mod engine;
mod lookup;
mod registry;
mod wishlist;

use std::sync::{Arc, Mutex as StdMutex};

use exchange_core::ExchangeError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

use crate::auth::{AuthorizationBoundary, RequestContext};
use crate::store::ExchangeStore;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Whether participants may still save wishlists once assignments exist.
    pub wishlist_edits_after_shuffle: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            wishlist_edits_after_shuffle: true,
        }
    }
}

pub struct Exchange {
    store: Arc<dyn ExchangeStore>,
    boundary: Arc<dyn AuthorizationBoundary>,
    policy: Policy,
    admin_lock: Mutex<()>,
    rng: StdMutex<ChaCha8Rng>,
}

impl Exchange {
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        boundary: Arc<dyn AuthorizationBoundary>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            boundary,
            policy,
            admin_lock: Mutex::new(()),
            rng: StdMutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Reseeds the service RNG so unseeded shuffles are reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: StdMutex::new(ChaCha8Rng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Checks the caller, then waits for the admin lock.
    async fn admin(
        &self,
        ctx: &RequestContext,
        action: &str,
    ) -> ExchangeResult<MutexGuard<'_, ()>> {
        if !self.boundary.is_admin(ctx) {
            warn!(action, "rejected non-admin request");
            return Err(ExchangeError::Unauthorized(format!(
                "{action} requires admin access"
            )));
        }
        Ok(self.admin_lock.lock().await)
    }

    async fn blocking<T, F>(&self, f: F) -> ExchangeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ExchangeStore) -> ExchangeResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {e}");
                ExchangeError::Internal("store task failed".into())
            })?
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;
    use exchange_core::{Credential, Participant, ParticipantId};

    pub const ADMIN: &str = "admin";

    pub fn admin_ctx() -> RequestContext {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            crate::auth::ADMIN_PASSWORD_HEADER,
            axum::http::HeaderValue::from_static("changeme"),
        );
        RequestContext::from_headers(headers)
    }

    pub fn guest_ctx() -> RequestContext {
        RequestContext::default()
    }

    pub fn exchange_with(policy: Policy) -> Exchange {
        Exchange::new(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::auth::SharedSecret::new("changeme")),
            policy,
        )
        .with_seed(7)
    }

    pub async fn exchange() -> Exchange {
        let exchange = exchange_with(Policy::default());
        exchange
            .bootstrap_admin(ADMIN, Credential::new("changeme"))
            .await
            .unwrap();
        exchange
    }

    pub async fn join(exchange: &Exchange, name: &str) -> Participant {
        exchange
            .create_participant(&admin_ctx(), name, "pw")
            .await
            .unwrap()
    }

    /// Creates `names` and gives each a one-item wishlist.
    pub async fn ready_roster(exchange: &Exchange, names: &[&str]) -> Vec<ParticipantId> {
        let mut ids = Vec::new();
        for name in names {
            let p = join(exchange, name).await;
            exchange
                .save_wishlist(p.id, Some("gift"), None, None)
                .await
                .unwrap();
            ids.push(p.id);
        }
        ids
    }
}
