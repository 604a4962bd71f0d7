//! Scoped lease-lock holder with a background renewer (spec.md §4.2).

use std::time::Duration;

use controller_core::ControllerResult;
use tracing::warn;

use crate::Store;

/// Holds a lease on `key` until `release` is called (or the guard is
/// dropped, in which case the renewer is stopped but the lease itself is
/// left to expire on its own TTL — releasing requires an async round trip
/// this type cannot make from `Drop`).
pub struct LockGuard {
    store: Store,
    key: String,
    token: String,
    renewer: Option<tokio::task::JoinHandle<()>>,
}

impl LockGuard {
    pub(crate) fn new(store: Store, key: String, token: String, ttl: Duration) -> Self {
        let renew_store = store.clone();
        let renew_key = key.clone();
        let renew_token = token.clone();
        let renewer = tokio::spawn(async move {
            let interval = ttl / 2;
            loop {
                tokio::time::sleep(interval).await;
                match renew_store.renew(&renew_key, &renew_token, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(key = %renew_key, "lock renewal lost — another holder may have acquired it");
                        break;
                    }
                    Err(err) => {
                        warn!(key = %renew_key, error = %err, "lock renewal failed");
                    }
                }
            }
        });
        Self {
            store,
            key,
            token,
            renewer: Some(renewer),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock via compare-and-delete and stops the renewer. A
    /// failed compare (lease already expired and re-acquired) is not an
    /// error.
    pub async fn release(mut self) -> ControllerResult<()> {
        if let Some(handle) = self.renewer.take() {
            handle.abort();
        }
        self.store.release(&self.key, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.renewer.take() {
            handle.abort();
        }
    }
}
