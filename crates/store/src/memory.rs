//! In-memory dedup/lock/result backend. Single-replica only; state is lost
//! on restart (spec.md §4.2, §3 "Lifecycles").

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use controller_core::{ControllerResult, TaskResult};

/// Insertion-ordered map with a max size; on overflow the oldest half are
/// evicted, regardless of whether their TTL has elapsed yet (spec.md §4.2).
const DEDUP_MAX_ENTRIES: usize = 10_000;

struct DedupEntry {
    expires_at: Instant,
}

struct LockEntry {
    token: String,
    expires_at: Instant,
}

struct ResultEntry {
    result: TaskResult,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryBackend {
    dedup: tokio::sync::Mutex<(HashMap<String, DedupEntry>, VecDeque<String>)>,
    locks: tokio::sync::Mutex<HashMap<String, LockEntry>>,
    results: tokio::sync::Mutex<HashMap<String, ResultEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_seen(&self, key: &str) -> ControllerResult<bool> {
        let (map, _) = &*self.dedup.lock().await;
        Ok(map.get(key).is_some_and(|e| e.expires_at > Instant::now()))
    }

    pub async fn mark_seen(&self, key: &str, ttl: Duration) -> ControllerResult<()> {
        let mut guard = self.dedup.lock().await;
        let (map, order) = &mut *guard;
        if !map.contains_key(key) {
            order.push_back(key.to_string());
        }
        map.insert(
            key.to_string(),
            DedupEntry {
                expires_at: Instant::now() + ttl,
            },
        );
        if map.len() > DEDUP_MAX_ENTRIES {
            let evict_count = map.len() / 2;
            for _ in 0..evict_count {
                if let Some(oldest) = order.pop_front() {
                    map.remove(&oldest);
                }
            }
        }
        Ok(())
    }

    /// Attempts to acquire `key`, returning the caller's fresh token on
    /// success. Does not itself spin-retry — that's the job of the public
    /// `Store::acquire_lock` loop, which is backend-agnostic.
    pub async fn try_acquire(&self, key: &str, ttl: Duration, token: &str) -> ControllerResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        let vacant = match locks.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => true,
        };
        if vacant {
            locks.insert(
                key.to_string(),
                LockEntry {
                    token: token.to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(vacant)
    }

    /// Compare-and-set renewal: only extends the lease if `token` still
    /// owns it.
    pub async fn renew(&self, key: &str, token: &str, ttl: Duration) -> ControllerResult<bool> {
        let mut locks = self.locks.lock().await;
        match locks.get_mut(key) {
            Some(entry) if entry.token == token => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Compare-and-delete release: a failed compare is not an error, the
    /// lease had already expired and was possibly re-acquired.
    pub async fn release(&self, key: &str, token: &str) -> ControllerResult<()> {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(key) {
            if entry.token == token {
                locks.remove(key);
            }
        }
        Ok(())
    }

    /// Evicts lock entries that are not currently held (expired), keeping
    /// the map bounded. Never touches a live lock.
    pub async fn sweep_unlocked(&self) {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        locks.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn put_result(&self, task_id: &str, result: TaskResult, ttl: Duration) -> ControllerResult<()> {
        let mut results = self.results.lock().await;
        results.insert(
            task_id.to_string(),
            ResultEntry {
                result,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub async fn get_result(&self, task_id: &str) -> ControllerResult<Option<TaskResult>> {
        let mut results = self.results.lock().await;
        match results.get(task_id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.result.clone())),
            Some(_) => {
                results.remove(task_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_seen_then_is_seen() {
        let backend = MemoryBackend::new();
        assert!(!backend.is_seen("k").await.unwrap());
        backend.mark_seen("k", Duration::from_secs(60)).await.unwrap();
        assert!(backend.is_seen("k").await.unwrap());
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.mark_seen("k", Duration::from_secs(60)).await.unwrap();
        backend.mark_seen("k", Duration::from_secs(60)).await.unwrap();
        assert!(backend.is_seen("k").await.unwrap());
    }

    #[tokio::test]
    async fn expired_dedup_entry_reports_unseen() {
        let backend = MemoryBackend::new();
        backend.mark_seen("k", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!backend.is_seen("k").await.unwrap());
    }

    #[tokio::test]
    async fn second_acquire_fails_while_first_holds() {
        let backend = MemoryBackend::new();
        assert!(backend.try_acquire("repo", Duration::from_secs(60), "tok-a").await.unwrap());
        assert!(!backend.try_acquire("repo", Duration::from_secs(60), "tok-b").await.unwrap());
    }

    #[tokio::test]
    async fn acquire_succeeds_after_expiry() {
        let backend = MemoryBackend::new();
        assert!(backend.try_acquire("repo", Duration::from_millis(1), "tok-a").await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.try_acquire("repo", Duration::from_secs(60), "tok-b").await.unwrap());
    }

    #[tokio::test]
    async fn release_with_wrong_token_is_noop() {
        let backend = MemoryBackend::new();
        backend.try_acquire("repo", Duration::from_secs(60), "tok-a").await.unwrap();
        backend.release("repo", "tok-b").await.unwrap();
        assert!(!backend.try_acquire("repo", Duration::from_secs(60), "tok-c").await.unwrap());
    }

    #[tokio::test]
    async fn release_with_correct_token_frees_lock() {
        let backend = MemoryBackend::new();
        backend.try_acquire("repo", Duration::from_secs(60), "tok-a").await.unwrap();
        backend.release("repo", "tok-a").await.unwrap();
        assert!(backend.try_acquire("repo", Duration::from_secs(60), "tok-b").await.unwrap());
    }

    #[tokio::test]
    async fn renew_extends_only_for_owning_token() {
        let backend = MemoryBackend::new();
        backend.try_acquire("repo", Duration::from_millis(50), "tok-a").await.unwrap();
        assert!(!backend.renew("repo", "tok-b", Duration::from_secs(60)).await.unwrap());
        assert!(backend.renew("repo", "tok-a", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn dedup_overflow_evicts_oldest_half() {
        let backend = MemoryBackend::new();
        for i in 0..(DEDUP_MAX_ENTRIES + 10) {
            backend.mark_seen(&format!("k{i}"), Duration::from_secs(3600)).await.unwrap();
        }
        assert!(!backend.is_seen("k0").await.unwrap());
        assert!(backend.is_seen(&format!("k{}", DEDUP_MAX_ENTRIES + 9)).await.unwrap());
    }
}
