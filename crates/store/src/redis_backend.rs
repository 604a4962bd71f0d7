//! Shared (Redis) dedup/lock/result backend, for multi-replica deployments
//! (spec.md §4.2, §6 "state backend = memory | shared").
//!
//! Lock renewal and release use compare-and-set `EVAL` scripts rather than
//! plain `GET`+`DEL`/`GET`+`PEXPIRE` pairs, so a lease that expired and was
//! re-acquired by another holder is never silently extended or deleted by
//! the original holder (spec.md §4.2 "Renewal").

use std::time::Duration;

use controller_core::{ControllerError, ControllerResult, TaskResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const COMPARE_AND_RENEW: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> ControllerResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ControllerError::ConfigInvalid(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }

    fn dedup_key(key: &str) -> String {
        format!("dedup:{key}")
    }

    fn lock_key(key: &str) -> String {
        format!("lock:{key}")
    }

    fn result_key(task_id: &str) -> String {
        format!("result:{task_id}")
    }

    pub async fn is_seen(&self, key: &str) -> ControllerResult<bool> {
        let mut conn = self.conn.clone();
        let seen: bool = conn
            .exists(Self::dedup_key(key))
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(seen)
    }

    pub async fn mark_seen(&self, key: &str, ttl: Duration) -> ControllerResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::dedup_key(key), "1", ttl.as_secs().max(1))
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn try_acquire(&self, key: &str, ttl: Duration, token: &str) -> ControllerResult<bool> {
        let mut conn = self.conn.clone();
        let acquired: bool = redis::cmd("SET")
            .arg(Self::lock_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(acquired)
    }

    pub async fn renew(&self, key: &str, token: &str, ttl: Duration) -> ControllerResult<bool> {
        let mut conn = self.conn.clone();
        let renewed: i64 = redis::Script::new(COMPARE_AND_RENEW)
            .key(Self::lock_key(key))
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(renewed == 1)
    }

    pub async fn release(&self, key: &str, token: &str) -> ControllerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(Self::lock_key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn put_result(&self, task_id: &str, result: &TaskResult, ttl: Duration) -> ControllerResult<()> {
        let json = serde_json::to_string(result)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::result_key(task_id), json, ttl.as_secs().max(1))
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn get_result(&self, task_id: &str) -> ControllerResult<Option<TaskResult>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::result_key(task_id))
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}
