use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_sync_core::storage_keys::{
    generation_pointer_key, last_sync_key, membership_key, pending_generations_key, record_key,
    record_key_prefix,
};
use catalog_sync_core::store::{CatalogHead, CatalogStore, CommitOutcome, StagedRecord};
use catalog_sync_core::{CatalogError, CatalogResult};
use redis::{RedisError, Script};

use crate::adapters::connection::ConnectionManager;

/// KEYS[1] generation pointer, KEYS[2] last_sync, KEYS[3] pending set;
/// ARGV[1] generation, ARGV[2] last_sync.
/// Timestamps are fixed-width ISO-8601, so string comparison orders them.
const COMMIT_GENERATION_LUA: &str = r"
if not redis.call('ZSCORE', KEYS[3], ARGV[1]) then
  return {2, ''}
end
local current = redis.call('GET', KEYS[2])
if current and current > ARGV[2] then
  return {0, current}
end
local previous = redis.call('GET', KEYS[1])
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('ZREM', KEYS[3], ARGV[1])
return {1, previous or ''}
";

pub struct RedisCatalogStore {
    connections: Arc<ConnectionManager>,
    prefix: String,
    scan_batch_size: usize,
    commit_script: Script,
}

impl RedisCatalogStore {
    /// `scan_batch_size` bounds how many members one retire step touches.
    pub fn new(
        connections: Arc<ConnectionManager>,
        prefix: impl Into<String>,
        scan_batch_size: usize,
    ) -> Self {
        Self {
            connections,
            prefix: prefix.into(),
            scan_batch_size: scan_batch_size.max(1),
            commit_script: Script::new(COMMIT_GENERATION_LUA),
        }
    }
}

fn store_error(operation: &'static str) -> impl Fn(RedisError) -> CatalogError {
    move |error| {
        if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
            CatalogError::Connection(format!("{operation}: {error}"))
        } else {
            CatalogError::Store(format!("{operation}: {error}"))
        }
    }
}

#[async_trait]
impl CatalogStore for RedisCatalogStore {
    async fn register_pending(&self, generation: &str, staged_at_ms: i64) -> CatalogResult<()> {
        let mut connection = self.connections.get_connection().await?;
        let _: () = redis::cmd("ZADD")
            .arg(pending_generations_key(&self.prefix))
            .arg(staged_at_ms)
            .arg(generation)
            .query_async(&mut connection)
            .await
            .map_err(store_error("register pending generation"))?;
        Ok(())
    }

    async fn stale_pending(&self, cutoff_ms: i64) -> CatalogResult<Vec<String>> {
        let mut connection = self.connections.get_connection().await?;
        let stale: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(pending_generations_key(&self.prefix))
            .arg("-inf")
            .arg(format!("({cutoff_ms}"))
            .query_async(&mut connection)
            .await
            .map_err(store_error("list stale generations"))?;
        Ok(stale)
    }

    async fn stage_records(
        &self,
        generation: &str,
        records: &[StagedRecord],
    ) -> CatalogResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for record in records {
            pipe.cmd("SET")
                .arg(record_key(&self.prefix, generation, &record.id))
                .arg(&record.body)
                .ignore();
        }
        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        pipe.cmd("SADD")
            .arg(membership_key(&self.prefix, generation))
            .arg(&ids)
            .ignore();

        let mut connection = self.connections.get_connection().await?;
        let _: () = pipe
            .query_async(&mut connection)
            .await
            .map_err(store_error("stage records"))?;
        Ok(())
    }

    async fn commit_generation(
        &self,
        generation: &str,
        last_sync: &str,
    ) -> CatalogResult<CommitOutcome> {
        let mut invocation = self.commit_script.prepare_invoke();
        invocation
            .key(generation_pointer_key(&self.prefix))
            .key(last_sync_key(&self.prefix))
            .key(pending_generations_key(&self.prefix))
            .arg(generation)
            .arg(last_sync);

        let mut connection = self.connections.get_connection().await?;
        let (committed, value): (i64, String) = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(store_error("commit generation"))?;

        match committed {
            1 => Ok(CommitOutcome::Committed {
                previous_generation: Some(value).filter(|previous| !previous.is_empty()),
            }),
            0 => Ok(CommitOutcome::Superseded {
                current_last_sync: value,
            }),
            _ => Ok(CommitOutcome::Abandoned),
        }
    }

    async fn retire_generation(&self, generation: &str, grace: Duration) -> CatalogResult<usize> {
        let set_key = membership_key(&self.prefix, generation);
        let record_prefix = record_key_prefix(&self.prefix, generation);
        let ttl = grace.as_secs().max(1);
        let mut connection = self.connections.get_connection().await?;

        // SSCAN may repeat members across steps, so the count is an upper bound
        let mut retired = 0;
        let mut cursor: u64 = 0;
        loop {
            let (next, ids): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(&set_key)
                .arg(cursor)
                .arg("COUNT")
                .arg(self.scan_batch_size)
                .query_async(&mut connection)
                .await
                .map_err(store_error("scan membership"))?;

            if !ids.is_empty() {
                let mut pipe = redis::pipe();
                for id in &ids {
                    pipe.cmd("EXPIRE")
                        .arg(format!("{record_prefix}{id}"))
                        .arg(ttl)
                        .ignore();
                }
                let _: () = pipe
                    .query_async(&mut connection)
                    .await
                    .map_err(store_error("expire records"))?;
                retired += ids.len();
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut pipe = redis::pipe();
        pipe.cmd("EXPIRE").arg(&set_key).arg(ttl).ignore();
        pipe.cmd("ZREM")
            .arg(pending_generations_key(&self.prefix))
            .arg(generation)
            .ignore();
        let _: () = pipe
            .query_async(&mut connection)
            .await
            .map_err(store_error("retire generation"))?;
        Ok(retired)
    }

    async fn read_head(&self) -> CatalogResult<CatalogHead> {
        let mut connection = self.connections.get_connection().await?;
        let (last_sync, generation): (Option<String>, Option<String>) = redis::cmd("MGET")
            .arg(last_sync_key(&self.prefix))
            .arg(generation_pointer_key(&self.prefix))
            .query_async(&mut connection)
            .await
            .map_err(store_error("read catalog head"))?;
        Ok(CatalogHead {
            last_sync,
            generation,
        })
    }

    async fn read_membership(&self, generation: &str) -> CatalogResult<Vec<String>> {
        let mut connection = self.connections.get_connection().await?;
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(membership_key(&self.prefix, generation))
            .query_async(&mut connection)
            .await
            .map_err(store_error("read membership"))?;
        Ok(ids)
    }

    async fn fetch_records(
        &self,
        generation: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<Option<Vec<u8>>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| record_key(&self.prefix, generation, id))
            .collect();
        let mut connection = self.connections.get_connection().await?;
        let bodies: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut connection)
            .await
            .map_err(store_error("fetch records"))?;
        Ok(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_level_errors_are_not_store_errors() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(matches!(
            store_error("read catalog head")(io),
            CatalogError::Connection(_)
        ));

        let wrong_type = RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ));
        let mapped = store_error("read membership")(wrong_type);
        assert!(matches!(mapped, CatalogError::Store(_)));
        assert!(mapped.to_string().contains("read membership"));
    }

    #[test]
    fn commit_script_references_only_declared_keys_and_args() {
        assert!(COMMIT_GENERATION_LUA.contains("KEYS[3]"));
        assert!(!COMMIT_GENERATION_LUA.contains("KEYS[4]"));
        assert!(COMMIT_GENERATION_LUA.contains("ARGV[2]"));
        assert!(!COMMIT_GENERATION_LUA.contains("ARGV[3]"));
    }

    #[test]
    fn commit_script_checks_pending_before_switching() {
        let pending_check = COMMIT_GENERATION_LUA
            .find("ZSCORE")
            .expect("pending check");
        let switch = COMMIT_GENERATION_LUA
            .find("redis.call('SET', KEYS[1]")
            .expect("pointer switch");
        assert!(pending_check < switch);
        assert!(COMMIT_GENERATION_LUA.contains("redis.call('ZREM', KEYS[3], ARGV[1])"));
    }
}
