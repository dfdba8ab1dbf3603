//! In-memory [`CatalogStore`] using the same key layout as the Redis store.
//!
//! Intended for tests. Expiries are recorded but only take effect when
//! [`InMemoryCatalogStore::elapse_expiries`] is called.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::contract::{CatalogError, CatalogResult};
use crate::storage_keys::{
    generation_pointer_key, last_sync_key, membership_key, record_key, record_key_prefix,
    DEFAULT_KEY_PREFIX,
};
use crate::store::{CatalogHead, CatalogStore, CommitOutcome, StagedRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    Text(Vec<u8>),
    Members(BTreeSet<String>),
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, StoredValue>,
    expiries: HashMap<String, Duration>,
    pending: BTreeMap<String, i64>,
    round_trips: usize,
    stage_calls: usize,
    fail_stage_call: Option<usize>,
    fail_reads: bool,
    fail_commits: bool,
}

#[derive(Debug)]
pub struct InMemoryCatalogStore {
    prefix: String,
    state: Mutex<State>,
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl InMemoryCatalogStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Makes the `index`-th call to `stage_records` (zero based) fail.
    pub fn fail_stage_call(&self, index: usize) {
        self.state().fail_stage_call = Some(index);
    }

    pub fn fail_reads(&self, enabled: bool) {
        self.state().fail_reads = enabled;
    }

    /// Makes `commit_generation` fail without applying anything.
    pub fn fail_commits(&self, enabled: bool) {
        self.state().fail_commits = enabled;
    }

    pub fn pending_generations(&self) -> Vec<String> {
        self.state().pending.keys().cloned().collect()
    }

    pub fn round_trips(&self) -> usize {
        self.state().round_trips
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state().values.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.state().values.get(key) {
            Some(StoredValue::Text(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn members(&self, key: &str) -> BTreeSet<String> {
        match self.state().values.get(key) {
            Some(StoredValue::Members(members)) => members.clone(),
            _ => BTreeSet::new(),
        }
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state().expiries.get(key).copied()
    }

    pub fn current_generation(&self) -> Option<String> {
        self.text(&generation_pointer_key(&self.prefix))
    }

    pub fn current_membership(&self) -> BTreeSet<String> {
        self.current_generation()
            .map(|generation| self.members(&membership_key(&self.prefix, &generation)))
            .unwrap_or_default()
    }

    pub fn current_record(&self, id: &str) -> Option<String> {
        let generation = self.current_generation()?;
        self.text(&record_key(&self.prefix, &generation, id))
    }

    pub fn put_raw(&self, key: &str, body: &[u8]) {
        self.state()
            .values
            .insert(key.to_string(), StoredValue::Text(body.to_vec()));
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state();
        state.values.remove(key);
        state.expiries.remove(key);
    }

    /// Drops every key that has been given an expiry.
    pub fn elapse_expiries(&self) {
        let mut state = self.state();
        let expired: Vec<String> = state.expiries.drain().map(|(key, _)| key).collect();
        for key in expired {
            state.values.remove(&key);
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn register_pending(&self, generation: &str, staged_at_ms: i64) -> CatalogResult<()> {
        let mut state = self.state();
        state.round_trips += 1;
        state.pending.insert(generation.to_string(), staged_at_ms);
        Ok(())
    }

    async fn stale_pending(&self, cutoff_ms: i64) -> CatalogResult<Vec<String>> {
        let mut state = self.state();
        state.round_trips += 1;
        Ok(state
            .pending
            .iter()
            .filter(|(_, staged_at_ms)| **staged_at_ms < cutoff_ms)
            .map(|(generation, _)| generation.clone())
            .collect())
    }

    async fn stage_records(
        &self,
        generation: &str,
        records: &[StagedRecord],
    ) -> CatalogResult<()> {
        let mut state = self.state();
        state.round_trips += 1;
        let call = state.stage_calls;
        state.stage_calls += 1;
        if state.fail_stage_call == Some(call) {
            return Err(CatalogError::Store(format!(
                "simulated staging failure on call {call}"
            )));
        }

        let set_key = membership_key(&self.prefix, generation);
        for record in records {
            state.values.insert(
                record_key(&self.prefix, generation, &record.id),
                StoredValue::Text(record.body.as_bytes().to_vec()),
            );
        }
        let entry = state
            .values
            .entry(set_key)
            .or_insert_with(|| StoredValue::Members(BTreeSet::new()));
        if let StoredValue::Members(members) = entry {
            members.extend(records.iter().map(|record| record.id.clone()));
        }
        Ok(())
    }

    async fn commit_generation(
        &self,
        generation: &str,
        last_sync: &str,
    ) -> CatalogResult<CommitOutcome> {
        let mut state = self.state();
        state.round_trips += 1;
        if state.fail_commits {
            return Err(CatalogError::Connection(
                "simulated connection loss during commit".to_string(),
            ));
        }
        if !state.pending.contains_key(generation) {
            return Ok(CommitOutcome::Abandoned);
        }

        let sync_key = last_sync_key(&self.prefix);
        if let Some(StoredValue::Text(current)) = state.values.get(&sync_key) {
            let current = String::from_utf8_lossy(current).into_owned();
            if current.as_str() > last_sync {
                return Ok(CommitOutcome::Superseded {
                    current_last_sync: current,
                });
            }
        }

        let pointer_key = generation_pointer_key(&self.prefix);
        let previous_generation = match state.values.insert(
            pointer_key,
            StoredValue::Text(generation.as_bytes().to_vec()),
        ) {
            Some(StoredValue::Text(previous)) => {
                Some(String::from_utf8_lossy(&previous).into_owned())
            }
            _ => None,
        };
        state.values.insert(
            sync_key,
            StoredValue::Text(last_sync.as_bytes().to_vec()),
        );
        state.pending.remove(generation);

        Ok(CommitOutcome::Committed {
            previous_generation,
        })
    }

    async fn retire_generation(&self, generation: &str, grace: Duration) -> CatalogResult<usize> {
        let mut state = self.state();
        state.round_trips += 1;

        let set_key = membership_key(&self.prefix, generation);
        let members = match state.values.get(&set_key) {
            Some(StoredValue::Members(members)) => members.clone(),
            _ => BTreeSet::new(),
        };
        let record_prefix = record_key_prefix(&self.prefix, generation);
        for id in &members {
            let key = format!("{record_prefix}{id}");
            if state.values.contains_key(&key) {
                state.expiries.insert(key, grace);
            }
        }
        if state.values.contains_key(&set_key) {
            state.expiries.insert(set_key, grace);
        }
        state.pending.remove(generation);
        Ok(members.len())
    }

    async fn read_head(&self) -> CatalogResult<CatalogHead> {
        let mut state = self.state();
        state.round_trips += 1;
        if state.fail_reads {
            return Err(CatalogError::Connection(
                "simulated connection loss".to_string(),
            ));
        }

        let text = |key: String| match state.values.get(&key) {
            Some(StoredValue::Text(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        };
        Ok(CatalogHead {
            last_sync: text(last_sync_key(&self.prefix)),
            generation: text(generation_pointer_key(&self.prefix)),
        })
    }

    async fn read_membership(&self, generation: &str) -> CatalogResult<Vec<String>> {
        let mut state = self.state();
        state.round_trips += 1;
        match state.values.get(&membership_key(&self.prefix, generation)) {
            Some(StoredValue::Members(members)) => Ok(members.iter().cloned().collect()),
            Some(StoredValue::Text(_)) => Err(CatalogError::Store(
                "WRONGTYPE membership key holds a string".to_string(),
            )),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_records(
        &self,
        generation: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<Option<Vec<u8>>>> {
        let mut state = self.state();
        state.round_trips += 1;
        Ok(ids
            .iter()
            .map(
                |id| match state.values.get(&record_key(&self.prefix, generation, id)) {
                    Some(StoredValue::Text(bytes)) => Some(bytes.clone()),
                    _ => None,
                },
            )
            .collect())
    }
}
