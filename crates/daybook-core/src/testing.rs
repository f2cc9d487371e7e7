//! In-memory object store used across the crate's tests
//!
//! Implements the full [`ObjectStore`] contract against a `BTreeMap`, with
//! fault injection per key or listing prefix, and optional echoing of writes
//! as change events the way the real backend does.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::models::Scope;
use crate::store::{ChangeEvent, ObjectMeta, ObjectStore, StoreCapabilities};

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    fail_keys: HashSet<String>,
    fail_listings: HashSet<String>,
    last_max_age: Option<Duration>,
    events: Option<mpsc::UnboundedSender<ChangeEvent>>,
    echo_writes: bool,
}

pub(crate) struct MemoryStore {
    state: Mutex<State>,
    capabilities: StoreCapabilities,
}

impl MemoryStore {
    /// Store advertising the standard three scopes, write echo off
    pub(crate) fn new() -> Arc<Self> {
        Self::with_scopes(&["todos", "stock", "ai-config"])
    }

    pub(crate) fn with_scopes(scopes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            capabilities: StoreCapabilities {
                scopes: scopes.iter().map(|s| Scope::from(*s)).collect(),
                supports_change_events: true,
            },
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without going through the client stack
    pub(crate) fn insert_raw(&self, key: &str, value: Value) {
        self.lock().objects.insert(key.to_string(), value);
    }

    /// Snapshot of everything currently stored
    pub(crate) fn contents(&self) -> BTreeMap<String, Value> {
        self.lock().objects.clone()
    }

    /// Make reads and writes of `key` fail with a backend error
    pub(crate) fn fail_key(&self, key: &str) {
        self.lock().fail_keys.insert(key.to_string());
    }

    /// Make listings of `prefix` fail with a backend error
    pub(crate) fn fail_listing(&self, prefix: &str) {
        self.lock().fail_listings.insert(prefix.to_string());
    }

    /// The freshness bound passed to the most recent read
    pub(crate) fn last_max_age(&self) -> Option<Duration> {
        self.lock().last_max_age
    }

    /// Echo every successful write/remove as a change event
    pub(crate) fn echo_writes(&self, enabled: bool) {
        self.lock().echo_writes = enabled;
    }

    /// Deliver a change event, as an external writer would cause
    pub(crate) fn send_event(&self, scope: &str, key: &str) {
        let state = self.lock();
        if let Some(events) = &state.events {
            let _ = events.send(ChangeEvent {
                scope: Scope::from(scope),
                key: key.to_string(),
            });
        }
    }

    fn echo(state: &State, key: &str) {
        if !state.echo_writes {
            return;
        }
        let Some(events) = &state.events else {
            return;
        };
        let (scope, id) = match key.split_once('/') {
            Some(parts) => parts,
            None => ("", key),
        };
        let _ = events.send(ChangeEvent {
            scope: Scope::from(scope),
            key: id.to_string(),
        });
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, key: &str, max_age: Duration) -> Result<Value, StoreError> {
        let mut state = self.lock();
        state.last_max_age = Some(max_age);
        if state.fail_keys.contains(key) {
            return Err(StoreError::backend("io_error", format!("injected failure for '{}'", key)));
        }
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn get_listing(
        &self,
        prefix: &str,
        max_age: Duration,
    ) -> Result<BTreeMap<String, ObjectMeta>, StoreError> {
        let mut state = self.lock();
        state.last_max_age = Some(max_age);
        if state.fail_listings.contains(prefix) {
            return Err(StoreError::backend(
                "io_error",
                format!("injected listing failure for '{}'", prefix),
            ));
        }
        Ok(state
            .objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .map(|key| (key.clone(), ObjectMeta::default()))
            .collect())
    }

    async fn store_object(&self, _kind: &str, key: &str, payload: &Value) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_keys.contains(key) {
            return Err(StoreError::backend("storage_quota", format!("injected failure for '{}'", key)));
        }
        state.objects.insert(key.to_string(), payload.clone());
        Self::echo(&state, key);
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.objects.remove(key).is_none() {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Self::echo(&state, key);
        Ok(())
    }

    async fn capabilities(&self) -> Result<StoreCapabilities, StoreError> {
        Ok(self.capabilities.clone())
    }

    async fn subscribe_changes(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().events = Some(tx);
        Ok(rx)
    }
}
