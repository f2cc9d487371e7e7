//! Reactive scope cache
//!
//! Owns the scope-to-snapshot mapping plus the settings map, decoupled from
//! any rendering layer. Consumers subscribe through a watch channel and see
//! a full cloned snapshot after every mutation.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::watch;

use crate::models::{Record, Scope};

/// Snapshot of everything the coordinator currently holds
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    /// Record snapshots per scope
    pub scopes: HashMap<Scope, Vec<Record>>,
    /// Settings values by key
    pub settings: HashMap<String, Value>,
}

impl CacheState {
    /// Records cached for `scope`, empty when the scope is unknown
    pub fn records(&self, scope: &Scope) -> &[Record] {
        self.scopes.get(scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cached setting value for `key`
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }
}

/// The in-memory reactive cache for all scopes
#[derive(Debug)]
pub struct ScopeCache {
    state: watch::Sender<CacheState>,
}

impl ScopeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        let (state, _) = watch::channel(CacheState::default());
        Self { state }
    }

    /// Register the tracked scopes, each starting with an empty snapshot
    pub fn init(&self, scopes: &[Scope]) {
        self.state.send_modify(|cache| {
            for scope in scopes {
                cache.scopes.entry(scope.clone()).or_default();
            }
        });
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> CacheState {
        self.state.borrow().clone()
    }

    /// Replace the snapshot for one scope
    pub fn replace(&self, scope: &Scope, records: Vec<Record>) {
        self.state.send_modify(|cache| {
            cache.scopes.insert(scope.clone(), records);
        });
    }

    /// Set one settings value
    pub fn put_setting(&self, key: &str, value: Value) {
        self.state.send_modify(|cache| {
            cache.settings.insert(key.to_string(), value);
        });
    }

    /// Replace the whole settings map
    pub fn replace_settings(&self, settings: HashMap<String, Value>) {
        self.state.send_modify(|cache| {
            cache.settings = settings;
        });
    }

    /// Drop every snapshot and setting
    pub fn teardown(&self) {
        self.state.send_modify(|cache| {
            cache.scopes.clear();
            cache.settings.clear();
        });
    }
}

impl Default for ScopeCache {
    fn default() -> Self {
        Self::new()
    }
}
