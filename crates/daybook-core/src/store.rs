//! Remote object-store contract and per-scope client
//!
//! [`ObjectStore`] is the interface this layer consumes; the actual backend
//! (and its authentication handshake) lives elsewhere. [`ScopeClient`]
//! narrows the store to one scope: it namespaces keys, translates the
//! backend's "not found" error family into an absent result, and forwards
//! the freshness bound unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::models::Scope;

/// Object type tag passed to the store when writing records
const RECORD_KIND: &str = "record";

/// Metadata returned by a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Stored size in bytes, when the backend reports it
    pub size: Option<u64>,
    /// Last modification instant, when the backend reports it
    pub modified: Option<DateTime<Utc>>,
}

/// A change notification for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Scope the changed object belongs to
    pub scope: Scope,
    /// Object id within the scope
    pub key: String,
}

/// What the store supports, queried once at connect time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Scopes available to the current user
    pub scopes: Vec<Scope>,
    /// Whether the store delivers change notifications
    pub supports_change_events: bool,
}

/// The remote object-store primitive
///
/// All operations are asynchronous; `max_age` bounds the staleness of a
/// cached read, not the duration of the call.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `key`
    ///
    /// Absence is reported through the not-found error family; callers that
    /// want an `Option` go through [`ScopeClient::get`].
    async fn get_object(&self, key: &str, max_age: Duration) -> Result<Value, StoreError>;

    /// List all keys under `prefix` with their metadata
    async fn get_listing(
        &self,
        prefix: &str,
        max_age: Duration,
    ) -> Result<BTreeMap<String, ObjectMeta>, StoreError>;

    /// Store `payload` at `key`, creating or overwriting
    async fn store_object(&self, kind: &str, key: &str, payload: &Value) -> Result<(), StoreError>;

    /// Erase the object at `key`
    async fn remove_object(&self, key: &str) -> Result<(), StoreError>;

    /// One-shot capability query performed at initialization
    async fn capabilities(&self) -> Result<StoreCapabilities, StoreError>;

    /// Subscribe to change notifications for all scopes
    async fn subscribe_changes(&self)
        -> Result<mpsc::UnboundedReceiver<ChangeEvent>, StoreError>;
}

/// Per-scope facade over an [`ObjectStore`]
///
/// Keys inside a scope are addressed as `<scope>/<id>`.
#[derive(Clone)]
pub struct ScopeClient {
    store: Arc<dyn ObjectStore>,
    scope: Scope,
}

impl ScopeClient {
    /// Create a client bound to one scope
    pub fn new(store: Arc<dyn ObjectStore>, scope: Scope) -> Self {
        Self { store, scope }
    }

    /// The scope this client addresses
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn object_key(&self, id: &str) -> String {
        format!("{}/{}", self.scope, id)
    }

    fn prefix(&self) -> String {
        format!("{}/", self.scope)
    }

    /// Fetch one object, translating not-found into `None`
    ///
    /// Every other failure propagates unchanged.
    pub async fn get(&self, id: &str, max_age: Duration) -> Result<Option<Value>, StoreError> {
        match self.store.get_object(&self.object_key(id), max_age).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List the ids of every object in the scope
    pub async fn list_ids(&self, max_age: Duration) -> Result<Vec<String>, StoreError> {
        let prefix = self.prefix();
        let listing = self.store.get_listing(&prefix, max_age).await?;
        Ok(listing
            .into_keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Store `payload` at `id`, creating or overwriting
    pub async fn store(&self, id: &str, payload: &Value) -> Result<(), StoreError> {
        self.store
            .store_object(RECORD_KIND, &self.object_key(id), payload)
            .await
    }

    /// Erase the object at `id`
    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.store.remove_object(&self.object_key(id)).await
    }
}
