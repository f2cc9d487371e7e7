//! Local state coordination
//!
//! The coordinator owns the reactive cache for all scopes, drives the
//! initial load, listens for remote change notifications, and keeps local
//! writes from re-triggering themselves through their own echoed events.
//!
//! ## Connection lifecycle
//!
//! `Disconnected → Connecting → Connected → Disconnected`, re-enterable.
//! Entering `Connected` queries the store's capabilities once, builds one
//! engine per advertised scope, and reloads everything. Each scope's loader
//! failure is caught and logged on its own so one scope never blocks the
//! others.
//!
//! ## Write paths
//!
//! Record writes are pessimistic: the authoritative scope listing is
//! reloaded after the remote write settles, success or failure. Settings
//! writes are optimistic: the new value lands in the cache immediately and a
//! failed write forces a full reload to resynchronize.

mod cache;
mod guard;

pub use cache::{CacheState, ScopeCache};
pub use guard::SavingGuard;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::models::{BatchResult, LoadOptions, Record, RecordPatch, Scope};
use crate::store::{ChangeEvent, ObjectStore, ScopeClient};

/// Connection state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Capability query in progress
    Connecting,
    /// Connected, cache loaded and change listener running
    Connected,
}

/// Events emitted by the coordinator
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// Connection status changed
    StatusChanged(ConnectionStatus),
    /// A scope's snapshot was reloaded into the cache
    ScopeReloaded(Scope),
    /// A scope's reload failed; the other scopes were unaffected
    ReloadFailed { scope: Scope, error: String },
    /// A change notification was recognized as our own echo and dropped
    ChangeSuppressed { scope: Scope, key: String },
}

/// Handle to the change-notification listener
///
/// Dropping the handle aborts the listener; `unsubscribe` shuts it down
/// deterministically and waits for the task to finish.
pub struct SubscriptionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop the listener and wait until it has exited
    pub async fn unsubscribe(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Engines and clients built from the capability query
#[derive(Default)]
struct Topology {
    engines: HashMap<Scope, SyncEngine>,
    settings: Option<ScopeClient>,
}

struct Inner {
    store: Arc<dyn ObjectStore>,
    config: Config,
    topology: RwLock<Topology>,
    cache: ScopeCache,
    guard: SavingGuard,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl Inner {
    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send(status);
        self.emit(CoordinatorEvent::StatusChanged(status));
    }

    /// Reload every tracked scope, isolating per-scope failures
    async fn reload_all(&self) {
        let topology = self.topology.read().await;
        for (scope, engine) in &topology.engines {
            self.reload_engine(scope, engine).await;
        }
        if topology.settings.is_some() {
            self.reload_settings(&topology).await;
        }
    }

    async fn reload_scope(&self, scope: &Scope) {
        let topology = self.topology.read().await;
        if let Some(engine) = topology.engines.get(scope) {
            self.reload_engine(scope, engine).await;
        } else if topology
            .settings
            .as_ref()
            .is_some_and(|client| client.scope() == scope)
        {
            self.reload_settings(&topology).await;
        }
    }

    async fn reload_engine(&self, scope: &Scope, engine: &SyncEngine) {
        match engine.get_all(&LoadOptions::fresh()).await {
            Ok(records) => {
                debug!(scope = %scope, count = records.len(), "scope reloaded");
                self.cache.replace(scope, records);
                self.emit(CoordinatorEvent::ScopeReloaded(scope.clone()));
            }
            Err(e) => {
                warn!(scope = %scope, "scope reload failed: {}", e);
                self.emit(CoordinatorEvent::ReloadFailed {
                    scope: scope.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Load the settings scope as raw values rather than records
    async fn reload_settings(&self, topology: &Topology) {
        let Some(client) = &topology.settings else {
            return;
        };
        let scope = client.scope().clone();
        let keys = match client.list_ids(Duration::ZERO).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(scope = %scope, "settings reload failed: {}", e);
                self.emit(CoordinatorEvent::ReloadFailed {
                    scope,
                    error: e.to_string(),
                });
                return;
            }
        };

        let fetches = keys.iter().map(|key| client.get(key, Duration::ZERO));
        let settled = join_all(fetches).await;

        let mut settings = HashMap::new();
        for (key, outcome) in keys.into_iter().zip(settled) {
            match outcome {
                Ok(Some(value)) => {
                    settings.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(scope = %scope, key, "dropping unreadable setting: {}", e);
                }
            }
        }
        self.cache.replace_settings(settings);
        self.emit(CoordinatorEvent::ScopeReloaded(scope));
    }

    async fn handle_change(&self, event: ChangeEvent) {
        if self.guard.absorb(&event.scope, &event.key) {
            debug!(scope = %event.scope, key = %event.key, "suppressed own change echo");
            self.emit(CoordinatorEvent::ChangeSuppressed {
                scope: event.scope,
                key: event.key,
            });
            return;
        }
        debug!(scope = %event.scope, key = %event.key, "remote change, reloading");
        self.reload_all().await;
    }
}

/// Owns the reactive cache and reconciles it with the remote store
pub struct LocalStateCoordinator {
    inner: Arc<Inner>,
    status_rx: watch::Receiver<ConnectionStatus>,
    event_rx: Option<mpsc::UnboundedReceiver<CoordinatorEvent>>,
    subscription: Option<SubscriptionHandle>,
}

impl LocalStateCoordinator {
    /// Create a coordinator over the given store
    pub fn new(store: Arc<dyn ObjectStore>, config: Config) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let guard = SavingGuard::new(config.guard_window());

        Self {
            inner: Arc::new(Inner {
                store,
                config,
                topology: RwLock::new(Topology::default()),
                cache: ScopeCache::new(),
                guard,
                status: status_tx,
                events: event_tx,
            }),
            status_rx,
            event_rx: Some(event_rx),
            subscription: None,
        }
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to connection status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<CoordinatorEvent>> {
        self.event_rx.take()
    }

    /// Subscribe to cache snapshot changes
    pub fn subscribe_cache(&self) -> watch::Receiver<CacheState> {
        self.inner.cache.subscribe()
    }

    /// Current cache snapshot
    pub fn snapshot(&self) -> CacheState {
        self.inner.cache.snapshot()
    }

    /// Scopes currently tracked (empty before `connect`)
    pub async fn scopes(&self) -> Vec<Scope> {
        let topology = self.inner.topology.read().await;
        topology.engines.keys().cloned().collect()
    }

    /// Connect: query capabilities, build engines, load, start listening
    pub async fn connect(&mut self) -> SyncResult<()> {
        self.inner.set_status(ConnectionStatus::Connecting);

        let capabilities = match self.inner.store.capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                self.inner.set_status(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };
        info!(scopes = capabilities.scopes.len(), "store capabilities resolved");

        let settings_scope = Scope::from(self.inner.config.settings_scope.as_str());
        let mut topology = Topology::default();
        let mut record_scopes = Vec::new();
        for scope in capabilities.scopes {
            if scope == settings_scope {
                topology.settings = Some(ScopeClient::new(
                    self.inner.store.clone(),
                    scope,
                ));
            } else {
                let engine = SyncEngine::new(self.inner.store.clone(), scope.clone());
                topology.engines.insert(scope.clone(), engine);
                record_scopes.push(scope);
            }
        }
        self.inner.cache.init(&record_scopes);
        *self.inner.topology.write().await = topology;

        self.inner.set_status(ConnectionStatus::Connected);
        self.inner.reload_all().await;

        if capabilities.supports_change_events {
            let receiver = self.inner.store.subscribe_changes().await?;
            self.subscription = Some(spawn_change_listener(self.inner.clone(), receiver));
        }
        Ok(())
    }

    /// Disconnect: stop the change listener and mark disconnected
    ///
    /// The cache keeps its last snapshot; `connect` may be called again.
    pub async fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Disconnect and drop all cached state
    pub async fn teardown(&mut self) {
        self.disconnect().await;
        self.inner.cache.teardown();
        self.inner.guard.clear();
    }

    /// Add a record to a scope, then reload that scope's listing
    pub async fn add_record(&self, scope: &Scope, record: &Record) -> SyncResult<()> {
        let topology = self.inner.topology.read().await;
        let engine = Self::engine(&topology, scope)?;
        self.inner.guard.begin(scope, &record.id);
        let result = engine.add(record).await;
        drop(topology);

        self.inner.reload_scope(scope).await;
        result
    }

    /// Merge a patch onto a record, then reload that scope's listing
    pub async fn update_record(
        &self,
        scope: &Scope,
        id: &str,
        patch: &RecordPatch,
    ) -> SyncResult<Record> {
        let topology = self.inner.topology.read().await;
        let engine = Self::engine(&topology, scope)?;
        self.inner.guard.begin(scope, id);
        let result = engine.update(id, patch).await;
        drop(topology);

        self.inner.reload_scope(scope).await;
        result
    }

    /// Hard-delete a record, then reload that scope's listing
    pub async fn remove_record(&self, scope: &Scope, id: &str) -> SyncResult<()> {
        let topology = self.inner.topology.read().await;
        let engine = Self::engine(&topology, scope)?;
        self.inner.guard.begin(scope, id);
        let result = engine.remove(id).await;
        drop(topology);

        self.inner.reload_scope(scope).await;
        result
    }

    /// Reconcile a scope to exactly `records`, then reload its listing
    pub async fn replace_scope(
        &self,
        scope: &Scope,
        records: &[Record],
    ) -> SyncResult<BatchResult> {
        let topology = self.inner.topology.read().await;
        let engine = Self::engine(&topology, scope)?;
        // Removal echoes are not guarded; they only cost one extra reload
        for record in records {
            self.inner.guard.begin(scope, &record.id);
        }
        let result = engine.replace_all(records).await;
        drop(topology);

        self.inner.reload_scope(scope).await;
        result
    }

    /// Write a settings value optimistically
    ///
    /// The cache is updated before the remote write resolves. A failed
    /// write forces a full reload instead of rolling the value back.
    pub async fn put_setting(&self, key: &str, value: Value) -> SyncResult<()> {
        self.inner.cache.put_setting(key, value.clone());

        let topology = self.inner.topology.read().await;
        let Some(client) = &topology.settings else {
            return Err(SyncError::UnknownScope {
                scope: Scope::from(self.inner.config.settings_scope.as_str()),
            });
        };
        self.inner.guard.begin(client.scope(), key);
        let outcome = client.store(key, &value).await;
        drop(topology);

        if let Err(e) = outcome {
            warn!(key, "settings write failed, forcing reload: {}", e);
            self.inner.reload_all().await;
            return Err(e.into());
        }
        Ok(())
    }

    fn engine<'t>(topology: &'t Topology, scope: &Scope) -> SyncResult<&'t SyncEngine> {
        topology
            .engines
            .get(scope)
            .ok_or_else(|| SyncError::UnknownScope {
                scope: scope.clone(),
            })
    }
}

/// Spawn the change-notification listener task
fn spawn_change_listener(
    inner: Arc<Inner>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
) -> SubscriptionHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                event = events.recv() => {
                    match event {
                        Some(event) => inner.handle_change(event).await,
                        None => break,
                    }
                }
            }
        }
        debug!("change listener stopped");
    });

    SubscriptionHandle {
        shutdown: shutdown_tx,
        task,
    }
}
