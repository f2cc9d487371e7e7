//! Daybook Core Library
//!
//! Client-side synchronization layer for Daybook: reconciles locally held
//! planner records with a per-user remote object store that exposes named
//! scopes ("todos", "stock", "ai-config") under eventual consistency.
//!
//! # Architecture
//!
//! - [`engine::SyncEngine`]: CRUD, batch, and reconciliation over one scope
//! - [`coordinator::LocalStateCoordinator`]: the reactive cache for all
//!   scopes, the initial load, and the change-notification reload path
//! - [`store::ObjectStore`]: the contract the remote backend must satisfy
//!
//! The remote store is the sole source of truth; the last accepted write
//! wins. The only concurrency control is the saving guard, which keeps a
//! local write's own echoed change notification from triggering a redundant
//! reload.
//!
//! # Quick Start
//!
//! ```text
//! let store: Arc<dyn ObjectStore> = backend::connect(...).await?;
//! let mut coordinator = LocalStateCoordinator::new(store, Config::load()?);
//! coordinator.connect().await?;
//!
//! let todos = Scope::from("todos");
//! coordinator.add_record(&todos, &Record::new("buy milk")).await?;
//! let snapshot = coordinator.snapshot();
//! ```
//!
//! # Modules
//!
//! - `coordinator`: cache ownership, change subscription, saving guard
//! - `engine`: per-scope sync operations (main entry point for one scope)
//! - `store`: object-store contract and per-scope client
//! - `codec`: record wire mapping
//! - `models`: records, batch options and results
//! - `config`: application configuration
//! - `error`: error taxonomy

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use coordinator::{
    CacheState, ConnectionStatus, CoordinatorEvent, LocalStateCoordinator, SavingGuard,
    ScopeCache, SubscriptionHandle,
};
pub use engine::SyncEngine;
pub use error::{StoreError, SyncError, SyncResult};
pub use models::{
    BatchError, BatchOptions, BatchResult, LoadOptions, Record, RecordPatch, RecordStatus, Scope,
    DEFAULT_MAX_AGE,
};
pub use store::{ChangeEvent, ObjectMeta, ObjectStore, ScopeClient, StoreCapabilities};
