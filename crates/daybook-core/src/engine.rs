//! Sync engine
//!
//! CRUD, batch, and reconciliation operations over one scope. This is the
//! algorithmic core: everything above it (the coordinator, advisors,
//! presentation) only consumes its output.
//!
//! Concurrency discipline:
//! - `get_all` fans out per-key fetches with settle-all semantics; a single
//!   failing or malformed entry is dropped, never aborting the call
//! - batch mutations run strictly sequentially so progress reporting and
//!   stop-on-error counts stay deterministic
//! - `replace_all` runs its three batches concurrently relative to one
//!   another, each internally sequential
//!
//! There is no locking: the remote store is the sole source of truth and its
//! last accepted write wins.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, TimeZone};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{SyncError, SyncResult};
use crate::models::{
    BatchOptions, BatchResult, LoadOptions, Record, RecordPatch, RecordStatus, Scope,
};
use crate::store::{ObjectStore, ScopeClient};

/// Predicate over records, used by [`SyncEngine::count`]
pub type RecordPredicate = dyn Fn(&Record) -> bool + Send + Sync;

/// Synchronization operations over one scope
#[derive(Clone)]
pub struct SyncEngine {
    client: ScopeClient,
}

impl SyncEngine {
    /// Create an engine for one scope of the given store
    pub fn new(store: Arc<dyn ObjectStore>, scope: Scope) -> Self {
        Self {
            client: ScopeClient::new(store, scope),
        }
    }

    /// The scope this engine operates on
    pub fn scope(&self) -> &Scope {
        self.client.scope()
    }

    /// Store a record at its id, creating or overwriting
    ///
    /// Idempotent by design: no existence check is made.
    pub async fn add(&self, record: &Record) -> SyncResult<()> {
        self.client.store(&record.id, &codec::encode(record)).await?;
        Ok(())
    }

    /// Merge `patch` onto the current remote version of `id` and store it
    ///
    /// Reads force-fresh (max age zero) so the merge base is the latest
    /// accepted version. Fails with [`SyncError::NotFound`] when the record
    /// does not exist; no write happens in that case.
    ///
    /// Not serialized against concurrent updates to the same id: the remote
    /// store's last accepted write wins. This is an intentional limitation
    /// of the last-write-wins model, not something to paper over here.
    pub async fn update(&self, id: &str, patch: &RecordPatch) -> SyncResult<Record> {
        let value = self
            .client
            .get(id, Duration::ZERO)
            .await?
            .ok_or_else(|| SyncError::NotFound { id: id.to_string() })?;

        let mut record = codec::decode(id, &value)?;
        patch.apply(&mut record);
        self.client.store(id, &codec::encode(&record)).await?;
        Ok(record)
    }

    /// Hard-delete the record at `id`
    pub async fn remove(&self, id: &str) -> SyncResult<()> {
        self.client.remove(id).await?;
        Ok(())
    }

    /// Fetch one record
    ///
    /// Returns `None` when the record is absent or cannot be decoded; other
    /// store failures propagate.
    pub async fn get(&self, id: &str, max_age: Duration) -> SyncResult<Option<Record>> {
        let Some(value) = self.client.get(id, max_age).await? else {
            return Ok(None);
        };
        match codec::decode(id, &value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                debug!(scope = %self.scope(), id, "dropping invalid record: {}", e);
                Ok(None)
            }
        }
    }

    /// Fetch every record in the scope
    ///
    /// Per-key fetches run concurrently and settle independently; entries
    /// that fail to fetch or decode are dropped. Soft-deleted records are
    /// excluded unless `options.include_removed` is set.
    pub async fn get_all(&self, options: &LoadOptions) -> SyncResult<Vec<Record>> {
        let ids = self.client.list_ids(options.max_age).await?;
        let fetches = ids.iter().map(|id| self.client.get(id, options.max_age));
        let settled = join_all(fetches).await;

        let mut records = Vec::with_capacity(ids.len());
        for (id, outcome) in ids.iter().zip(settled) {
            match outcome {
                Ok(Some(value)) => match codec::decode(id, &value) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        debug!(scope = %self.scope(), id, "dropping invalid record: {}", e);
                    }
                },
                // Deleted between listing and fetch
                Ok(None) => {}
                Err(e) => {
                    warn!(scope = %self.scope(), id, "dropping unreadable record: {}", e);
                }
            }
        }

        if !options.include_removed {
            records.retain(|r| !r.removed);
        }
        Ok(records)
    }

    /// Fetch records whose date falls on `date` in the machine-local timezone
    ///
    /// Day equality is evaluated on the wall clock, not on normalized UTC.
    pub async fn get_by_date(&self, date: NaiveDate) -> SyncResult<Vec<Record>> {
        self.get_by_date_in(date, &Local).await
    }

    /// Fetch records whose date falls on `date` in the given timezone
    pub async fn get_by_date_in<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> SyncResult<Vec<Record>> {
        let mut records = self.get_all(&LoadOptions::default()).await?;
        records.retain(|r| {
            r.date
                .map(|d| d.with_timezone(tz).date_naive() == date)
                .unwrap_or(false)
        });
        Ok(records)
    }

    /// Store each record in order, capturing per-item outcomes
    pub async fn batch_add(&self, records: &[Record], options: &BatchOptions) -> BatchResult {
        let total = records.len();
        let mut result = BatchResult::default();
        for (index, record) in records.iter().enumerate() {
            let failed = match self.add(record).await {
                Ok(()) => {
                    result.record_success();
                    false
                }
                Err(e) => {
                    warn!(scope = %self.scope(), id = %record.id, "batch add failed: {}", e);
                    result.record_failure(&record.id, e);
                    true
                }
            };
            if let Some(progress) = &options.on_progress {
                progress(index + 1, total);
            }
            if failed && options.stop_on_error {
                break;
            }
        }
        result
    }

    /// Apply each (id, patch) pair in order, capturing per-item outcomes
    pub async fn batch_update(
        &self,
        items: &[(String, RecordPatch)],
        options: &BatchOptions,
    ) -> BatchResult {
        let total = items.len();
        let mut result = BatchResult::default();
        for (index, (id, patch)) in items.iter().enumerate() {
            let failed = match self.update(id, patch).await {
                Ok(_) => {
                    result.record_success();
                    false
                }
                Err(e) => {
                    warn!(scope = %self.scope(), id = %id, "batch update failed: {}", e);
                    result.record_failure(id, e);
                    true
                }
            };
            if let Some(progress) = &options.on_progress {
                progress(index + 1, total);
            }
            if failed && options.stop_on_error {
                break;
            }
        }
        result
    }

    /// Hard-delete each id in order, capturing per-item outcomes
    pub async fn batch_remove(&self, ids: &[String], options: &BatchOptions) -> BatchResult {
        let total = ids.len();
        let mut result = BatchResult::default();
        for (index, id) in ids.iter().enumerate() {
            let failed = match self.remove(id).await {
                Ok(()) => {
                    result.record_success();
                    false
                }
                Err(e) => {
                    warn!(scope = %self.scope(), id = %id, "batch remove failed: {}", e);
                    result.record_failure(id, e);
                    true
                }
            };
            if let Some(progress) = &options.on_progress {
                progress(index + 1, total);
            }
            if failed && options.stop_on_error {
                break;
            }
        }
        result
    }

    /// Reconcile the scope to exactly `new_records`
    ///
    /// Snapshots existing records (soft-deleted ones included) and partitions
    /// `old ∪ new` exhaustively: ids only in `new_records` are added, ids in
    /// both are updated (even when unchanged), ids only in the snapshot are
    /// removed. The three batches run concurrently, each one internally
    /// sequential, and their results are merged.
    ///
    /// Not transactional: a failure in one batch leaves the scope in a mixed
    /// state that callers must reconcile manually.
    pub async fn replace_all(&self, new_records: &[Record]) -> SyncResult<BatchResult> {
        let existing = self
            .get_all(&LoadOptions::default().include_removed())
            .await?;

        let existing_ids: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
        let new_ids: HashSet<&str> = new_records.iter().map(|r| r.id.as_str()).collect();

        let to_add: Vec<Record> = new_records
            .iter()
            .filter(|r| !existing_ids.contains(r.id.as_str()))
            .cloned()
            .collect();
        let to_update: Vec<(String, RecordPatch)> = new_records
            .iter()
            .filter(|r| existing_ids.contains(r.id.as_str()))
            .map(|r| (r.id.clone(), RecordPatch::from_record(r)))
            .collect();
        let to_remove: Vec<String> = existing
            .iter()
            .filter(|r| !new_ids.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect();

        debug!(
            scope = %self.scope(),
            adds = to_add.len(),
            updates = to_update.len(),
            removes = to_remove.len(),
            "reconciling scope"
        );

        let options = BatchOptions::default();
        let (added, updated, removed) = tokio::join!(
            self.batch_add(&to_add, &options),
            self.batch_update(&to_update, &options),
            self.batch_remove(&to_remove, &options),
        );

        Ok(added.merge(updated).merge(removed))
    }

    /// Remove every record dated `date` (local day); returns removed count
    pub async fn clear_by_date(&self, date: NaiveDate) -> SyncResult<usize> {
        let records = self.get_by_date(date).await?;
        self.remove_records(records).await
    }

    /// Remove completed records dated `date`; returns removed count
    pub async fn clear_completed_by_date(&self, date: NaiveDate) -> SyncResult<usize> {
        let mut records = self.get_by_date(date).await?;
        records.retain(|r| r.status == RecordStatus::Done);
        self.remove_records(records).await
    }

    /// Remove pending records dated `date`; returns removed count
    pub async fn clear_incomplete_by_date(&self, date: NaiveDate) -> SyncResult<usize> {
        let mut records = self.get_by_date(date).await?;
        records.retain(|r| r.status == RecordStatus::Pending);
        self.remove_records(records).await
    }

    /// Count records, optionally restricted to those matching `predicate`
    pub async fn count(&self, predicate: Option<&RecordPredicate>) -> SyncResult<usize> {
        let records = self.get_all(&LoadOptions::default()).await?;
        Ok(match predicate {
            Some(matches) => records.iter().filter(|r| matches(r)).count(),
            None => records.len(),
        })
    }

    async fn remove_records(&self, records: Vec<Record>) -> SyncResult<usize> {
        let ids: Vec<String> = records.into_iter().map(|r| r.id).collect();
        let result = self.batch_remove(&ids, &BatchOptions::default()).await;
        Ok(result.succeeded)
    }
}
