//! [`Refresher`]: the store-backed workflow around [`refresh`](crate::refresh).
//!
//! lease → load sources → extract → load table → reconcile → save.
//!
//! A write takes two leases: the in-process [`TableLocks`] entry, then the
//! store's own lease, which other processes on the same store also honour.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  extract::Extractor,
  history::{DiffReport, HistoryEntry},
  lease::{TableLease, TableLocks},
  refresh::{RefreshOptions, refresh_candidates},
  store::{OntologySource, SourceRef, TableStore},
  table::Table,
  term::{TermField, TermKey, TermRecord},
};

fn store_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

/// Both halves of a write lease. The store half is released explicitly;
/// the local half on drop.
struct Held {
  holder: String,
  _local: TableLease,
}

pub struct Refresher<S, L> {
  store:  Arc<S>,
  loader: Arc<L>,
  locks:  TableLocks,
}

impl<S, L> Refresher<S, L>
where
  S: TableStore + 'static,
  L: OntologySource + 'static,
{
  pub fn new(store: Arc<S>, loader: Arc<L>) -> Self {
    Self { store, loader, locks: TableLocks::new() }
  }

  /// Share an existing lock set, e.g. between several refreshers over the
  /// same store.
  pub fn with_locks(mut self, locks: TableLocks) -> Self {
    self.locks = locks;
    self
  }

  pub fn locks(&self) -> &TableLocks { &self.locks }

  pub fn store(&self) -> &S { &self.store }

  /// Refresh `table` from `sources`.
  ///
  /// Sources are loaded and extracted concurrently; their candidates are
  /// reconciled in the order the sources are listed. Any source failure
  /// aborts the pass before the table is touched. The table is saved only
  /// if something changed.
  pub async fn refresh(
    &self,
    table: &str,
    sources: &[SourceRef],
    roots: &[String],
    options: &RefreshOptions,
  ) -> Result<(Table, DiffReport)> {
    options.check()?;
    let held = self.acquire(table).await?;
    let result = self.refresh_leased(table, sources, roots, options).await;
    self.release(table, held).await;
    result
  }

  async fn refresh_leased(
    &self,
    table: &str,
    sources: &[SourceRef],
    roots: &[String],
    options: &RefreshOptions,
  ) -> Result<(Table, DiffReport)> {
    let candidates = self.refresh_sources(sources, roots, options).await?;
    let mut current = self.store.load_table(table).await.map_err(store_error)?;
    let report = refresh_candidates(&mut current, candidates, options)?;

    if !report.entries.is_empty() {
      self
        .store
        .save_table(&current, &report.entries)
        .await
        .map_err(store_error)?;
    }
    Ok((current, report))
  }

  /// Load and extract every source concurrently, returning candidates in
  /// source order.
  pub async fn refresh_sources(
    &self,
    sources: &[SourceRef],
    roots: &[String],
    options: &RefreshOptions,
  ) -> Result<Vec<TermRecord>> {
    let mut tasks = JoinSet::new();
    for (idx, source) in sources.iter().enumerate() {
      let loader = Arc::clone(&self.loader);
      let source = source.clone();
      let roots = roots.to_vec();
      let extract = options.extract.clone();

      tasks.spawn(async move {
        let graph = loader.load(&source).await?;
        let records: Vec<TermRecord> =
          Extractor::new(&graph, &extract).extract_roots(roots.as_slice()).collect();
        debug!(%source, candidates = records.len(), "source extracted");
        Ok::<_, Error>((idx, records))
      });
    }

    let mut slots: Vec<Option<Vec<TermRecord>>> = vec![None; sources.len()];
    while let Some(joined) = tasks.join_next().await {
      let (idx, records) = joined.map_err(|e| Error::Task(e.to_string()))??;
      slots[idx] = Some(records);
    }
    Ok(slots.into_iter().flatten().flatten().collect())
  }

  pub async fn load(&self, table: &str) -> Result<Table> {
    self.store.load_table(table).await.map_err(store_error)
  }

  pub async fn history(&self, table: &str, id: &str) -> Result<Vec<HistoryEntry>> {
    self.store.history(table, id).await.map_err(store_error)
  }

  /// Set or clear the preferred flag on one row.
  pub async fn pin(&self, table: &str, key: &TermKey, preferred: bool) -> Result<Option<HistoryEntry>> {
    self
      .administer(table, |t, now| t.set_preferred(key, preferred, now))
      .await
  }

  /// Overwrite one field of one row, bypassing the preferred lock.
  pub async fn override_field(
    &self,
    table: &str,
    key: &TermKey,
    field: TermField,
    value: Value,
  ) -> Result<Option<HistoryEntry>> {
    self
      .administer(table, |t, now| t.override_field(key, field, value, now))
      .await
  }

  /// Mint a `LOCAL:` term.
  pub async fn mint(
    &self,
    table: &str,
    label: &str,
    language: &str,
    parent_id: Option<&str>,
  ) -> Result<HistoryEntry> {
    let entry = self
      .administer(table, |t, now| t.insert_local(label, language, parent_id, now).map(Some))
      .await?;
    entry.ok_or_else(|| Error::Task("mint produced no history entry".to_owned()))
  }

  async fn administer<F>(&self, table: &str, change: F) -> Result<Option<HistoryEntry>>
  where
    F: FnOnce(&mut Table, DateTime<Utc>) -> Result<Option<HistoryEntry>>,
  {
    let held = self.acquire(table).await?;
    let result = self.administer_leased(table, change).await;
    self.release(table, held).await;
    result
  }

  async fn administer_leased<F>(&self, table: &str, change: F) -> Result<Option<HistoryEntry>>
  where
    F: FnOnce(&mut Table, DateTime<Utc>) -> Result<Option<HistoryEntry>>,
  {
    let mut current = self.store.load_table(table).await.map_err(store_error)?;
    let Some(entry) = change(&mut current, Utc::now())? else {
      return Ok(None);
    };
    self
      .store
      .save_table(&current, std::slice::from_ref(&entry))
      .await
      .map_err(store_error)?;
    info!(table, id = %entry.id, kind = %entry.kind, "administrative change saved");
    Ok(Some(entry))
  }

  async fn acquire(&self, table: &str) -> Result<Held> {
    let local = self.locks.try_acquire(table)?;
    let holder = Uuid::new_v4().to_string();
    if !self
      .store
      .try_lease(table, &holder)
      .await
      .map_err(store_error)?
    {
      return Err(Error::TableBusy(table.to_owned()));
    }
    debug!(table, %holder, "store lease acquired");
    Ok(Held { holder, _local: local })
  }

  async fn release(&self, table: &str, held: Held) {
    if let Err(e) = self.store.release_lease(table, &held.holder).await {
      warn!(table, error = %e, "store lease not released; it will expire");
    }
  }
}
