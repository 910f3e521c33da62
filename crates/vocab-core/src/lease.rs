//! Single-writer leases on tables.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard},
};

use tracing::debug;

use crate::error::{Error, Result};

/// The set of tables currently being written. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
  held: Arc<Mutex<HashSet<String>>>,
}

impl TableLocks {
  pub fn new() -> Self { Self::default() }

  /// Take the write lease for `table`, failing immediately with
  /// [`Error::TableBusy`] if someone else holds it.
  pub fn try_acquire(&self, table: &str) -> Result<TableLease> {
    if !self.guard().insert(table.to_owned()) {
      return Err(Error::TableBusy(table.to_owned()));
    }
    debug!(table, "lease acquired");
    Ok(TableLease { locks: self.clone(), table: table.to_owned() })
  }

  pub fn is_held(&self, table: &str) -> bool { self.guard().contains(table) }

  // A panic while the mutex is held cannot leave the set half-updated.
  fn guard(&self) -> MutexGuard<'_, HashSet<String>> {
    self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// Exclusive write access to one table, released on drop.
#[derive(Debug)]
pub struct TableLease {
  locks: TableLocks,
  table: String,
}

impl TableLease {
  pub fn table(&self) -> &str { &self.table }
}

impl Drop for TableLease {
  fn drop(&mut self) {
    self.locks.guard().remove(&self.table);
    debug!(table = %self.table, "lease released");
  }
}
