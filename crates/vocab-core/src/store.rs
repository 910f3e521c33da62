//! The collaborator traits: where ontology graphs come from and where tables
//! are kept.
//!
//! Implemented by `vocab-owl` and `vocab-store-sqlite`. Nothing in this
//! crate depends on either.

use std::{fmt, future::Future, path::PathBuf, str::FromStr};

use crate::{error::SourceError, graph::OntologyGraph, history::HistoryEntry, table::Table};

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Where an ontology document lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
  Path(PathBuf),
  Url(String),
}

impl SourceRef {
  pub fn is_remote(&self) -> bool { matches!(self, Self::Url(_)) }
}

impl FromStr for SourceRef {
  type Err = std::convert::Infallible;

  /// `http://` and `https://` locations are URLs; anything else is a path.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lowered = s.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
      Ok(Self::Url(s.to_owned()))
    } else {
      Ok(Self::Path(PathBuf::from(s)))
    }
  }
}

impl fmt::Display for SourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Path(path) => write!(f, "{}", path.display()),
      Self::Url(url) => f.write_str(url),
    }
  }
}

/// Turns a [`SourceRef`] into a parsed graph.
pub trait OntologySource: Send + Sync {
  /// Load and parse `source`, including anything it imports that the
  /// provider knows how to follow.
  fn load<'a>(
    &'a self,
    source: &'a SourceRef,
  ) -> impl Future<Output = Result<OntologyGraph, SourceError>> + Send + 'a;
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// Persistence for tables and their history.
///
/// History is append-only: `save_table` adds entries and never rewrites or
/// removes earlier ones.
pub trait TableStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Load a table by name. A name never saved yields an empty table.
  fn load_table<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Table, Self::Error>> + Send + 'a;

  /// Persist every row of `table` and append `history`, atomically.
  fn save_table<'a>(
    &'a self,
    table: &'a Table,
    history: &'a [HistoryEntry],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// History of one term in append order, all languages.
  fn history<'a>(
    &'a self,
    table: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;

  /// Names of all stored tables.
  fn list_tables(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Claim the write lease on `table` for `holder`. Returns `false` while
  /// someone else holds it. The lease is visible to every handle on the same
  /// store, in this process or another.
  fn try_lease<'a>(
    &'a self,
    table: &'a str,
    holder: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Give back a lease taken with [`TableStore::try_lease`]. A lease held by
  /// another holder is left alone.
  fn release_lease<'a>(
    &'a self,
    table: &'a str,
    holder: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
