//! The pure refresh entry point: extract from a graph and reconcile into a
//! table, without touching any store.

use std::time::Instant;

use chrono::Utc;
use tracing::info;

use crate::{
  error::{Error, Result},
  extract::{ExtractOptions, Extractor},
  graph::OntologyGraph,
  history::DiffReport,
  reconcile::{Reconciler, SourcePolicy},
  table::Table,
  term::TermRecord,
};

#[derive(Debug, Clone)]
pub struct RefreshOptions {
  pub policy:               SourcePolicy,
  pub extract:              ExtractOptions,
  /// Deprecating a parent only flags its children for review. Automatic
  /// reassignment is not supported, so this must stay `true`.
  pub advisory_deprecation: bool,
}

impl Default for RefreshOptions {
  fn default() -> Self {
    Self {
      policy:               SourcePolicy::default(),
      extract:              ExtractOptions::default(),
      advisory_deprecation: true,
    }
  }
}

impl RefreshOptions {
  pub fn check(&self) -> Result<()> {
    if !self.advisory_deprecation {
      return Err(Error::Unsupported(
        "automatic reassignment of deprecated parents".to_owned(),
      ));
    }
    Ok(())
  }
}

/// Refresh `table` from one graph. Returns the updated table and the pass
/// report; per-candidate problems are in the report, never in the error.
pub fn refresh<S: AsRef<str>>(
  mut table: Table,
  graph: &OntologyGraph,
  roots: &[S],
  options: &RefreshOptions,
) -> Result<(Table, DiffReport)> {
  options.check()?;
  let candidates = Extractor::new(graph, &options.extract).extract_roots(roots);
  let report = refresh_candidates(&mut table, candidates, options)?;
  Ok((table, report))
}

/// Reconcile already extracted candidates, in order, into `table`.
pub fn refresh_candidates(
  table: &mut Table,
  candidates: impl IntoIterator<Item = TermRecord>,
  options: &RefreshOptions,
) -> Result<DiffReport> {
  options.check()?;
  let started = Instant::now();

  let mut reconciler = Reconciler::new(table, &options.policy, Utc::now());
  for candidate in candidates {
    reconciler.reconcile(candidate);
  }
  let report = reconciler.finish();

  info!(
    table = table.name(),
    elapsed_ms = started.elapsed().as_millis() as u64,
    "refresh pass: {}",
    report.summary()
  );
  Ok(report)
}
