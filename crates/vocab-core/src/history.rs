//! Per-term change history and the per-pass diff report.
//!
//! History entries are written once and only ever appended; nothing in this
//! crate mutates or removes an entry after creation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString, IntoEnumIterator};
use uuid::Uuid;

use crate::term::{ChangeSet, TermField, TermKey, TermRecord};

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryKind {
  Added,
  Modified,
  Deprecated,
  Override,
}

/// One committed change to one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub entry_id:        Uuid,
  pub id:              String,
  pub language:        String,
  pub timestamp:       DateTime<Utc>,
  pub kind:            HistoryKind,
  pub changed_fields:  Vec<TermField>,
  /// Field values before the change. Empty for `added`.
  pub previous_values: BTreeMap<TermField, Value>,
  pub current_values:  BTreeMap<TermField, Value>,
}

impl HistoryEntry {
  pub fn from_changes(
    key: &TermKey,
    kind: HistoryKind,
    changes: &ChangeSet,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      entry_id: Uuid::new_v4(),
      id: key.id.clone(),
      language: key.language.clone(),
      timestamp,
      kind,
      changed_fields: changes.fields(),
      previous_values: changes.previous_values(),
      current_values: changes.current_values(),
    }
  }

  /// The entry for a newly inserted record: every populated field counts as
  /// changed.
  pub fn added(record: &TermRecord, timestamp: DateTime<Utc>) -> Self {
    let blank = TermRecord::new(record.id(), record.ontology.clone(), record.language());
    let current_values: BTreeMap<TermField, Value> = TermField::iter()
      .filter(|field| record.field_value(*field) != blank.field_value(*field))
      .map(|field| (field, record.field_value(field)))
      .chain([(TermField::Ontology, record.field_value(TermField::Ontology))])
      .collect();

    Self {
      entry_id: Uuid::new_v4(),
      id: record.id().to_owned(),
      language: record.language().to_owned(),
      timestamp,
      kind: HistoryKind::Added,
      changed_fields: current_values.keys().copied().collect(),
      previous_values: BTreeMap::new(),
      current_values,
    }
  }

  pub fn key(&self) -> TermKey { TermKey::new(self.id.clone(), self.language.clone()) }
}

/// In-memory append-only log, grouped by term id.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
  entries: BTreeMap<String, Vec<HistoryEntry>>,
}

impl HistoryLog {
  pub fn new() -> Self { Self::default() }

  pub fn append(&mut self, entry: HistoryEntry) {
    self.entries.entry(entry.id.clone()).or_default().push(entry);
  }

  pub fn extend(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
    for entry in entries {
      self.append(entry);
    }
  }

  /// Entries for `id` in append order, all languages.
  pub fn entries_for(&self, id: &str) -> &[HistoryEntry] {
    self.entries.get(id).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn len(&self) -> usize { self.entries.values().map(Vec::len).sum() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Something a pass wants a curator to know about but did not treat as an
/// error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Note {
  /// A source tried to change fields of a preferred record.
  LockedSkip { key: TermKey, fields: Vec<TermField> },
  /// Two ontologies supplied the same term; `winner` keeps its fields and
  /// `withheld` lists what the losing side was not allowed to change.
  SourceConflict {
    key:      TermKey,
    stored:   String,
    incoming: String,
    winner:   String,
    withheld: Vec<TermField>,
  },
  /// A deprecated record names a successor that is not in the table.
  DanglingReplacement { key: TermKey, replaced_by: String },
}

/// A record whose primary parent has just been deprecated. Advisory only;
/// the parent pointer is left as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentReview {
  pub child:             TermKey,
  pub deprecated_parent: String,
  pub replaced_by:       Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionKind {
  Validation,
  Cycle,
  UnresolvedParent,
}

/// A per-candidate problem collected during a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateError {
  pub key:     TermKey,
  pub kind:    RejectionKind,
  pub message: String,
}

/// The outcome of one reconciliation pass. Not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReport {
  pub added:           Vec<TermKey>,
  pub modified:        Vec<TermKey>,
  pub deprecated:      Vec<TermKey>,
  pub unchanged_count: usize,
  /// Stored records of the refreshed ontologies that this extraction did
  /// not produce.
  pub absent:          Vec<TermKey>,
  pub notes:           Vec<Note>,
  pub review:          Vec<ParentReview>,
  pub errors:          Vec<CandidateError>,
  pub entries:         Vec<HistoryEntry>,
}

impl DiffReport {
  /// True when the pass changed nothing and has nothing new to report.
  /// Absent records and source conflicts alone do not count; both repeat on
  /// every pass over the same input.
  pub fn is_empty(&self) -> bool {
    self.added.is_empty()
      && self.modified.is_empty()
      && self.deprecated.is_empty()
      && self.notes.iter().all(|n| matches!(n, Note::SourceConflict { .. }))
      && self.review.is_empty()
      && self.errors.is_empty()
  }

  /// File a committed entry under the matching bucket.
  pub fn record(&mut self, entry: HistoryEntry) {
    let key = entry.key();
    match entry.kind {
      HistoryKind::Added => self.added.push(key),
      HistoryKind::Deprecated => self.deprecated.push(key),
      HistoryKind::Modified | HistoryKind::Override => self.modified.push(key),
    }
    self.entries.push(entry);
  }

  /// Ids touched in this pass, any language.
  pub fn touched_ids(&self) -> BTreeSet<&str> {
    self.entries.iter().map(|e| e.id.as_str()).collect()
  }

  pub fn summary(&self) -> String {
    format!(
      "{} added, {} modified, {} deprecated, {} unchanged, {} absent, {} notes, {} for review, {} errors",
      self.added.len(),
      self.modified.len(),
      self.deprecated.len(),
      self.unchanged_count,
      self.absent.len(),
      self.notes.len(),
      self.review.len(),
      self.errors.len(),
    )
  }
}
