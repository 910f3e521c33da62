//! Error types for `vocab-core`.

use thiserror::Error;

use crate::term::{TermField, TermKey};

/// A malformed record. Fatal for the single candidate that carries it, never
/// for the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("malformed term id {0:?}: expected prefix:identifier")]
  InvalidId(String),

  #[error("unrecognised language code {0:?}")]
  UnknownLanguage(String),

  #[error("term {0} lists itself as a parent")]
  SelfParent(String),

  #[error("term {id}: other_parents repeats primary parent {parent}")]
  ParentRepeated { id: String, parent: String },

  #[error("term {0} is replaced by itself")]
  SelfReplacement(String),

  #[error("candidate {candidate} does not match record {existing}")]
  KeyMismatch { existing: TermKey, candidate: TermKey },

  #[error("invalid value for {field}: {message}")]
  FieldValue { field: TermField, message: String },

  #[error("field {0} cannot be set directly")]
  ReadOnlyField(TermField),

  #[error("unrecognised expected type {0:?}")]
  ExpectedType(String),

  #[error("prefix {0:?} is reserved for locally minted terms")]
  ReservedPrefix(String),
}

/// Failure reported by an ontology source provider. Fatal for the whole
/// refresh; the table is left untouched.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("ontology source {location} is unavailable: {reason}")]
  Unavailable { location: String, reason: String },

  #[error("failed to parse ontology {location}: {reason}")]
  Parse { location: String, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("hierarchy cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("term {key} is preferred; source update to {} withheld", fields_list(fields))]
  LockConflict { key: TermKey, fields: Vec<TermField> },

  #[error("parent {parent} of {id} was never resolved")]
  UnresolvedParent { id: String, parent: String },

  #[error("term not found: {0}")]
  TermNotFound(TermKey),

  #[error("term {0} already exists")]
  DuplicateTerm(TermKey),

  #[error("table {0:?} is already being refreshed")]
  TableBusy(String),

  #[error("unsupported option: {0}")]
  Unsupported(String),

  #[error(transparent)]
  Source(#[from] SourceError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("extraction task failed: {0}")]
  Task(String),

  #[error("export error: {0}")]
  Export(String),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

fn fields_list(fields: &[TermField]) -> String {
  fields
    .iter()
    .map(|f| f.as_ref())
    .collect::<Vec<_>>()
    .join(", ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
