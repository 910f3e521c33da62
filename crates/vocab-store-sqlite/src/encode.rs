//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Set-valued fields and history value maps
//! are compact JSON. Booleans are 0/1 integers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use vocab_core::{
  history::{HistoryEntry, HistoryKind},
  term::{SynonymSet, TermRecord},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn encode_set(set: &SynonymSet) -> Result<String> {
  Ok(serde_json::to_string(&set.iter().collect::<Vec<_>>())?)
}

fn decode_set(s: &str) -> Result<SynonymSet> { Ok(serde_json::from_str(s)?) }

// ─── Term rows ───────────────────────────────────────────────────────────────

/// Column values of one `terms` row, in schema order.
#[derive(Debug, Clone)]
pub struct RawTerm {
  pub term_id:        String,
  pub language:       String,
  pub ontology:       String,
  pub parent_id:      Option<String>,
  pub other_parents:  String,
  pub label:          String,
  pub definition:     String,
  pub ui_label:       String,
  pub ui_definition:  String,
  pub ui_help:        String,
  pub synonym:        String,
  pub broad_synonym:  String,
  pub narrow_synonym: String,
  pub exact_synonym:  String,
  pub updated:        String,
  pub preferred:      i64,
  pub deprecated:     i64,
  pub replaced_by:    Option<String>,
  pub version:        Option<String>,
  pub expected_type:  String,
}

/// Columns selected by [`RawTerm::from_row`], in order.
pub const TERM_COLUMNS: &str = "term_id, language, ontology, parent_id, other_parents, label, \
                                definition, ui_label, ui_definition, ui_help, synonym, \
                                broad_synonym, narrow_synonym, exact_synonym, updated, \
                                preferred, deprecated, replaced_by, version, expected_type";

impl RawTerm {
  pub fn from_record(r: &TermRecord) -> Result<Self> {
    Ok(Self {
      term_id:        r.id().to_owned(),
      language:       r.language().to_owned(),
      ontology:       r.ontology.clone(),
      parent_id:      r.parent_id.clone(),
      other_parents:  serde_json::to_string(&r.other_parents)?,
      label:          r.label.clone(),
      definition:     r.definition.clone(),
      ui_label:       r.ui_label.clone(),
      ui_definition:  r.ui_definition.clone(),
      ui_help:        r.ui_help.clone(),
      synonym:        encode_set(&r.synonym)?,
      broad_synonym:  encode_set(&r.broad_synonym)?,
      narrow_synonym: encode_set(&r.narrow_synonym)?,
      exact_synonym:  encode_set(&r.exact_synonym)?,
      updated:        encode_dt(r.updated),
      preferred:      i64::from(r.preferred),
      deprecated:     i64::from(r.deprecated),
      replaced_by:    r.replaced_by.clone(),
      version:        r.version.clone(),
      expected_type:  r.expected_type.to_string(),
    })
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      term_id:        row.get(0)?,
      language:       row.get(1)?,
      ontology:       row.get(2)?,
      parent_id:      row.get(3)?,
      other_parents:  row.get(4)?,
      label:          row.get(5)?,
      definition:     row.get(6)?,
      ui_label:       row.get(7)?,
      ui_definition:  row.get(8)?,
      ui_help:        row.get(9)?,
      synonym:        row.get(10)?,
      broad_synonym:  row.get(11)?,
      narrow_synonym: row.get(12)?,
      exact_synonym:  row.get(13)?,
      updated:        row.get(14)?,
      preferred:      row.get(15)?,
      deprecated:     row.get(16)?,
      replaced_by:    row.get(17)?,
      version:        row.get(18)?,
      expected_type:  row.get(19)?,
    })
  }

  pub fn into_record(self) -> Result<TermRecord> {
    let mut record = TermRecord::new(self.term_id, self.ontology, self.language);
    record.parent_id = self.parent_id;
    record.other_parents = serde_json::from_str::<BTreeSet<String>>(&self.other_parents)?;
    record.label = self.label;
    record.definition = self.definition;
    record.ui_label = self.ui_label;
    record.ui_definition = self.ui_definition;
    record.ui_help = self.ui_help;
    record.synonym = decode_set(&self.synonym)?;
    record.broad_synonym = decode_set(&self.broad_synonym)?;
    record.narrow_synonym = decode_set(&self.narrow_synonym)?;
    record.exact_synonym = decode_set(&self.exact_synonym)?;
    record.updated = decode_dt(&self.updated)?;
    record.preferred = self.preferred != 0;
    record.deprecated = self.deprecated != 0;
    record.replaced_by = self.replaced_by;
    record.version = self.version;
    record.expected_type = self
      .expected_type
      .parse()
      .map_err(|e: vocab_core::ValidationError| Error::Decode(e.to_string()))?;
    Ok(record)
  }

  fn hash_into(&self, hasher: &mut Sha256) {
    let optional = |v: &Option<String>| v.as_deref().map_or_else(|| "\u{0}".to_owned(), str::to_owned);
    let columns = [
      self.term_id.clone(),
      self.language.clone(),
      self.ontology.clone(),
      optional(&self.parent_id),
      self.other_parents.clone(),
      self.label.clone(),
      self.definition.clone(),
      self.ui_label.clone(),
      self.ui_definition.clone(),
      self.ui_help.clone(),
      self.synonym.clone(),
      self.broad_synonym.clone(),
      self.narrow_synonym.clone(),
      self.exact_synonym.clone(),
      self.updated.clone(),
      self.preferred.to_string(),
      self.deprecated.to_string(),
      optional(&self.replaced_by),
      optional(&self.version),
      self.expected_type.clone(),
    ];
    for column in &columns {
      hasher.update(column.as_bytes());
      hasher.update([0x1f_u8]);
    }
    hasher.update([0x1e_u8]);
  }
}

/// Hex SHA-256 over `rows`, which must be in `(term_id, language)` order.
pub fn checksum<'a>(rows: impl IntoIterator<Item = &'a RawTerm>) -> String {
  let mut hasher = Sha256::new();
  for row in rows {
    row.hash_into(&mut hasher);
  }
  hex::encode(hasher.finalize())
}

// ─── History rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawHistory {
  pub entry_id:        String,
  pub term_id:         String,
  pub language:        String,
  pub recorded_at:     String,
  pub kind:            String,
  pub changed_fields:  String,
  pub previous_values: String,
  pub current_values:  String,
}

pub const HISTORY_COLUMNS: &str = "entry_id, term_id, language, recorded_at, kind, \
                                   changed_fields, previous_values, current_values";

impl RawHistory {
  pub fn from_entry(e: &HistoryEntry) -> Result<Self> {
    Ok(Self {
      entry_id:        encode_uuid(e.entry_id),
      term_id:         e.id.clone(),
      language:        e.language.clone(),
      recorded_at:     encode_dt(e.timestamp),
      kind:            e.kind.to_string(),
      changed_fields:  serde_json::to_string(&e.changed_fields)?,
      previous_values: serde_json::to_string(&e.previous_values)?,
      current_values:  serde_json::to_string(&e.current_values)?,
    })
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:        row.get(0)?,
      term_id:         row.get(1)?,
      language:        row.get(2)?,
      recorded_at:     row.get(3)?,
      kind:            row.get(4)?,
      changed_fields:  row.get(5)?,
      previous_values: row.get(6)?,
      current_values:  row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    let kind: HistoryKind = self
      .kind
      .parse()
      .map_err(|_| Error::Decode(format!("unknown history kind: {:?}", self.kind)))?;
    Ok(HistoryEntry {
      entry_id: decode_uuid(&self.entry_id)?,
      id: self.term_id,
      language: self.language,
      timestamp: decode_dt(&self.recorded_at)?,
      kind,
      changed_fields: serde_json::from_str(&self.changed_fields)?,
      previous_values: serde_json::from_str(&self.previous_values)?,
      current_values: serde_json::from_str(&self.current_values)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn term_rows_survive_encoding() {
    let mut record = TermRecord::new("T:1", "T", "en");
    record.label = "root".into();
    record.synonym = ["b", "a"].into_iter().collect();
    record.other_parents.insert("T:0".into());
    record.preferred = true;

    let raw = RawTerm::from_record(&record).unwrap();
    assert_eq!(raw.synonym, r#"["b","a"]"#);
    let decoded = raw.into_record().unwrap();
    assert_eq!(decoded.synonym.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(decoded.label, "root");
    assert!(decoded.preferred);
  }

  #[test]
  fn checksum_depends_on_content() {
    let a = RawTerm::from_record(&TermRecord::new("T:1", "T", "en")).unwrap();
    let mut b = a.clone();
    assert_eq!(checksum([&a]), checksum([&b]));
    b.label = "changed".into();
    assert_ne!(checksum([&a]), checksum([&b]));

    let mut c = a.clone();
    c.parent_id = Some(String::new());
    assert_ne!(checksum([&a]), checksum([&c]));
  }
}
