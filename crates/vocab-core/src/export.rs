//! Read-only serialisation of a table to TSV and JSON.

use std::io::Write;

use serde::Serialize;

use crate::{
  error::{Error, Result},
  table::Table,
  term::{SynonymSet, TermRecord},
};

/// Separator for set-valued columns in tabular output.
pub const SET_SEPARATOR: &str = ";";

/// Flat form of one row. Field order is the column order of the TSV header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
  pub id:             String,
  pub ontology:       String,
  pub language:       String,
  pub parent_id:      String,
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
  pub preferred:      bool,
  pub deprecated:     bool,
  pub replaced_by:    String,
  pub version:        String,
  pub expected_type:  String,
}

impl From<&TermRecord> for ExportRow {
  fn from(r: &TermRecord) -> Self {
    let joined = |set: &SynonymSet| set.iter().collect::<Vec<_>>().join(SET_SEPARATOR);
    Self {
      id:             r.id().to_owned(),
      ontology:       r.ontology.clone(),
      language:       r.language().to_owned(),
      parent_id:      r.parent_id.clone().unwrap_or_default(),
      other_parents:  r
        .other_parents
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(SET_SEPARATOR),
      label:          r.label.clone(),
      definition:     r.definition.clone(),
      ui_label:       r.ui_label.clone(),
      ui_definition:  r.ui_definition.clone(),
      ui_help:        r.ui_help.clone(),
      synonym:        joined(&r.synonym),
      broad_synonym:  joined(&r.broad_synonym),
      narrow_synonym: joined(&r.narrow_synonym),
      exact_synonym:  joined(&r.exact_synonym),
      updated:        r.updated.to_rfc3339(),
      preferred:      r.preferred,
      deprecated:     r.deprecated,
      replaced_by:    r.replaced_by.clone().unwrap_or_default(),
      version:        r.version.clone().unwrap_or_default(),
      expected_type:  r.expected_type.to_string(),
    }
  }
}

/// Rows of `table` in key order, optionally restricted to one language.
pub fn export_rows(table: &Table, language: Option<&str>) -> Vec<ExportRow> {
  table
    .records()
    .filter(|r| language.is_none_or(|lang| r.language() == lang))
    .map(ExportRow::from)
    .collect()
}

/// The selected records as a pretty-printed JSON array.
pub fn export_json<W: Write>(table: &Table, language: Option<&str>, out: W) -> Result<()> {
  let records: Vec<&TermRecord> = table
    .records()
    .filter(|r| language.is_none_or(|lang| r.language() == lang))
    .collect();
  serde_json::to_writer_pretty(out, &records)?;
  Ok(())
}

/// Tab-separated rows with a header naming every field.
pub fn export_tsv<W: Write>(table: &Table, language: Option<&str>, out: W) -> Result<()> {
  let mut writer = csv::WriterBuilder::new()
    .delimiter(b'\t')
    .quote_style(csv::QuoteStyle::Necessary)
    .from_writer(out);

  let rows = export_rows(table, language);
  if rows.is_empty() {
    writer.write_record(HEADER)?;
  }
  for row in rows {
    writer.serialize(row)?;
  }
  writer.flush().map_err(|e| Error::Export(e.to_string()))?;
  Ok(())
}

const HEADER: [&str; 20] = [
  "id",
  "ontology",
  "language",
  "parent_id",
  "other_parents",
  "label",
  "definition",
  "ui_label",
  "ui_definition",
  "ui_help",
  "synonym",
  "broad_synonym",
  "narrow_synonym",
  "exact_synonym",
  "updated",
  "preferred",
  "deprecated",
  "replaced_by",
  "version",
  "expected_type",
];

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> Table {
    let mut table = Table::new("t");
    let mut root = TermRecord::new("T:1", "T", "en");
    root.label = "root".into();
    root.synonym = ["base", "origin"].into_iter().collect();
    table.insert(root).unwrap();

    let mut fr = TermRecord::new("T:1", "T", "fr");
    fr.label = "racine".into();
    table.insert(fr).unwrap();
    table
  }

  #[test]
  fn tsv_has_header_and_joined_sets() {
    let mut out = Vec::new();
    export_tsv(&table(), Some("en"), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();

    assert_eq!(lines.next().unwrap(), HEADER.join("\t"));
    let row: Vec<_> = lines.next().unwrap().split('\t').collect();
    assert_eq!(row[0], "T:1");
    assert_eq!(row[5], "root");
    assert_eq!(row[10], "base;origin");
    assert_eq!(lines.next(), None);
  }

  #[test]
  fn empty_tables_still_get_a_header() {
    let mut out = Vec::new();
    export_tsv(&Table::new("empty"), None, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().trim_end(), HEADER.join("\t"));
  }

  #[test]
  fn json_export_filters_by_language() {
    let mut out = Vec::new();
    export_json(&table(), Some("fr"), &mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = value.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["label"], "racine");
    assert_eq!(rows[0]["expected_type"], "categorical");
  }

  #[test]
  fn rows_cover_every_language_by_default() {
    assert_eq!(export_rows(&table(), None).len(), 2);
  }
}
