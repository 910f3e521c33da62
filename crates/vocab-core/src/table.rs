//! The vocabulary table: one [`TermRecord`] per `(id, language)`.
//!
//! All writes go through [`Table::insert`], [`Table::merge`] or the
//! administrative operations, each of which re-checks the record invariants
//! and keeps the hierarchy acyclic.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  error::{Error, Result, ValidationError},
  history::{HistoryEntry, HistoryKind},
  language,
  term::{ChangeSet, FieldChange, TermField, TermKey, TermRecord},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
  name:    String,
  records: BTreeMap<TermKey, TermRecord>,
}

impl Table {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), records: BTreeMap::new() }
  }

  /// Rebuild a table from stored rows, re-checking every invariant.
  pub fn from_records(
    name: impl Into<String>,
    records: impl IntoIterator<Item = TermRecord>,
  ) -> Result<Self> {
    let mut table = Self::new(name);
    for record in records {
      record.validate()?;
      let key = record.key();
      if table.records.insert(key.clone(), record).is_some() {
        return Err(Error::DuplicateTerm(key));
      }
    }
    table.check_acyclic()?;
    Ok(table)
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn get(&self, key: &TermKey) -> Option<&TermRecord> { self.records.get(key) }

  pub fn get_english(&self, id: &str) -> Option<&TermRecord> {
    self.records.get(&TermKey::english(id))
  }

  /// True if any language row exists for `id`.
  pub fn contains_id(&self, id: &str) -> bool {
    self
      .records
      .range(TermKey::new(id, "")..)
      .next()
      .is_some_and(|(key, _)| key.id == id)
  }

  /// All rows in key order.
  pub fn records(&self) -> impl Iterator<Item = &TermRecord> { self.records.values() }

  /// Rows of a single language, in id order.
  pub fn language_view<'a>(&'a self, language: &'a str) -> impl Iterator<Item = &'a TermRecord> {
    self.records.values().filter(move |r| r.language() == language)
  }

  /// Rows of any language whose primary parent is `id`.
  pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a TermRecord> {
    self
      .records
      .values()
      .filter(move |r| r.parent_id.as_deref() == Some(id))
  }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Insert a new row.
  pub fn insert(&mut self, record: TermRecord) -> Result<()> {
    record.validate()?;
    let key = record.key();
    if self.records.contains_key(&key) {
      return Err(Error::DuplicateTerm(key));
    }
    if let Some(path) = self.would_cycle(&record) {
      return Err(Error::Cycle { path });
    }
    self.records.insert(key, record);
    Ok(())
  }

  /// Commit a change set produced by [`TermRecord::apply`] on the stored row.
  ///
  /// Fails with [`Error::LockConflict`] if the row is preferred and any
  /// change goes beyond adding synonyms, and with [`Error::Cycle`] if the
  /// new parents would loop back. On error the row is left untouched.
  pub fn merge(&mut self, key: &TermKey, changes: &ChangeSet, now: DateTime<Utc>) -> Result<()> {
    let stored = self
      .records
      .get(key)
      .ok_or_else(|| Error::TermNotFound(key.clone()))?;

    if stored.preferred {
      let locked: Vec<TermField> = changes
        .changes
        .iter()
        .filter(|c| !is_pure_addition(c))
        .map(|c| c.field)
        .collect();
      if !locked.is_empty() {
        return Err(Error::LockConflict { key: key.clone(), fields: locked });
      }
    }

    self.commit_checked(key, changes, now)
  }

  /// Mark a row preferred (or release it). Only administrative callers use
  /// this; a refresh never touches the flag.
  pub fn set_preferred(
    &mut self,
    key: &TermKey,
    preferred: bool,
    now: DateTime<Utc>,
  ) -> Result<Option<HistoryEntry>> {
    self.override_unchecked(key, TermField::Preferred, Value::from(preferred), now)
  }

  /// Overwrite one field regardless of the preferred flag.
  pub fn override_field(
    &mut self,
    key: &TermKey,
    field: TermField,
    value: Value,
    now: DateTime<Utc>,
  ) -> Result<Option<HistoryEntry>> {
    if field == TermField::Preferred {
      return Err(ValidationError::ReadOnlyField(field).into());
    }
    self.override_unchecked(key, field, value, now)
  }

  /// Mint a `LOCAL:` term under an existing parent.
  pub fn insert_local(
    &mut self,
    label: &str,
    language: &str,
    parent_id: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<HistoryEntry> {
    if let Some(parent) = parent_id
      && !self.contains_id(parent)
    {
      return Err(Error::TermNotFound(TermKey::english(parent)));
    }

    let mut record = TermRecord::mint_local(label, language);
    record.parent_id = parent_id.map(str::to_owned);
    record.updated = now;
    let entry = HistoryEntry::added(&record, now);
    self.insert(record)?;
    Ok(entry)
  }

  fn override_unchecked(
    &mut self,
    key: &TermKey,
    field: TermField,
    value: Value,
    now: DateTime<Utc>,
  ) -> Result<Option<HistoryEntry>> {
    let stored = self
      .records
      .get(key)
      .ok_or_else(|| Error::TermNotFound(key.clone()))?;

    let previous = stored.field_value(field);
    let mut staged = stored.clone();
    staged.set_field(field, value)?;
    let current = staged.field_value(field);
    if previous == current {
      return Ok(None);
    }

    let changes = ChangeSet { changes: vec![FieldChange { field, previous, current }] };
    self.commit_checked(key, &changes, now)?;
    Ok(Some(HistoryEntry::from_changes(key, HistoryKind::Override, &changes, now)))
  }

  fn commit_checked(&mut self, key: &TermKey, changes: &ChangeSet, now: DateTime<Utc>) -> Result<()> {
    let stored = self
      .records
      .get(key)
      .ok_or_else(|| Error::TermNotFound(key.clone()))?;

    let mut staged = stored.clone();
    staged.commit(changes, now)?;
    if (changes.touches(TermField::ParentId) || changes.touches(TermField::OtherParents))
      && let Some(path) = self.would_cycle(&staged)
    {
      return Err(Error::Cycle { path });
    }
    self.records.insert(key.clone(), staged);
    Ok(())
  }

  // ─── Hierarchy ─────────────────────────────────────────────────────────────

  /// Parents of `id` as recorded on its English row, falling back to any
  /// language row.
  fn parents_of(&self, id: &str) -> Vec<&str> {
    let record = self.get_english(id).or_else(|| {
      self
        .records
        .range(TermKey::new(id, "")..)
        .next()
        .filter(|(key, _)| key.id == id)
        .map(|(_, r)| r)
    });
    record.map_or_else(Vec::new, |r| {
      r.parent_id
        .iter()
        .chain(r.other_parents.iter())
        .map(String::as_str)
        .collect()
    })
  }

  /// The loop `record`'s parents would close, if any, as a path of ids
  /// starting and ending at `record`.
  ///
  /// Depth-first with an explicit stack; every other id's parents are taken
  /// from the table.
  pub fn would_cycle(&self, record: &TermRecord) -> Option<Vec<String>> {
    let start = record.id();
    let mut came_from: HashMap<&str, &str> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    let direct = record.parent_id.iter().chain(record.other_parents.iter());
    for parent in direct.map(String::as_str) {
      if parent == start {
        return Some(vec![start.to_owned(), start.to_owned()]);
      }
      if came_from.insert(parent, start).is_none() {
        stack.push(parent);
      }
    }

    while let Some(node) = stack.pop() {
      for parent in self.parents_of(node) {
        if parent == start {
          let mut path = vec![start.to_owned()];
          let mut cursor = node;
          while cursor != start {
            path.push(cursor.to_owned());
            cursor = came_from.get(cursor).copied().unwrap_or(start);
          }
          path.push(start.to_owned());
          path.reverse();
          return Some(path);
        }
        if !came_from.contains_key(parent) {
          came_from.insert(parent, node);
          stack.push(parent);
        }
      }
    }
    None
  }

  /// Check that following `parent_id` from any row ends within table-size
  /// hops.
  pub fn check_acyclic(&self) -> Result<()> {
    let limit = self.records.len();
    let mut known_good: HashSet<&str> = HashSet::new();

    for record in self.language_view(language::ENGLISH) {
      let mut trail = vec![record.id()];
      let mut cursor = record.parent_id.as_deref();
      while let Some(id) = cursor {
        if known_good.contains(id) {
          break;
        }
        if trail.contains(&id) || trail.len() > limit {
          trail.push(id);
          return Err(Error::Cycle { path: trail.into_iter().map(str::to_owned).collect() });
        }
        trail.push(id);
        cursor = self.get_english(id).and_then(|r| r.parent_id.as_deref());
      }
      known_good.extend(trail);
    }
    Ok(())
  }
}

/// A change that only adds members to a synonym set.
fn is_pure_addition(change: &FieldChange) -> bool {
  if !change.field.is_append_only() {
    return false;
  }
  match (change.previous.as_array(), change.current.as_array()) {
    (Some(previous), Some(current)) => previous.iter().all(|v| current.contains(v)),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(id: &str, parent: Option<&str>) -> TermRecord {
    let mut r = TermRecord::new(id, "T", "en");
    r.label = id.to_lowercase();
    r.parent_id = parent.map(str::to_owned);
    r
  }

  fn chain() -> Table {
    let mut table = Table::new("test");
    table.insert(record("T:1", None)).unwrap();
    table.insert(record("T:2", Some("T:1"))).unwrap();
    table.insert(record("T:3", Some("T:2"))).unwrap();
    table
  }

  #[test]
  fn duplicate_keys_are_refused() {
    let mut table = chain();
    assert!(matches!(
      table.insert(record("T:2", Some("T:1"))),
      Err(Error::DuplicateTerm(_))
    ));
    let mut fr = TermRecord::new("T:2", "T", "fr");
    fr.parent_id = Some("T:1".into());
    table.insert(fr).unwrap();
    assert_eq!(table.len(), 4);
    assert!(table.contains_id("T:2"));
    assert!(!table.contains_id("T:4"));
  }

  #[test]
  fn reparenting_onto_a_descendant_is_a_cycle() {
    let mut table = chain();
    let stored = table.get_english("T:1").unwrap().clone();
    let mut candidate = stored.clone();
    candidate.parent_id = Some("T:3".into());

    let changes = stored.apply(&candidate).unwrap();
    let err = table.merge(&TermKey::english("T:1"), &changes, Utc::now()).unwrap_err();
    match err {
      Error::Cycle { path } => assert_eq!(path, vec!["T:1", "T:3", "T:2", "T:1"]),
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(table.get_english("T:1").unwrap().parent_id, None);
  }

  #[test]
  fn cycle_through_other_parents_is_caught() {
    let mut table = chain();
    let mut looped = record("T:4", Some("T:1"));
    looped.other_parents.insert("T:3".into());
    table.insert(looped).unwrap();

    let stored = table.get_english("T:2").unwrap().clone();
    let mut candidate = stored.clone();
    candidate.other_parents.insert("T:4".into());
    let changes = stored.apply(&candidate).unwrap();
    assert!(matches!(
      table.merge(&TermKey::english("T:2"), &changes, Utc::now()),
      Err(Error::Cycle { .. })
    ));
  }

  #[test]
  fn preferred_rows_accept_only_synonym_additions() {
    let mut table = chain();
    let key = TermKey::english("T:2");
    table.set_preferred(&key, true, Utc::now()).unwrap();

    let stored = table.get(&key).unwrap().clone();
    let mut candidate = stored.clone();
    candidate.label = "renamed".into();
    candidate.synonym.insert("alias");
    let changes = stored.apply(&candidate).unwrap();

    match table.merge(&key, &changes, Utc::now()) {
      Err(Error::LockConflict { fields, .. }) => assert_eq!(fields, vec![TermField::Label]),
      other => panic!("expected lock conflict, got {other:?}"),
    }

    let additions = changes.only(&[TermField::Synonym]);
    table.merge(&key, &additions, Utc::now()).unwrap();
    let stored = table.get(&key).unwrap();
    assert_eq!(stored.label, "t:2");
    assert!(stored.synonym.contains("alias"));
  }

  #[test]
  fn overrides_bypass_the_lock_and_are_recorded() {
    let mut table = chain();
    let key = TermKey::english("T:3");
    table.set_preferred(&key, true, Utc::now()).unwrap();

    let entry = table
      .override_field(&key, TermField::Label, Value::from("curated"), Utc::now())
      .unwrap()
      .unwrap();
    assert_eq!(entry.kind, HistoryKind::Override);
    assert_eq!(entry.previous_values[&TermField::Label], Value::from("t:3"));
    assert_eq!(table.get(&key).unwrap().label, "curated");

    assert!(
      table
        .override_field(&key, TermField::Label, Value::from("curated"), Utc::now())
        .unwrap()
        .is_none()
    );
    assert!(table.override_field(&key, TermField::Preferred, Value::from(false), Utc::now()).is_err());
  }

  #[test]
  fn local_terms_need_a_known_parent() {
    let mut table = chain();
    assert!(matches!(
      table.insert_local("draft", "en", Some("T:9"), Utc::now()),
      Err(Error::TermNotFound(_))
    ));
    let entry = table.insert_local("draft", "en", Some("T:3"), Utc::now()).unwrap();
    assert!(entry.id.starts_with("LOCAL:"));
    assert_eq!(table.children_of("T:3").count(), 1);
  }

  #[test]
  fn from_records_rejects_stored_cycles() {
    let rows = vec![record("T:1", Some("T:2")), record("T:2", Some("T:1"))];
    assert!(matches!(Table::from_records("t", rows), Err(Error::Cycle { .. })));
  }
}
