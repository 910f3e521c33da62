//! Term records: one row of a vocabulary lookup table.
//!
//! A record's identity (`id`, `language`) is fixed at construction. Every
//! other field changes only through [`TermRecord::apply`], which reports the
//! differences against a candidate without touching the record, followed by
//! [`TermRecord::commit`] once the caller has decided what to keep.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  str::FromStr,
  sync::LazyLock,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use uuid::Uuid;

use crate::{error::ValidationError, language};

/// Prefix reserved for software-assigned ids. No ontology namespace may use
/// it.
pub const LOCAL_PREFIX: &str = "LOCAL";

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*:[A-Za-z0-9_.\-]+$")
    .expect("term id pattern is valid")
});

/// Check that `id` has the `prefix:identifier` shape.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
  if ID_PATTERN.is_match(id) {
    Ok(())
  } else {
    Err(ValidationError::InvalidId(id.to_owned()))
  }
}

/// The prefix part of a `prefix:identifier` id.
pub fn id_prefix(id: &str) -> &str { id.split_once(':').map_or(id, |(p, _)| p) }

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The unique key of a table row.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TermKey {
  pub id:       String,
  pub language: String,
}

impl TermKey {
  pub fn new(id: impl Into<String>, language: impl Into<String>) -> Self {
    Self { id: id.into(), language: language.into() }
  }

  pub fn english(id: impl Into<String>) -> Self { Self::new(id, language::ENGLISH) }
}

impl fmt::Display for TermKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.id, self.language)
  }
}

// ─── Expected type ───────────────────────────────────────────────────────────

/// Refinement of a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
  Integer,
  Float,
  Decimal,
}

/// The kind of value a downstream field bound to this term expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ExpectedType {
  #[default]
  Categorical,
  String,
  Numeric(Option<NumericKind>),
}

impl fmt::Display for ExpectedType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Categorical => f.write_str("categorical"),
      Self::String => f.write_str("string"),
      Self::Numeric(None) => f.write_str("numeric"),
      Self::Numeric(Some(NumericKind::Integer)) => f.write_str("numeric:integer"),
      Self::Numeric(Some(NumericKind::Float)) => f.write_str("numeric:float"),
      Self::Numeric(Some(NumericKind::Decimal)) => f.write_str("numeric:decimal"),
    }
  }
}

impl FromStr for ExpectedType {
  type Err = ValidationError;

  /// Accepts the canonical names as well as XML Schema datatypes, either as
  /// `xsd:` CURIEs or full IRIs.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lowered = s.trim().to_ascii_lowercase();
    let name = lowered
      .strip_prefix("http://www.w3.org/2001/xmlschema#")
      .or_else(|| lowered.strip_prefix("xsd:"))
      .unwrap_or(&lowered);

    let parsed = match name {
      "categorical" => Self::Categorical,
      "string" | "normalizedstring" | "token" => Self::String,
      "numeric" => Self::Numeric(None),
      "numeric:integer" | "integer" | "int" | "long" | "short"
      | "nonnegativeinteger" | "positiveinteger" => {
        Self::Numeric(Some(NumericKind::Integer))
      }
      "numeric:float" | "float" | "double" => Self::Numeric(Some(NumericKind::Float)),
      "numeric:decimal" | "decimal" => Self::Numeric(Some(NumericKind::Decimal)),
      _ => return Err(ValidationError::ExpectedType(s.to_owned())),
    };
    Ok(parsed)
  }
}

impl From<ExpectedType> for String {
  fn from(value: ExpectedType) -> Self { value.to_string() }
}

impl TryFrom<String> for ExpectedType {
  type Error = ValidationError;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

// ─── Synonyms ────────────────────────────────────────────────────────────────

/// An insertion-ordered, duplicate-free list of strings that compares as a
/// set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SynonymSet(Vec<String>);

impl SynonymSet {
  pub fn new() -> Self { Self::default() }

  /// Insert a trimmed value; empty strings and duplicates are ignored.
  pub fn insert(&mut self, value: impl Into<String>) -> bool {
    let value = value.into();
    let value = value.trim();
    if value.is_empty() || self.contains(value) {
      return false;
    }
    self.0.push(value.to_owned());
    true
  }

  pub fn contains(&self, value: &str) -> bool { self.0.iter().any(|v| v == value) }

  pub fn iter(&self) -> impl Iterator<Item = &str> { self.0.iter().map(String::as_str) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// True if every member of `self` is also in `other`.
  pub fn is_subset(&self, other: &SynonymSet) -> bool {
    self.iter().all(|v| other.contains(v))
  }

  /// `self` followed by the members of `other` it lacks.
  pub fn union(&self, other: &SynonymSet) -> SynonymSet {
    let mut out = self.clone();
    for value in other.iter() {
      out.insert(value);
    }
    out
  }
}

impl PartialEq for SynonymSet {
  fn eq(&self, other: &Self) -> bool {
    self.len() == other.len() && self.is_subset(other)
  }
}

impl Eq for SynonymSet {}

impl From<Vec<String>> for SynonymSet {
  fn from(values: Vec<String>) -> Self { values.into_iter().collect() }
}

impl From<SynonymSet> for Vec<String> {
  fn from(set: SynonymSet) -> Self { set.0 }
}

impl<S: Into<String>> FromIterator<S> for SynonymSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut set = SynonymSet::new();
    for value in iter {
      set.insert(value);
    }
    set
  }
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// Every mutable column of a [`TermRecord`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TermField {
  Ontology,
  ParentId,
  OtherParents,
  Label,
  Definition,
  UiLabel,
  UiDefinition,
  UiHelp,
  Synonym,
  BroadSynonym,
  NarrowSynonym,
  ExactSynonym,
  Preferred,
  Deprecated,
  ReplacedBy,
  Version,
  ExpectedType,
}

impl TermField {
  /// Fields that only ever gain members; a source may extend them even on a
  /// preferred record.
  pub fn is_append_only(self) -> bool {
    matches!(
      self,
      Self::Synonym | Self::BroadSynonym | Self::NarrowSynonym | Self::ExactSynonym
    )
  }

  /// Fields compared by [`TermRecord::apply`]. `preferred` is administrative
  /// and never comes from a source.
  pub fn is_sourced(self) -> bool { self != Self::Preferred }

  /// Parse the textual form used on the command line and in TSV exports.
  ///
  /// Set-valued fields are `;`-separated; an empty string clears optional
  /// fields.
  pub fn parse_value(self, text: &str) -> Result<Value, ValidationError> {
    let text = text.trim();
    let value = match self {
      Self::ParentId | Self::ReplacedBy | Self::Version if text.is_empty() => Value::Null,
      Self::OtherParents
      | Self::Synonym
      | Self::BroadSynonym
      | Self::NarrowSynonym
      | Self::ExactSynonym => Value::from(
        text
          .split(';')
          .map(str::trim)
          .filter(|v| !v.is_empty())
          .map(str::to_owned)
          .collect::<Vec<_>>(),
      ),
      Self::Preferred | Self::Deprecated => match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Value::from(true),
        "false" | "0" | "no" => Value::from(false),
        _ => {
          return Err(ValidationError::FieldValue {
            field:   self,
            message: format!("expected a boolean, got {text:?}"),
          });
        }
      },
      Self::ExpectedType => Value::from(text.parse::<ExpectedType>()?.to_string()),
      _ => Value::from(text),
    };
    Ok(value)
  }
}

// ─── Change sets ─────────────────────────────────────────────────────────────

/// One differing field between a stored record and a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub field:    TermField,
  pub previous: Value,
  pub current:  Value,
}

/// The field-level difference computed by [`TermRecord::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
  pub changes: Vec<FieldChange>,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool { self.changes.is_empty() }

  pub fn len(&self) -> usize { self.changes.len() }

  pub fn fields(&self) -> Vec<TermField> { self.changes.iter().map(|c| c.field).collect() }

  pub fn touches(&self, field: TermField) -> bool {
    self.changes.iter().any(|c| c.field == field)
  }

  pub fn get(&self, field: TermField) -> Option<&FieldChange> {
    self.changes.iter().find(|c| c.field == field)
  }

  /// The changes whose field is not in `fields`.
  pub fn without(&self, fields: &[TermField]) -> ChangeSet {
    let changes = self.changes.iter().filter(|c| !fields.contains(&c.field)).cloned().collect();
    ChangeSet { changes }
  }

  /// The changes whose field is in `fields`.
  pub fn only(&self, fields: &[TermField]) -> ChangeSet {
    let changes = self.changes.iter().filter(|c| fields.contains(&c.field)).cloned().collect();
    ChangeSet { changes }
  }

  /// Split into `(kept, dropped)` according to `keep`.
  pub fn partition(self, keep: impl Fn(&FieldChange) -> bool) -> (ChangeSet, ChangeSet) {
    let (kept, dropped): (Vec<_>, Vec<_>) = self.changes.into_iter().partition(|c| keep(c));
    (ChangeSet { changes: kept }, ChangeSet { changes: dropped })
  }

  pub fn previous_values(&self) -> BTreeMap<TermField, Value> {
    self.changes.iter().map(|c| (c.field, c.previous.clone())).collect()
  }

  pub fn current_values(&self) -> BTreeMap<TermField, Value> {
    self.changes.iter().map(|c| (c.field, c.current.clone())).collect()
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One row of the vocabulary table, keyed by `(id, language)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
  id:                 String,
  language:           String,
  /// Prefix of the ontology that supplied this row.
  pub ontology:       String,
  pub parent_id:      Option<String>,
  pub other_parents:  BTreeSet<String>,
  #[serde(default)]
  pub label:          String,
  #[serde(default)]
  pub definition:     String,
  #[serde(default)]
  pub ui_label:       String,
  #[serde(default)]
  pub ui_definition:  String,
  #[serde(default)]
  pub ui_help:        String,
  #[serde(default)]
  pub synonym:        SynonymSet,
  #[serde(default)]
  pub broad_synonym:  SynonymSet,
  #[serde(default)]
  pub narrow_synonym: SynonymSet,
  #[serde(default)]
  pub exact_synonym:  SynonymSet,
  /// Last time a committed change touched this row. Never compared.
  pub updated:        DateTime<Utc>,
  #[serde(default)]
  pub preferred:      bool,
  #[serde(default)]
  pub deprecated:     bool,
  pub replaced_by:    Option<String>,
  /// Version IRI of the source ontology release.
  pub version:        Option<String>,
  #[serde(default)]
  pub expected_type:  ExpectedType,
}

impl TermRecord {
  /// A blank row with the given identity.
  pub fn new(
    id: impl Into<String>,
    ontology: impl Into<String>,
    language: impl Into<String>,
  ) -> Self {
    Self {
      id:             id.into(),
      language:       language.into(),
      ontology:       ontology.into(),
      parent_id:      None,
      other_parents:  BTreeSet::new(),
      label:          String::new(),
      definition:     String::new(),
      ui_label:       String::new(),
      ui_definition:  String::new(),
      ui_help:        String::new(),
      synonym:        SynonymSet::new(),
      broad_synonym:  SynonymSet::new(),
      narrow_synonym: SynonymSet::new(),
      exact_synonym:  SynonymSet::new(),
      updated:        Utc::now(),
      preferred:      false,
      deprecated:     false,
      replaced_by:    None,
      version:        None,
      expected_type:  ExpectedType::default(),
    }
  }

  /// Mint a software-assigned term under [`LOCAL_PREFIX`].
  pub fn mint_local(label: impl Into<String>, language: impl Into<String>) -> Self {
    let id = format!("{LOCAL_PREFIX}:{}", Uuid::new_v4().simple());
    let mut record = Self::new(id, LOCAL_PREFIX, language);
    record.label = label.into();
    record
  }

  pub fn id(&self) -> &str { &self.id }

  pub fn language(&self) -> &str { &self.language }

  pub fn key(&self) -> TermKey { TermKey::new(self.id.clone(), self.language.clone()) }

  pub fn is_local(&self) -> bool { id_prefix(&self.id) == LOCAL_PREFIX }

  /// Check the record-level invariants.
  pub fn validate(&self) -> Result<(), ValidationError> {
    validate_id(&self.id)?;
    if !language::is_known(&self.language) {
      return Err(ValidationError::UnknownLanguage(self.language.clone()));
    }

    if let Some(parent) = &self.parent_id {
      validate_id(parent)?;
      if parent == &self.id {
        return Err(ValidationError::SelfParent(self.id.clone()));
      }
    }

    for other in &self.other_parents {
      validate_id(other)?;
      if other == &self.id {
        return Err(ValidationError::SelfParent(self.id.clone()));
      }
      if self.parent_id.as_deref() == Some(other.as_str()) {
        return Err(ValidationError::ParentRepeated {
          id:     self.id.clone(),
          parent: other.clone(),
        });
      }
    }

    if let Some(successor) = &self.replaced_by {
      validate_id(successor)?;
      if successor == &self.id {
        return Err(ValidationError::SelfReplacement(self.id.clone()));
      }
    }

    Ok(())
  }

  /// Compare `candidate` with `self` field by field.
  ///
  /// Returns the changed fields with previous and candidate values; `self` is
  /// not modified. Synonym sets compare as sets.
  pub fn apply(&self, candidate: &TermRecord) -> Result<ChangeSet, ValidationError> {
    candidate.validate()?;
    if candidate.id != self.id || candidate.language != self.language {
      return Err(ValidationError::KeyMismatch {
        existing:  self.key(),
        candidate: candidate.key(),
      });
    }

    let changes = TermField::iter()
      .filter(|field| field.is_sourced())
      .filter(|field| !self.field_equals(candidate, *field))
      .map(|field| FieldChange {
        field,
        previous: self.field_value(field),
        current: candidate.field_value(field),
      })
      .collect();

    Ok(ChangeSet { changes })
  }

  /// Write the `current` side of `changes` into the record and bump
  /// `updated`. Either every change is applied or none is.
  pub fn commit(&mut self, changes: &ChangeSet, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if changes.is_empty() {
      return Ok(());
    }

    let mut staged = self.clone();
    for change in &changes.changes {
      staged.set_field(change.field, change.current.clone())?;
    }
    staged.validate()?;
    staged.updated = now;
    *self = staged;
    Ok(())
  }

  /// The JSON form of a single field, as stored in history entries.
  pub fn field_value(&self, field: TermField) -> Value {
    match field {
      TermField::Ontology => Value::from(self.ontology.clone()),
      TermField::ParentId => opt_value(&self.parent_id),
      TermField::OtherParents => {
        Value::from(self.other_parents.iter().cloned().collect::<Vec<_>>())
      }
      TermField::Label => Value::from(self.label.clone()),
      TermField::Definition => Value::from(self.definition.clone()),
      TermField::UiLabel => Value::from(self.ui_label.clone()),
      TermField::UiDefinition => Value::from(self.ui_definition.clone()),
      TermField::UiHelp => Value::from(self.ui_help.clone()),
      TermField::Synonym => set_value(&self.synonym),
      TermField::BroadSynonym => set_value(&self.broad_synonym),
      TermField::NarrowSynonym => set_value(&self.narrow_synonym),
      TermField::ExactSynonym => set_value(&self.exact_synonym),
      TermField::Preferred => Value::from(self.preferred),
      TermField::Deprecated => Value::from(self.deprecated),
      TermField::ReplacedBy => opt_value(&self.replaced_by),
      TermField::Version => opt_value(&self.version),
      TermField::ExpectedType => Value::from(self.expected_type.to_string()),
    }
  }

  /// Overwrite one field from its JSON form.
  pub fn set_field(&mut self, field: TermField, value: Value) -> Result<(), ValidationError> {
    let invalid = |e: serde_json::Error| ValidationError::FieldValue {
      field,
      message: e.to_string(),
    };

    match field {
      TermField::Ontology => self.ontology = serde_json::from_value(value).map_err(invalid)?,
      TermField::ParentId => self.parent_id = serde_json::from_value(value).map_err(invalid)?,
      TermField::OtherParents => {
        self.other_parents = serde_json::from_value(value).map_err(invalid)?
      }
      TermField::Label => self.label = serde_json::from_value(value).map_err(invalid)?,
      TermField::Definition => self.definition = serde_json::from_value(value).map_err(invalid)?,
      TermField::UiLabel => self.ui_label = serde_json::from_value(value).map_err(invalid)?,
      TermField::UiDefinition => {
        self.ui_definition = serde_json::from_value(value).map_err(invalid)?
      }
      TermField::UiHelp => self.ui_help = serde_json::from_value(value).map_err(invalid)?,
      TermField::Synonym => self.synonym = serde_json::from_value(value).map_err(invalid)?,
      TermField::BroadSynonym => {
        self.broad_synonym = serde_json::from_value(value).map_err(invalid)?
      }
      TermField::NarrowSynonym => {
        self.narrow_synonym = serde_json::from_value(value).map_err(invalid)?
      }
      TermField::ExactSynonym => {
        self.exact_synonym = serde_json::from_value(value).map_err(invalid)?
      }
      TermField::Preferred => self.preferred = serde_json::from_value(value).map_err(invalid)?,
      TermField::Deprecated => self.deprecated = serde_json::from_value(value).map_err(invalid)?,
      TermField::ReplacedBy => self.replaced_by = serde_json::from_value(value).map_err(invalid)?,
      TermField::Version => self.version = serde_json::from_value(value).map_err(invalid)?,
      TermField::ExpectedType => {
        self.expected_type = serde_json::from_value(value).map_err(invalid)?
      }
    }
    Ok(())
  }

  /// The synonym set behind an append-only field.
  pub fn synonyms(&self, field: TermField) -> Option<&SynonymSet> {
    match field {
      TermField::Synonym => Some(&self.synonym),
      TermField::BroadSynonym => Some(&self.broad_synonym),
      TermField::NarrowSynonym => Some(&self.narrow_synonym),
      TermField::ExactSynonym => Some(&self.exact_synonym),
      _ => None,
    }
  }

  /// Changes that add the candidate's synonyms missing from `self`, leaving
  /// existing members in place.
  pub fn synonym_additions(&self, candidate: &TermRecord) -> ChangeSet {
    let changes = TermField::iter()
      .filter(|field| field.is_append_only())
      .filter_map(|field| {
        let ours = self.synonyms(field)?;
        let theirs = candidate.synonyms(field)?;
        if theirs.is_subset(ours) {
          return None;
        }
        Some(FieldChange {
          field,
          previous: set_value(ours),
          current: set_value(&ours.union(theirs)),
        })
      })
      .collect();
    ChangeSet { changes }
  }

  fn field_equals(&self, other: &TermRecord, field: TermField) -> bool {
    match (self.synonyms(field), other.synonyms(field)) {
      (Some(ours), Some(theirs)) => ours == theirs,
      _ => self.field_value(field) == other.field_value(field),
    }
  }
}

fn opt_value(value: &Option<String>) -> Value {
  value.as_ref().map_or(Value::Null, |v| Value::from(v.clone()))
}

fn set_value(set: &SynonymSet) -> Value {
  Value::from(set.iter().map(str::to_owned).collect::<Vec<_>>())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
