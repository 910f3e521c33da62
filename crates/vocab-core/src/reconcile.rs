//! Merging extracted candidates into a [`Table`].
//!
//! Candidates are collected, then settled in the order given. Candidates
//! that several sources supply for one key are folded into a single record
//! first, so each key is settled once per pass. A candidate whose parent is
//! not in the table yet is held back and retried once the rest of the batch
//! is in; anything still unresolved after that is inserted with its parent
//! pointer intact and reported.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  mem,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  error::Error,
  history::{CandidateError, DiffReport, HistoryEntry, HistoryKind, Note, ParentReview, RejectionKind},
  table::Table,
  term::{ChangeSet, TermField, TermKey, TermRecord},
};

// ─── Source policy ───────────────────────────────────────────────────────────

/// Decides which ontology keeps a term both supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePolicy {
  /// Whoever supplied the term first keeps it.
  #[default]
  PreferExisting,
  /// Ontology prefixes from most to least trusted. Unlisted prefixes rank
  /// last; ties keep the stored source.
  Priority(Vec<String>),
}

impl SourcePolicy {
  pub fn winner<'a>(&self, stored: &'a str, incoming: &'a str) -> &'a str {
    match self {
      Self::PreferExisting => stored,
      Self::Priority(order) => {
        let rank = |prefix: &str| {
          order
            .iter()
            .position(|p| p.eq_ignore_ascii_case(prefix))
            .unwrap_or(usize::MAX)
        };
        if rank(incoming) < rank(stored) { incoming } else { stored }
      }
    }
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

pub struct Reconciler<'t> {
  table:            &'t mut Table,
  policy:           &'t SourcePolicy,
  now:              DateTime<Utc>,
  report:           DiffReport,
  pending:          Vec<TermRecord>,
  deferred:         Vec<TermRecord>,
  seen:             HashSet<TermKey>,
  ontologies:       BTreeSet<String>,
  newly_deprecated: Vec<String>,
}

impl<'t> Reconciler<'t> {
  pub fn new(table: &'t mut Table, policy: &'t SourcePolicy, now: DateTime<Utc>) -> Self {
    Self {
      table,
      policy,
      now,
      report: DiffReport::default(),
      pending: Vec::new(),
      deferred: Vec::new(),
      seen: HashSet::new(),
      ontologies: BTreeSet::new(),
      newly_deprecated: Vec::new(),
    }
  }

  /// Queue one candidate. Problems are collected into the report; nothing
  /// here aborts the batch.
  pub fn reconcile(&mut self, candidate: TermRecord) {
    self.seen.insert(candidate.key());
    self.ontologies.insert(candidate.ontology.clone());

    if let Err(e) = candidate.validate() {
      self.reject(candidate.key(), RejectionKind::Validation, e.to_string());
      return;
    }
    self.pending.push(candidate);
  }

  /// Settle the queued candidates and assemble the report.
  pub fn finish(mut self) -> DiffReport {
    let pending = mem::take(&mut self.pending);
    for candidate in self.combine_sources(pending) {
      if self.missing_parent(&candidate).is_some() {
        debug!(key = %candidate.key(), "parent not yet known; deferring");
        self.deferred.push(candidate);
      } else {
        self.process(candidate);
      }
    }

    loop {
      let pending = mem::take(&mut self.deferred);
      if pending.is_empty() {
        break;
      }
      let before = pending.len();
      for candidate in pending {
        if self.missing_parent(&candidate).is_some() {
          self.deferred.push(candidate);
        } else {
          self.process(candidate);
        }
      }
      if self.deferred.len() == before {
        break;
      }
    }

    for candidate in mem::take(&mut self.deferred) {
      if let Some(parent) = self.missing_parent(&candidate) {
        let error = Error::UnresolvedParent { id: candidate.id().to_owned(), parent };
        self.reject(candidate.key(), RejectionKind::UnresolvedParent, error.to_string());
      }
      self.process(candidate);
    }

    self.collect_reviews();
    self.collect_dangling();
    self.collect_absent();
    self.report
  }

  /// Fold candidates that share a key into one, keeping first-seen order.
  fn combine_sources(&mut self, candidates: Vec<TermRecord>) -> Vec<TermRecord> {
    let mut order = Vec::new();
    let mut groups: HashMap<TermKey, Vec<TermRecord>> = HashMap::new();
    for candidate in candidates {
      let key = candidate.key();
      groups
        .entry(key.clone())
        .or_insert_with(|| {
          order.push(key);
          Vec::new()
        })
        .push(candidate);
    }

    order
      .into_iter()
      .filter_map(|key| groups.remove(&key))
      .filter_map(|group| self.combine(group))
      .collect()
  }

  /// The winning source's candidate, plus whatever the losing sources may
  /// still contribute. The stored source counts as a contender when it is
  /// in the group; the last candidate of the winning source is kept.
  fn combine(&mut self, group: Vec<TermRecord>) -> Option<TermRecord> {
    let first = group.first()?;
    let stored = self.table.get(&first.key()).map(|r| r.ontology.clone());
    let mut winner = match &stored {
      Some(ontology) if group.iter().any(|c| &c.ontology == ontology) => ontology.clone(),
      _ => first.ontology.clone(),
    };
    for candidate in &group {
      winner = self.policy.winner(&winner, &candidate.ontology).to_owned();
    }

    let (winners, losers): (Vec<_>, Vec<_>) =
      group.into_iter().partition(|c| c.ontology == winner);
    let mut combined = winners.into_iter().last()?;

    for loser in losers {
      let changes = match combined.apply(&loser) {
        Ok(changes) => changes,
        Err(e) => {
          self.reject(loser.key(), RejectionKind::Validation, e.to_string());
          continue;
        }
      };
      let (allowed, withheld) = loser_changes(&combined, &loser, &changes);
      if !withheld.is_empty() {
        let stored = stored.as_deref().unwrap_or(&winner);
        self.conflict(combined.key(), stored, &loser.ontology, &winner, withheld);
      }
      if let Err(e) = combined.commit(&allowed, self.now) {
        self.reject(loser.key(), RejectionKind::Validation, e.to_string());
      }
    }
    Some(combined)
  }

  fn missing_parent(&self, candidate: &TermRecord) -> Option<String> {
    candidate
      .parent_id
      .iter()
      .chain(candidate.other_parents.iter())
      .find(|p| !self.table.contains_id(p) && p.as_str() != candidate.id())
      .cloned()
  }

  fn process(&mut self, candidate: TermRecord) {
    let key = candidate.key();
    let Some(stored) = self.table.get(&key).cloned() else {
      self.insert(candidate);
      return;
    };

    let changes = match stored.apply(&candidate) {
      Ok(changes) => changes,
      Err(e) => {
        self.reject(key, RejectionKind::Validation, e.to_string());
        return;
      }
    };
    if changes.is_empty() {
      self.report.unchanged_count += 1;
      return;
    }

    let changes = if !stored.preferred && stored.ontology != candidate.ontology {
      self.resolve_sources(&stored, &candidate, changes)
    } else {
      changes
    };
    if changes.is_empty() {
      self.report.unchanged_count += 1;
      return;
    }

    match self.table.merge(&key, &changes, self.now) {
      Ok(()) => self.committed(&stored, &changes),
      Err(Error::LockConflict { fields, .. }) => {
        warn!(%key, ?fields, "preferred term; source changes withheld");
        self.report.notes.push(Note::LockedSkip { key: key.clone(), fields });
        let additions = stored.synonym_additions(&candidate);
        if additions.is_empty() {
          return;
        }
        match self.table.merge(&key, &additions, self.now) {
          Ok(()) => self.committed(&stored, &additions),
          Err(e) => self.reject(key, RejectionKind::Validation, e.to_string()),
        }
      }
      Err(Error::Cycle { path }) => {
        let message = Error::Cycle { path }.to_string();
        self.reject(key, RejectionKind::Cycle, message);
      }
      Err(e) => self.reject(key, RejectionKind::Validation, e.to_string()),
    }
  }

  fn insert(&mut self, candidate: TermRecord) {
    let key = candidate.key();
    let mut record = candidate;
    record.updated = self.now;
    let entry = HistoryEntry::added(&record, self.now);

    match self.table.insert(record) {
      Ok(()) => {
        debug!(%key, "added");
        self.report.record(entry);
      }
      Err(e @ Error::Cycle { .. }) => self.reject(key, RejectionKind::Cycle, e.to_string()),
      Err(e) => self.reject(key, RejectionKind::Validation, e.to_string()),
    }
  }

  /// Narrow `changes` when the candidate comes from a different ontology
  /// than the stored row.
  fn resolve_sources(
    &mut self,
    stored: &TermRecord,
    candidate: &TermRecord,
    changes: ChangeSet,
  ) -> ChangeSet {
    let winner = self.policy.winner(&stored.ontology, &candidate.ontology).to_owned();
    if winner == candidate.ontology {
      debug!(key = %stored.key(), %winner, "incoming source outranks stored source");
      self.conflict(stored.key(), &stored.ontology, &candidate.ontology, &winner, Vec::new());
      return changes;
    }

    let (allowed, withheld) = loser_changes(stored, candidate, &changes);
    if !withheld.is_empty() {
      self.conflict(stored.key(), &stored.ontology, &candidate.ontology, &winner, withheld);
    }
    allowed
  }

  fn conflict(
    &mut self,
    key: TermKey,
    stored: &str,
    incoming: &str,
    winner: &str,
    withheld: Vec<TermField>,
  ) {
    debug!(%key, winner, incoming, ?withheld, "conflicting sources");
    self.report.notes.push(Note::SourceConflict {
      key,
      stored: stored.to_owned(),
      incoming: incoming.to_owned(),
      winner: winner.to_owned(),
      withheld,
    });
  }

  fn committed(&mut self, stored: &TermRecord, changes: &ChangeSet) {
    let key = stored.key();
    let deprecating = !stored.deprecated
      && changes
        .get(TermField::Deprecated)
        .is_some_and(|c| c.current == serde_json::Value::Bool(true));

    let kind = if deprecating {
      if !self.newly_deprecated.iter().any(|id| id == stored.id()) {
        self.newly_deprecated.push(stored.id().to_owned());
      }
      HistoryKind::Deprecated
    } else {
      HistoryKind::Modified
    };

    debug!(%key, %kind, fields = ?changes.fields(), "committed");
    self
      .report
      .record(HistoryEntry::from_changes(&key, kind, changes, self.now));
  }

  fn reject(&mut self, key: TermKey, kind: RejectionKind, message: String) {
    warn!(%key, %kind, %message, "candidate rejected");
    self.report.errors.push(CandidateError { key, kind, message });
  }

  fn collect_reviews(&mut self) {
    for id in &self.newly_deprecated {
      let replaced_by = self.table.get_english(id).and_then(|r| r.replaced_by.clone());
      for child in self.table.children_of(id) {
        self.report.review.push(ParentReview {
          child:             child.key(),
          deprecated_parent: id.clone(),
          replaced_by:       replaced_by.clone(),
        });
      }
    }
  }

  fn collect_dangling(&mut self) {
    let touched: BTreeSet<TermKey> = self.report.entries.iter().map(HistoryEntry::key).collect();
    for key in touched {
      let Some(record) = self.table.get(&key) else { continue };
      if let Some(successor) = &record.replaced_by
        && record.deprecated
        && !self.table.contains_id(successor)
      {
        warn!(%key, %successor, "deprecated term names an unknown replacement");
        self.report.notes.push(Note::DanglingReplacement {
          key:         key.clone(),
          replaced_by: successor.clone(),
        });
      }
    }
  }

  fn collect_absent(&mut self) {
    self.report.absent = self
      .table
      .records()
      .filter(|r| self.ontologies.contains(&r.ontology) && !r.is_local())
      .map(TermRecord::key)
      .filter(|key| !self.seen.contains(key))
      .collect();
  }
}

/// What a losing source may still give `kept`: new synonyms, plus
/// `deprecated`/`replaced_by` while `kept` has none. Returns the allowed
/// changes and the fields withheld from `changes`.
fn loser_changes(
  kept: &TermRecord,
  loser: &TermRecord,
  changes: &ChangeSet,
) -> (ChangeSet, Vec<TermField>) {
  let mut allowed = kept.synonym_additions(loser);
  let lifecycle: Vec<TermField> = [
    (TermField::Deprecated, !kept.deprecated),
    (TermField::ReplacedBy, kept.replaced_by.is_none()),
  ]
  .into_iter()
  .filter_map(|(field, open)| open.then_some(field))
  .collect();
  allowed.changes.extend(changes.only(&lifecycle).changes);

  let withheld = changes
    .fields()
    .into_iter()
    .filter(|f| !allowed.touches(*f))
    .collect();
  (allowed, withheld)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn term(id: &str, parent: Option<&str>, label: &str) -> TermRecord {
    let mut r = TermRecord::new(id, "GEN", "en");
    r.parent_id = parent.map(str::to_owned);
    r.label = label.to_owned();
    r
  }

  fn run(table: &mut Table, policy: &SourcePolicy, candidates: Vec<TermRecord>) -> DiffReport {
    let mut reconciler = Reconciler::new(table, policy, Utc::now());
    for candidate in candidates {
      reconciler.reconcile(candidate);
    }
    reconciler.finish()
  }

  fn root_and_child() -> Vec<TermRecord> {
    vec![term("GEN:R", None, "root"), term("GEN:C", Some("GEN:R"), "Sample")]
  }

  #[test]
  fn second_identical_pass_changes_nothing() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();

    let first = run(&mut table, &policy, root_and_child());
    assert_eq!(first.added, vec![TermKey::english("GEN:R"), TermKey::english("GEN:C")]);
    assert_eq!(table.len(), 2);

    let snapshot = table.clone();
    let second = run(&mut table, &policy, root_and_child());
    assert!(second.is_empty(), "{}", second.summary());
    assert!(second.entries.is_empty());
    assert_eq!(second.unchanged_count, 2);
    assert_eq!(table, snapshot);
  }

  #[test]
  fn preferred_label_survives_and_is_noted() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    run(&mut table, &policy, root_and_child());
    table.set_preferred(&TermKey::english("GEN:C"), true, Utc::now()).unwrap();

    let mut incoming = root_and_child();
    incoming[1].label = "Specimen".into();
    incoming[1].synonym.insert("sample material");
    let report = run(&mut table, &policy, incoming);

    let child = table.get_english("GEN:C").unwrap();
    assert_eq!(child.label, "Sample");
    assert!(child.synonym.contains("sample material"));
    assert_eq!(report.notes, vec![Note::LockedSkip {
      key:    TermKey::english("GEN:C"),
      fields: vec![TermField::Label],
    }]);
    assert_eq!(report.modified, vec![TermKey::english("GEN:C")]);
  }

  #[test]
  fn deprecation_flags_children_for_review() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    let mut batch = root_and_child();
    batch.push(term("GEN:D", Some("GEN:C"), "leaf"));
    batch.push(term("GEN:N", Some("GEN:R"), "new sample"));
    run(&mut table, &policy, batch.clone());

    batch[1].deprecated = true;
    batch[1].replaced_by = Some("GEN:N".into());
    let report = run(&mut table, &policy, batch);

    assert_eq!(report.deprecated, vec![TermKey::english("GEN:C")]);
    assert_eq!(report.review, vec![ParentReview {
      child:             TermKey::english("GEN:D"),
      deprecated_parent: "GEN:C".into(),
      replaced_by:       Some("GEN:N".into()),
    }]);
    assert_eq!(table.get_english("GEN:D").unwrap().parent_id.as_deref(), Some("GEN:C"));
    assert!(report.notes.is_empty());
  }

  #[test]
  fn dangling_replacement_is_noted() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    let mut batch = root_and_child();
    batch[1].deprecated = true;
    batch[1].replaced_by = Some("GEN:GONE".into());
    let report = run(&mut table, &policy, batch);

    assert_eq!(report.notes, vec![Note::DanglingReplacement {
      key:         TermKey::english("GEN:C"),
      replaced_by: "GEN:GONE".into(),
    }]);
  }

  #[test]
  fn cycles_are_rejected_not_fatal() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    run(&mut table, &policy, root_and_child());

    let batch = vec![
      term("GEN:R", Some("GEN:C"), "root"),
      term("GEN:C", Some("GEN:R"), "Sample"),
      term("GEN:X", Some("GEN:R"), "extra"),
    ];
    let report = run(&mut table, &policy, batch);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, RejectionKind::Cycle);
    assert_eq!(report.added, vec![TermKey::english("GEN:X")]);
    assert_eq!(table.get_english("GEN:R").unwrap().parent_id, None);
  }

  #[test]
  fn forward_references_resolve_after_the_batch() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    let batch = vec![
      term("GEN:C", Some("GEN:R"), "Sample"),
      term("GEN:R", None, "root"),
      term("GEN:O", Some("GEN:MISSING"), "orphan"),
    ];
    let report = run(&mut table, &policy, batch);

    assert_eq!(report.added.len(), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, RejectionKind::UnresolvedParent);
    assert_eq!(
      table.get_english("GEN:O").unwrap().parent_id.as_deref(),
      Some("GEN:MISSING")
    );
  }

  #[test]
  fn invalid_candidates_do_not_abort_the_batch() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    let mut batch = root_and_child();
    batch.insert(1, term("http://example.org/unmapped", None, "raw"));
    let report = run(&mut table, &policy, batch);

    assert_eq!(report.added.len(), 2);
    assert_eq!(report.errors[0].kind, RejectionKind::Validation);
  }

  #[test]
  fn lower_priority_source_only_adds_synonyms() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::Priority(vec!["GEN".into(), "OTHER".into()]);
    run(&mut table, &policy, root_and_child());

    let mut foreign = term("GEN:C", Some("GEN:R"), "Other label");
    foreign.ontology = "OTHER".into();
    foreign.synonym.insert("specimen");
    let report = run(&mut table, &policy, vec![foreign]);

    let child = table.get_english("GEN:C").unwrap();
    assert_eq!(child.label, "Sample");
    assert_eq!(child.ontology, "GEN");
    assert!(child.synonym.contains("specimen"));
    match &report.notes[..] {
      [Note::SourceConflict { winner, withheld, .. }] => {
        assert_eq!(winner, "GEN");
        assert_eq!(withheld, &vec![TermField::Ontology, TermField::Label]);
      }
      other => panic!("unexpected notes: {other:?}"),
    }
  }

  #[test]
  fn higher_priority_source_takes_over() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::Priority(vec!["OTHER".into()]);
    run(&mut table, &policy, root_and_child());

    let mut foreign = term("GEN:C", Some("GEN:R"), "Other label");
    foreign.ontology = "OTHER".into();
    run(&mut table, &policy, vec![foreign]);

    let child = table.get_english("GEN:C").unwrap();
    assert_eq!(child.label, "Other label");
    assert_eq!(child.ontology, "OTHER");
  }

  #[test]
  fn overlapping_sources_settle_after_one_pass() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();

    let batch = || {
      let mut ours = term("BFO:1", None, "entity");
      ours.ontology = "GENEPIO".into();
      ours.synonym.insert("thing");
      let mut theirs = term("BFO:1", None, "Entity");
      theirs.ontology = "FOODON".into();
      theirs.synonym.insert("item");
      theirs.deprecated = true;
      vec![ours, theirs]
    };

    let first = run(&mut table, &policy, batch());
    assert_eq!(first.added, vec![TermKey::english("BFO:1")]);
    assert_eq!(first.entries.len(), 1);
    let entity = table.get_english("BFO:1").unwrap();
    assert_eq!(entity.ontology, "GENEPIO");
    assert_eq!(entity.label, "entity");
    assert_eq!(entity.synonym.iter().collect::<Vec<_>>(), vec!["thing", "item"]);
    assert!(entity.deprecated);

    let snapshot = table.clone();
    for _ in 0..2 {
      let again = run(&mut table, &policy, batch());
      assert!(again.is_empty(), "{}", again.summary());
      assert!(again.entries.is_empty());
      assert_eq!(again.unchanged_count, 1);
      match &again.notes[..] {
        [Note::SourceConflict { winner, incoming, withheld, .. }] => {
          assert_eq!(winner, "GENEPIO");
          assert_eq!(incoming, "FOODON");
          assert_eq!(withheld, &vec![TermField::Ontology, TermField::Label]);
        }
        other => panic!("unexpected notes: {other:?}"),
      }
      assert_eq!(table, snapshot);
    }
  }

  #[test]
  fn absent_records_are_reported_only() {
    let mut table = Table::new("t");
    let policy = SourcePolicy::default();
    run(&mut table, &policy, root_and_child());

    let report = run(&mut table, &policy, vec![term("GEN:R", None, "root")]);
    assert_eq!(report.absent, vec![TermKey::english("GEN:C")]);
    assert!(report.is_empty());
    assert!(table.get_english("GEN:C").is_some());
  }

  #[test]
  fn policy_ranks_unknown_prefixes_last() {
    let policy = SourcePolicy::Priority(vec!["A".into(), "B".into()]);
    assert_eq!(policy.winner("B", "A"), "A");
    assert_eq!(policy.winner("A", "B"), "A");
    assert_eq!(policy.winner("Z", "B"), "B");
    assert_eq!(policy.winner("Y", "Z"), "Y");
    assert_eq!(SourcePolicy::PreferExisting.winner("Y", "Z"), "Y");
  }
}
