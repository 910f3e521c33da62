//! Integration tests for `SqliteStore` against an in-memory database.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::json;
use vocab_core::{
  SourceError,
  graph::{Literal, OntologyGraph, Triple, iri},
  history::{HistoryEntry, HistoryKind, Note},
  refresh::RefreshOptions,
  service::Refresher,
  store::{OntologySource, SourceRef, TableStore},
  table::Table,
  term::{TermField, TermKey, TermRecord},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn term(id: &str, parent: Option<&str>, label: &str) -> TermRecord {
  let mut record = TermRecord::new(id, "TST", "en");
  record.parent_id = parent.map(str::to_owned);
  record.label = label.to_owned();
  record
}

fn sample_table() -> Table {
  let mut table = Table::new("genepio");
  let mut root = term("TST:0", None, "root");
  root.synonym = ["base", "origin"].into_iter().collect();
  table.insert(root).unwrap();
  table.insert(term("TST:1", Some("TST:0"), "child")).unwrap();

  let mut fr = TermRecord::new("TST:1", "TST", "fr");
  fr.parent_id = Some("TST:0".into());
  fr.label = "enfant".into();
  table.insert(fr).unwrap();
  table
}

// ─── Tables ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_table_loads_empty() {
  let s = store().await;
  let table = s.load_table("missing").await.unwrap();
  assert_eq!(table.name(), "missing");
  assert!(table.is_empty());
}

#[tokio::test]
async fn save_and_load_round_trip() {
  let s = store().await;
  let table = sample_table();
  s.save_table(&table, &[]).await.unwrap();

  let loaded = s.load_table("genepio").await.unwrap();
  assert_eq!(loaded, table);
  let root = loaded.get(&TermKey::english("TST:0")).unwrap();
  assert_eq!(root.synonym.iter().collect::<Vec<_>>(), vec!["base", "origin"]);
  assert_eq!(loaded.language_view("fr").count(), 1);
}

#[tokio::test]
async fn saving_again_updates_rows_in_place() {
  let s = store().await;
  let mut table = sample_table();
  s.save_table(&table, &[]).await.unwrap();

  table
    .override_field(&TermKey::english("TST:1"), TermField::Label, json!("renamed"), Utc::now())
    .unwrap();
  s.save_table(&table, &[]).await.unwrap();

  let loaded = s.load_table("genepio").await.unwrap();
  assert_eq!(loaded.len(), 3);
  assert_eq!(loaded.get(&TermKey::english("TST:1")).unwrap().label, "renamed");
}

#[tokio::test]
async fn list_tables_is_sorted() {
  let s = store().await;
  s.save_table(&Table::new("snomed"), &[]).await.unwrap();
  s.save_table(&sample_table(), &[]).await.unwrap();

  assert_eq!(s.list_tables().await.unwrap(), vec!["genepio", "snomed"]);
}

#[tokio::test]
async fn tampered_rows_are_detected() {
  let s = store().await;
  s.save_table(&sample_table(), &[]).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute(
        "UPDATE terms SET label = 'tampered' WHERE term_id = 'TST:0'",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.load_table("genepio").await.unwrap_err();
  assert!(matches!(err, Error::Corrupt { ref table, .. } if table == "genepio"));
}

#[tokio::test]
async fn file_backed_store_persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vocab.db");

  let table = sample_table();

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.save_table(&table, &[]).await.unwrap();
  }

  let reopened = SqliteStore::open(&path).await.unwrap();
  assert_eq!(reopened.load_table("genepio").await.unwrap(), table);
}

// ─── Leases ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn leases_are_shared_between_handles() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vocab.db");
  let a = SqliteStore::open(&path).await.unwrap();
  let b = SqliteStore::open(&path).await.unwrap();

  assert!(a.try_lease("genepio", "a").await.unwrap());
  assert!(!b.try_lease("genepio", "b").await.unwrap());
  assert!(b.try_lease("snomed", "b").await.unwrap());

  b.release_lease("genepio", "b").await.unwrap();
  assert!(!b.try_lease("genepio", "b").await.unwrap());

  a.release_lease("genepio", "a").await.unwrap();
  assert!(b.try_lease("genepio", "b").await.unwrap());
}

#[tokio::test]
async fn expired_leases_are_taken_over() {
  let s = store().await.with_lease_ttl(Duration::ZERO);
  assert!(s.try_lease("genepio", "crashed").await.unwrap());
  assert!(s.try_lease("genepio", "next").await.unwrap());

  let live = store().await;
  assert!(live.try_lease("genepio", "first").await.unwrap());
  assert!(!live.try_lease("genepio", "second").await.unwrap());
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_is_returned_in_append_order() {
  let s = store().await;
  let mut table = sample_table();
  let key = TermKey::english("TST:1");

  let first = HistoryEntry::added(table.get(&key).unwrap(), Utc::now());
  s.save_table(&table, std::slice::from_ref(&first)).await.unwrap();

  let second = table
    .override_field(&key, TermField::Definition, json!("a child"), Utc::now())
    .unwrap()
    .unwrap();
  s.save_table(&table, std::slice::from_ref(&second)).await.unwrap();

  let history = s.history("genepio", "TST:1").await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].entry_id, first.entry_id);
  assert_eq!(history[0].kind, HistoryKind::Added);
  assert_eq!(history[1].kind, HistoryKind::Override);
  assert_eq!(history[1].changed_fields, vec![TermField::Definition]);
  assert_eq!(history[1].current_values[&TermField::Definition], json!("a child"));

  assert!(s.history("genepio", "TST:0").await.unwrap().is_empty());
  assert!(s.history("other", "TST:1").await.unwrap().is_empty());
}

// ─── Refresher ───────────────────────────────────────────────────────────────

const OBO: &str = "http://purl.obolibrary.org/obo/";

/// Serves prepared graphs by location.
#[derive(Default)]
struct FakeSource {
  graphs: HashMap<SourceRef, OntologyGraph>,
}

impl FakeSource {
  fn with(mut self, location: &str, graph: OntologyGraph) -> Self {
    self.graphs.insert(location.parse().unwrap(), graph);
    self
  }
}

impl OntologySource for FakeSource {
  async fn load(&self, source: &SourceRef) -> Result<OntologyGraph, SourceError> {
    self
      .graphs
      .get(source)
      .cloned()
      .ok_or_else(|| SourceError::Unavailable {
        location: source.to_string(),
        reason:   "not found".to_owned(),
      })
  }
}

/// `TST_0` with child `TST_1`, labelled as given.
fn ontology(child_label: &str) -> OntologyGraph {
  let class = |n: u32| format!("{OBO}TST_{n}");
  OntologyGraph::from_triples([
    Triple::iri(&format!("{OBO}tst.owl"), iri::RDF_TYPE, iri::OWL_ONTOLOGY),
    Triple::iri(&class(0), iri::RDF_TYPE, iri::OWL_CLASS),
    Triple::literal(&class(0), iri::RDFS_LABEL, Literal::plain("root")),
    Triple::iri(&class(1), iri::RDFS_SUBCLASS_OF, &class(0)),
    Triple::literal(&class(1), iri::RDFS_LABEL, Literal::plain(child_label)),
  ])
}

fn sources(locations: &[&str]) -> Vec<SourceRef> {
  locations.iter().map(|l| l.parse().unwrap()).collect()
}

async fn refresher(source: FakeSource) -> Refresher<SqliteStore, FakeSource> {
  Refresher::new(Arc::new(store().await), Arc::new(source))
}

#[tokio::test]
async fn refresh_adds_then_is_idempotent() {
  let r = refresher(FakeSource::default().with("tst.owl", ontology("child"))).await;
  let sources = sources(&["tst.owl"]);
  let roots = vec!["TST:0".to_owned()];
  let options = RefreshOptions::default();

  let (table, report) = r.refresh("tst", &sources, &roots, &options).await.unwrap();
  assert_eq!(report.added.len(), 2);
  assert_eq!(table.get(&TermKey::english("TST:1")).unwrap().parent_id.as_deref(), Some("TST:0"));
  assert_eq!(r.history("tst", "TST:1").await.unwrap().len(), 1);

  let (again, report) = r.refresh("tst", &sources, &roots, &options).await.unwrap();
  assert!(report.is_empty(), "{}", report.summary());
  assert_eq!(report.unchanged_count, 2);
  assert_eq!(again, table);
  assert_eq!(r.history("tst", "TST:1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn pinned_rows_keep_their_label() {
  let source = FakeSource::default()
    .with("v1.owl", ontology("child"))
    .with("v2.owl", ontology("renamed child"));
  let r = refresher(source).await;
  let roots = vec!["TST:0".to_owned()];
  let options = RefreshOptions::default();
  let key = TermKey::english("TST:1");

  r.refresh("tst", &sources(&["v1.owl"]), &roots, &options)
    .await
    .unwrap();
  let pinned = r.pin("tst", &key, true).await.unwrap();
  assert_eq!(pinned.unwrap().kind, HistoryKind::Override);
  assert!(r.pin("tst", &key, true).await.unwrap().is_none());

  let (table, report) = r
    .refresh("tst", &sources(&["v2.owl"]), &roots, &options)
    .await
    .unwrap();
  assert_eq!(table.get(&key).unwrap().label, "child");
  assert!(matches!(report.notes.as_slice(), [Note::LockedSkip { key: k, .. }] if *k == key));

  r.override_field("tst", &key, TermField::Label, json!("curated"))
    .await
    .unwrap();
  assert_eq!(r.load("tst").await.unwrap().get(&key).unwrap().label, "curated");
  assert_eq!(r.history("tst", "TST:1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn failing_source_leaves_table_untouched() {
  let r = refresher(FakeSource::default().with("tst.owl", ontology("child"))).await;
  let roots = vec!["TST:0".to_owned()];
  let options = RefreshOptions::default();
  let sources = sources(&["tst.owl", "missing.owl"]);

  let err = r.refresh("tst", &sources, &roots, &options).await.unwrap_err();
  assert!(matches!(err, vocab_core::Error::Source(SourceError::Unavailable { .. })));
  assert!(r.store().list_tables().await.unwrap().is_empty());
  assert!(!r.locks().is_held("tst"));
  assert!(r.store().try_lease("tst", "next writer").await.unwrap());
}

#[tokio::test]
async fn busy_table_is_refused() {
  let r = refresher(FakeSource::default().with("tst.owl", ontology("child"))).await;
  let _held = r.locks().try_acquire("tst").unwrap();

  let err = r
    .refresh("tst", &sources(&["tst.owl"]), &["TST:0".to_owned()], &RefreshOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, vocab_core::Error::TableBusy(ref t) if t == "tst"));
}

#[tokio::test]
async fn writers_on_separate_handles_exclude_each_other() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vocab.db");
  let writer = |store: SqliteStore| {
    let source = FakeSource::default().with("tst.owl", ontology("child"));
    Refresher::new(Arc::new(store), Arc::new(source))
  };
  let a = writer(SqliteStore::open(&path).await.unwrap());
  let b = writer(SqliteStore::open(&path).await.unwrap());
  let roots = vec!["TST:0".to_owned()];
  let options = RefreshOptions::default();
  let key = TermKey::english("TST:1");

  a.refresh("tst", &sources(&["tst.owl"]), &roots, &options)
    .await
    .unwrap();

  assert!(a.store().try_lease("tst", "curator").await.unwrap());
  let err = b
    .override_field("tst", &key, TermField::Label, json!("renamed"))
    .await
    .unwrap_err();
  assert!(matches!(err, vocab_core::Error::TableBusy(ref t) if t == "tst"));
  let err = b.mint("tst", "local thing", "en", None).await.unwrap_err();
  assert!(matches!(err, vocab_core::Error::TableBusy(_)));
  a.store().release_lease("tst", "curator").await.unwrap();

  b.mint("tst", "local thing", "en", Some("TST:0")).await.unwrap();
  a.override_field("tst", &key, TermField::Label, json!("renamed"))
    .await
    .unwrap();

  let table = b.load("tst").await.unwrap();
  assert_eq!(table.len(), 3);
  assert_eq!(table.get(&key).unwrap().label, "renamed");
}

#[tokio::test]
async fn minted_terms_are_persisted() {
  let r = refresher(FakeSource::default().with("tst.owl", ontology("child"))).await;
  r.refresh("tst", &sources(&["tst.owl"]), &["TST:0".to_owned()], &RefreshOptions::default())
    .await
    .unwrap();

  let entry = r.mint("tst", "local thing", "en", Some("TST:1")).await.unwrap();
  assert!(entry.id.starts_with("LOCAL:"));
  assert_eq!(entry.kind, HistoryKind::Added);

  let table = r.load("tst").await.unwrap();
  let minted = table.get_english(&entry.id).unwrap();
  assert_eq!(minted.parent_id.as_deref(), Some("TST:1"));
  assert!(minted.is_local());

  let err = r.mint("tst", "orphan", "en", Some("TST:404")).await.unwrap_err();
  assert!(matches!(err, vocab_core::Error::TermNotFound(_)));
}
