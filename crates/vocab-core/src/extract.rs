//! Candidate extraction: walk an [`OntologyGraph`] from one or more root
//! classes and turn every reachable class into [`TermRecord`]s.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  graph::{AnnotationValue, Literal, OntologyGraph, OwlClass, iri},
  language,
  prefix::PrefixMap,
  term::{ExpectedType, SynonymSet, TermKey, TermRecord, id_prefix},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Annotation predicates read into each record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationMap {
  pub label:          Vec<String>,
  pub definition:     Vec<String>,
  pub ui_label:       Vec<String>,
  pub ui_definition:  Vec<String>,
  pub ui_help:        Vec<String>,
  pub synonym:        Vec<String>,
  pub broad_synonym:  Vec<String>,
  pub narrow_synonym: Vec<String>,
  pub exact_synonym:  Vec<String>,
  pub deprecated:     Vec<String>,
  pub replaced_by:    Vec<String>,
  /// Predicate holding the expected value type, if the ontology has one.
  pub expected_type:  Option<String>,
}

impl Default for AnnotationMap {
  fn default() -> Self {
    fn owned(preds: &[&str]) -> Vec<String> { preds.iter().map(|p| (*p).to_owned()).collect() }

    Self {
      label:          owned(&[iri::RDFS_LABEL]),
      definition:     owned(&[iri::IAO_DEFINITION, iri::SKOS_DEFINITION]),
      ui_label:       owned(&[iri::GENEPIO_UI_LABEL]),
      ui_definition:  owned(&[iri::GENEPIO_UI_DEFINITION]),
      ui_help:        owned(&[iri::GENEPIO_UI_HELP]),
      synonym:        owned(&[iri::OIO_SYNONYM, iri::OIO_RELATED_SYNONYM, iri::SKOS_ALT_LABEL]),
      broad_synonym:  owned(&[iri::OIO_BROAD_SYNONYM, iri::SKOS_BROADER, iri::SKOS_BROAD_MATCH]),
      narrow_synonym: owned(&[
        iri::OIO_NARROW_SYNONYM,
        iri::SKOS_NARROWER,
        iri::SKOS_NARROW_MATCH,
      ]),
      exact_synonym:  owned(&[iri::OIO_EXACT_SYNONYM, iri::SKOS_EXACT_MATCH]),
      deprecated:     owned(&[iri::OWL_DEPRECATED]),
      replaced_by:    owned(&[iri::IAO_REPLACED_BY]),
      expected_type:  None,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
  pub prefixes:        PrefixMap,
  pub annotations:     AnnotationMap,
  /// Value of the `ontology` column. Derived from the ontology IRI when
  /// unset.
  pub ontology_prefix: Option<String>,
}

fn is_thing(root: &str) -> bool { root == iri::OWL_THING || root == "owl:Thing" }

/// Upper-cased file stem of an ontology IRI: `…/genepio.owl` → `GENEPIO`.
pub fn prefix_from_ontology_iri(iri: &str) -> Option<String> {
  let last = iri.trim_end_matches('/').rsplit(['/', '#']).next()?;
  let stem = last.split('.').next().unwrap_or(last);
  (!stem.is_empty()).then(|| stem.to_ascii_uppercase())
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// Reads candidate records out of one graph.
pub struct Extractor<'g> {
  graph:    &'g OntologyGraph,
  options:  &'g ExtractOptions,
  ontology: String,
}

impl<'g> Extractor<'g> {
  pub fn new(graph: &'g OntologyGraph, options: &'g ExtractOptions) -> Self {
    let ontology = options
      .ontology_prefix
      .clone()
      .or_else(|| graph.iri.as_deref().and_then(prefix_from_ontology_iri))
      .unwrap_or_default();
    Self { graph, options, ontology }
  }

  /// The `ontology` value stamped on every candidate.
  pub fn ontology(&self) -> &str { &self.ontology }

  /// Candidates for `root` and all of its transitive subclasses.
  pub fn extract(&self, root: &str) -> Extraction<'g> { self.extract_roots(&[root]) }

  /// Candidates for several roots, deduplicated across the traversals.
  ///
  /// Roots may be given as IRIs or as CURIEs the prefix map can expand. A
  /// root missing from the graph contributes nothing and is logged.
  ///
  /// `owl:Thing` is a virtual root: it is never emitted, and the classes
  /// directly under it (see [`Extractor::top_level`]) become parentless roots.
  pub fn extract_roots<S: AsRef<str>>(&self, roots: &[S]) -> Extraction<'g> {
    let mut order: Vec<&'g OwlClass> = Vec::new();
    let mut visited: HashSet<&'g str> = HashSet::new();

    for root in roots {
      let root = root.as_ref();
      let starts = if is_thing(root) {
        self.top_level()
      } else if let Some(class) = self.resolve(root) {
        vec![class]
      } else {
        warn!(root, "root class not found in ontology graph");
        continue;
      };

      let mut queue = VecDeque::new();
      for class in starts {
        if visited.insert(class.iri.as_str()) {
          queue.push_back(class);
        }
      }
      while let Some(class) = queue.pop_front() {
        order.push(class);
        for child in self.graph.direct_subclasses(&class.iri) {
          let Some(child) = self.graph.class(child) else { continue };
          if visited.insert(child.iri.as_str()) {
            queue.push_back(child);
          }
        }
      }
    }

    debug!(classes = order.len(), ontology = %self.ontology, "traversal planned");
    Extraction {
      graph: self.graph,
      options: self.options,
      ontology: self.ontology.clone(),
      scope: visited,
      order: order.into(),
      pending: VecDeque::new(),
      emitted: HashSet::new(),
    }
  }

  /// Classes directly under `owl:Thing`: those declared its subclass and
  /// those with no named superclass at all, in declaration order.
  pub fn top_level(&self) -> Vec<&'g OwlClass> {
    self
      .graph
      .classes()
      .iter()
      .filter(|c| c.iri != iri::OWL_THING)
      .filter(|c| c.superclasses.iter().all(|p| p == iri::OWL_THING))
      .collect()
  }

  fn resolve(&self, root: &str) -> Option<&'g OwlClass> {
    self.graph.class(root).or_else(|| {
      let expanded = self.options.prefixes.expand(root)?;
      self.graph.class(&expanded)
    })
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Lazy, finite sequence of candidates in breadth-first order. Each class
/// yields its English record followed by any other-language records.
pub struct Extraction<'g> {
  graph:    &'g OntologyGraph,
  options:  &'g ExtractOptions,
  ontology: String,
  scope:    HashSet<&'g str>,
  order:    VecDeque<&'g OwlClass>,
  pending:  VecDeque<TermRecord>,
  emitted:  HashSet<TermKey>,
}

impl Iterator for Extraction<'_> {
  type Item = TermRecord;

  fn next(&mut self) -> Option<TermRecord> {
    loop {
      if let Some(record) = self.pending.pop_front() {
        if self.emitted.insert(record.key()) {
          return Some(record);
        }
        continue;
      }
      let class = self.order.pop_front()?;
      self.pending.extend(self.build(class));
    }
  }
}

/// Literal text of one field, split by table language.
type ByLanguage = BTreeMap<String, Vec<String>>;

impl Extraction<'_> {
  fn build(&self, class: &OwlClass) -> Vec<TermRecord> {
    let prefixes = &self.options.prefixes;
    let map = &self.options.annotations;
    let id = prefixes.compact_or_keep(&class.iri);
    let ontology = if self.ontology.is_empty() {
      id_prefix(&id).to_owned()
    } else {
      self.ontology.clone()
    };

    let mut base = TermRecord::new(id.clone(), ontology, language::ENGLISH);
    let mut parents = class
      .superclasses
      .iter()
      .filter(|p| self.scope.contains(p.as_str()))
      .map(|p| prefixes.compact_or_keep(p));
    base.parent_id = parents.next();
    base.other_parents = parents.filter(|p| p != &id).collect();
    if let Some(parent) = &base.parent_id {
      base.other_parents.remove(parent);
    }

    base.deprecated = literals(class, &map.deprecated)
      .any(|l| matches!(l.lexical.trim().to_ascii_lowercase().as_str(), "true" | "1"));
    base.replaced_by = self.replacement(class);
    base.version = self.graph.version().map(str::to_owned);
    base.expected_type = self.expected_type(class, &id);

    let label = texts(class, &map.label);
    let definition = texts(class, &map.definition);
    let ui_label = texts(class, &map.ui_label);
    let ui_definition = texts(class, &map.ui_definition);
    let ui_help = texts(class, &map.ui_help);
    let synonym = self.synonyms(class, &map.synonym);
    let broad = self.synonyms(class, &map.broad_synonym);
    let narrow = self.synonyms(class, &map.narrow_synonym);
    let exact = self.synonyms(class, &map.exact_synonym);

    let languages: BTreeSet<&String> = [
      &label, &definition, &ui_label, &ui_definition, &ui_help, &synonym, &broad, &narrow,
      &exact,
    ]
    .into_iter()
    .flat_map(|field| field.keys())
    .filter(|lang| lang.as_str() != language::ENGLISH)
    .collect();

    let fill = |record: &mut TermRecord, lang: &str| {
      record.label = first(&label, lang);
      record.definition = first(&definition, lang);
      record.ui_label = first(&ui_label, lang);
      record.ui_definition = first(&ui_definition, lang);
      record.ui_help = first(&ui_help, lang);
      record.synonym = all(&synonym, lang);
      record.broad_synonym = all(&broad, lang);
      record.narrow_synonym = all(&narrow, lang);
      record.exact_synonym = all(&exact, lang);
    };

    let mut records = Vec::with_capacity(1 + languages.len());
    for lang in languages {
      let mut record = TermRecord::new(id.clone(), base.ontology.clone(), lang.clone());
      record.parent_id = base.parent_id.clone();
      record.other_parents = base.other_parents.clone();
      record.deprecated = base.deprecated;
      record.replaced_by = base.replaced_by.clone();
      record.version = base.version.clone();
      record.expected_type = base.expected_type;
      fill(&mut record, lang.as_str());
      records.push(record);
    }
    fill(&mut base, language::ENGLISH);
    records.insert(0, base);
    records
  }

  fn synonyms(&self, class: &OwlClass, predicates: &[String]) -> ByLanguage {
    let mut out = ByLanguage::new();
    for predicate in predicates {
      for value in class.values(predicate) {
        match value {
          AnnotationValue::Literal(literal) => push_literal(&mut out, literal),
          AnnotationValue::Iri(target) => {
            let text = self
              .graph
              .class(target)
              .and_then(|c| literals(c, &self.options.annotations.label).next())
              .map(|l| l.lexical.clone())
              .unwrap_or_else(|| self.options.prefixes.compact_or_keep(target));
            out.entry(language::ENGLISH.to_owned()).or_default().push(text);
          }
        }
      }
    }
    out
  }

  fn replacement(&self, class: &OwlClass) -> Option<String> {
    let prefixes = &self.options.prefixes;
    self
      .options
      .annotations
      .replaced_by
      .iter()
      .flat_map(|p| class.values(p))
      .find_map(|value| match value {
        AnnotationValue::Iri(target) => Some(prefixes.compact_or_keep(target)),
        AnnotationValue::Literal(l) => {
          let text = l.lexical.trim();
          match text {
            "" => None,
            t if t.starts_with("http://") || t.starts_with("https://") => {
              Some(prefixes.compact_or_keep(t))
            }
            t => Some(t.to_owned()),
          }
        }
      })
  }

  fn expected_type(&self, class: &OwlClass, id: &str) -> ExpectedType {
    let Some(predicate) = &self.options.annotations.expected_type else {
      return ExpectedType::default();
    };
    let Some(value) = class.values(predicate).next() else {
      return ExpectedType::default();
    };
    let raw = match value {
      AnnotationValue::Iri(iri) => iri.as_str(),
      AnnotationValue::Literal(l) => l.lexical.as_str(),
    };
    raw.parse().unwrap_or_else(|_| {
      warn!(term = id, value = raw, "unrecognised expected type; using categorical");
      ExpectedType::default()
    })
  }
}

fn literals<'a>(class: &'a OwlClass, predicates: &'a [String]) -> impl Iterator<Item = &'a Literal> {
  predicates
    .iter()
    .flat_map(|p| class.values(p))
    .filter_map(|value| match value {
      AnnotationValue::Literal(l) => Some(l),
      AnnotationValue::Iri(_) => None,
    })
}

fn texts(class: &OwlClass, predicates: &[String]) -> ByLanguage {
  let mut out = ByLanguage::new();
  for literal in literals(class, predicates) {
    push_literal(&mut out, literal);
  }
  out
}

fn push_literal(out: &mut ByLanguage, literal: &Literal) {
  let text = literal.lexical.trim();
  if text.is_empty() {
    return;
  }
  match language::from_tag(literal.language.as_deref()) {
    Some(lang) => out.entry(lang).or_default().push(text.to_owned()),
    None => debug!(tag = ?literal.language, "skipping literal with unknown language tag"),
  }
}

fn first(values: &ByLanguage, lang: &str) -> String {
  values.get(lang).and_then(|v| v.first()).cloned().unwrap_or_default()
}

fn all(values: &ByLanguage, lang: &str) -> SynonymSet {
  values.get(lang).map(|v| v.iter().cloned().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::Triple;

  const OBO: &str = "http://purl.obolibrary.org/obo/";

  fn obo(local: &str) -> String { format!("{OBO}{local}") }

  fn sample_graph() -> OntologyGraph {
    let ont = obo("genepio.owl");
    OntologyGraph::from_triples([
      Triple::iri(&ont, iri::RDF_TYPE, iri::OWL_ONTOLOGY),
      Triple::iri(&ont, iri::OWL_VERSION_IRI, &obo("genepio/releases/2024-01-01/genepio.owl")),
      Triple::iri(&obo("GENEPIO_1"), iri::RDF_TYPE, iri::OWL_CLASS),
      Triple::literal(&obo("GENEPIO_1"), iri::RDFS_LABEL, Literal::plain("root")),
      Triple::iri(&obo("GENEPIO_2"), iri::RDFS_SUBCLASS_OF, &obo("GENEPIO_1")),
      Triple::literal(&obo("GENEPIO_2"), iri::RDFS_LABEL, Literal::tagged("sample", "en-GB")),
      Triple::literal(&obo("GENEPIO_2"), iri::RDFS_LABEL, Literal::tagged("échantillon", "fr")),
      Triple::literal(&obo("GENEPIO_2"), iri::OIO_EXACT_SYNONYM, Literal::plain("specimen")),
      Triple::iri(&obo("GENEPIO_3"), iri::RDFS_SUBCLASS_OF, &obo("GENEPIO_2")),
      Triple::iri(&obo("GENEPIO_3"), iri::RDFS_SUBCLASS_OF, &obo("GENEPIO_1")),
      Triple::iri(&obo("GENEPIO_3"), iri::RDFS_SUBCLASS_OF, &obo("BFO_1")),
      Triple::literal(&obo("GENEPIO_3"), iri::OWL_DEPRECATED, Literal::plain("true")),
      Triple::iri(&obo("GENEPIO_3"), iri::IAO_REPLACED_BY, &obo("GENEPIO_2")),
      Triple::iri(&obo("GENEPIO_3"), iri::SKOS_BROADER, &obo("GENEPIO_2")),
    ])
  }

  fn keys(records: &[TermRecord]) -> Vec<String> {
    records.iter().map(|r| r.key().to_string()).collect()
  }

  #[test]
  fn breadth_first_with_language_records() {
    let graph = sample_graph();
    let options = ExtractOptions::default();
    let records: Vec<_> = Extractor::new(&graph, &options).extract(&obo("GENEPIO_1")).collect();

    assert_eq!(
      keys(&records),
      vec!["GENEPIO:1@en", "GENEPIO:2@en", "GENEPIO:2@fr", "GENEPIO:3@en"]
    );
    assert_eq!(records[1].label, "sample");
    assert_eq!(records[2].label, "échantillon");
    assert_eq!(records[2].parent_id.as_deref(), Some("GENEPIO:1"));
    assert!(records[1].exact_synonym.contains("specimen"));
    assert!(records[2].exact_synonym.is_empty());
  }

  #[test]
  fn provenance_comes_from_ontology_header() {
    let graph = sample_graph();
    let options = ExtractOptions::default();
    let extractor = Extractor::new(&graph, &options);
    assert_eq!(extractor.ontology(), "GENEPIO");

    let root = extractor.extract(&obo("GENEPIO_1")).next().unwrap();
    assert_eq!(root.ontology, "GENEPIO");
    assert_eq!(root.parent_id, None);
    assert_eq!(
      root.version.as_deref(),
      Some("http://purl.obolibrary.org/obo/genepio/releases/2024-01-01/genepio.owl")
    );
  }

  #[test]
  fn owl_thing_is_a_virtual_root() {
    let graph = OntologyGraph::from_triples([
      Triple::iri(&obo("TST_1"), iri::RDFS_SUBCLASS_OF, iri::OWL_THING),
      Triple::iri(&obo("TST_2"), iri::RDFS_SUBCLASS_OF, &obo("TST_1")),
      Triple::iri(&obo("TST_3"), iri::RDF_TYPE, iri::OWL_CLASS),
      Triple::iri(&obo("TST_4"), iri::RDFS_SUBCLASS_OF, &obo("TST_3")),
      Triple::iri(&obo("TST_4"), iri::RDFS_SUBCLASS_OF, iri::OWL_THING),
    ]);
    let options = ExtractOptions::default();
    let extractor = Extractor::new(&graph, &options);

    let records: Vec<_> = extractor.extract("owl:Thing").collect();
    assert_eq!(keys(&records), vec!["TST:1@en", "TST:3@en", "TST:2@en", "TST:4@en"]);
    assert!(records.iter().all(|r| r.validate().is_ok()));
    assert_eq!(records[0].parent_id, None);
    assert_eq!(records[1].parent_id, None);
    assert_eq!(records[2].parent_id.as_deref(), Some("TST:1"));
    assert_eq!(records[3].parent_id.as_deref(), Some("TST:3"));
    assert!(records[3].other_parents.is_empty());

    let by_iri: Vec<_> = extractor.extract(iri::OWL_THING).collect();
    assert_eq!(keys(&by_iri), keys(&records));
  }

  #[test]
  fn parents_follow_declaration_order_within_scope() {
    let graph = sample_graph();
    let options = ExtractOptions::default();
    let records: Vec<_> = Extractor::new(&graph, &options).extract(&obo("GENEPIO_1")).collect();
    let leaf = records.iter().find(|r| r.id() == "GENEPIO:3").unwrap();

    assert_eq!(leaf.parent_id.as_deref(), Some("GENEPIO:2"));
    assert_eq!(leaf.other_parents.iter().collect::<Vec<_>>(), vec!["GENEPIO:1"]);
    assert!(leaf.deprecated);
    assert_eq!(leaf.replaced_by.as_deref(), Some("GENEPIO:2"));
    assert!(leaf.broad_synonym.contains("sample"));
  }

  #[test]
  fn missing_root_yields_nothing() {
    let graph = sample_graph();
    let options = ExtractOptions::default();
    assert_eq!(Extractor::new(&graph, &options).extract(&obo("GENEPIO_404")).count(), 0);
  }

  #[test]
  fn overlapping_roots_are_deduplicated() {
    let graph = sample_graph();
    let options = ExtractOptions { ontology_prefix: Some("GEN".into()), ..Default::default() };
    let extractor = Extractor::new(&graph, &options);
    let records: Vec<_> = extractor.extract_roots(&["GENEPIO:2", "GENEPIO:1"]).collect();

    assert_eq!(
      keys(&records),
      vec!["GENEPIO:2@en", "GENEPIO:2@fr", "GENEPIO:3@en", "GENEPIO:1@en"]
    );
    assert!(records.iter().all(|r| r.ontology == "GEN"));
  }

  #[test]
  fn extraction_is_restartable() {
    let graph = sample_graph();
    let options = ExtractOptions::default();
    let extractor = Extractor::new(&graph, &options);
    let first: Vec<_> = extractor.extract(&obo("GENEPIO_1")).collect();
    let second: Vec<_> = extractor.extract(&obo("GENEPIO_1")).collect();
    assert_eq!(keys(&first), keys(&second));
  }

  #[test]
  fn ontology_prefix_from_file_stem() {
    assert_eq!(
      prefix_from_ontology_iri("http://purl.obolibrary.org/obo/genepio.owl").as_deref(),
      Some("GENEPIO")
    );
    assert_eq!(prefix_from_ontology_iri("http://example.org/onto/").as_deref(), Some("ONTO"));
  }
}
