//! In-memory view of a parsed ontology: classes, their declared superclasses
//! and their annotations.
//!
//! Providers build an [`OntologyGraph`] from raw triples with
//! [`OntologyGraph::from_triples`]; the extractor only reads it.

use std::collections::{HashMap, hash_map::Entry};

// ─── Vocabulary ──────────────────────────────────────────────────────────────

pub mod iri {
  pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
  pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
  pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
  pub const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";

  pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
  pub const OWL_THING: &str = "http://www.w3.org/2002/07/owl#Thing";
  pub const OWL_ONTOLOGY: &str = "http://www.w3.org/2002/07/owl#Ontology";
  pub const OWL_IMPORTS: &str = "http://www.w3.org/2002/07/owl#imports";
  pub const OWL_VERSION_IRI: &str = "http://www.w3.org/2002/07/owl#versionIRI";
  pub const OWL_VERSION_INFO: &str = "http://www.w3.org/2002/07/owl#versionInfo";
  pub const OWL_DEPRECATED: &str = "http://www.w3.org/2002/07/owl#deprecated";

  pub const IAO_DEFINITION: &str = "http://purl.obolibrary.org/obo/IAO_0000115";
  pub const IAO_REPLACED_BY: &str = "http://purl.obolibrary.org/obo/IAO_0100001";
  pub const GENEPIO_UI_LABEL: &str = "http://purl.obolibrary.org/obo/GENEPIO_0000006";
  pub const GENEPIO_UI_DEFINITION: &str = "http://purl.obolibrary.org/obo/GENEPIO_0000162";
  pub const GENEPIO_UI_HELP: &str = "http://purl.obolibrary.org/obo/GENEPIO_0001763";

  pub const OIO_SYNONYM: &str = "http://www.geneontology.org/formats/oboInOwl#hasSynonym";
  pub const OIO_RELATED_SYNONYM: &str =
    "http://www.geneontology.org/formats/oboInOwl#hasRelatedSynonym";
  pub const OIO_BROAD_SYNONYM: &str =
    "http://www.geneontology.org/formats/oboInOwl#hasBroadSynonym";
  pub const OIO_NARROW_SYNONYM: &str =
    "http://www.geneontology.org/formats/oboInOwl#hasNarrowSynonym";
  pub const OIO_EXACT_SYNONYM: &str =
    "http://www.geneontology.org/formats/oboInOwl#hasExactSynonym";

  pub const SKOS_DEFINITION: &str = "http://www.w3.org/2004/02/skos/core#definition";
  pub const SKOS_ALT_LABEL: &str = "http://www.w3.org/2004/02/skos/core#altLabel";
  pub const SKOS_BROADER: &str = "http://www.w3.org/2004/02/skos/core#broader";
  pub const SKOS_BROAD_MATCH: &str = "http://www.w3.org/2004/02/skos/core#broadMatch";
  pub const SKOS_NARROWER: &str = "http://www.w3.org/2004/02/skos/core#narrower";
  pub const SKOS_NARROW_MATCH: &str = "http://www.w3.org/2004/02/skos/core#narrowMatch";
  pub const SKOS_EXACT_MATCH: &str = "http://www.w3.org/2004/02/skos/core#exactMatch";
}

// ─── Triples ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
  Iri(String),
  Blank(String),
}

impl Node {
  pub fn as_iri(&self) -> Option<&str> {
    match self {
      Self::Iri(iri) => Some(iri),
      Self::Blank(_) => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
  pub lexical:  String,
  pub language: Option<String>,
  pub datatype: Option<String>,
}

impl Literal {
  pub fn plain(lexical: impl Into<String>) -> Self {
    Self { lexical: lexical.into(), language: None, datatype: None }
  }

  pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
    Self { lexical: lexical.into(), language: Some(language.into()), datatype: None }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
  Node(Node),
  Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
  pub subject:   Node,
  pub predicate: String,
  pub object:    Object,
}

impl Triple {
  pub fn iri(subject: &str, predicate: &str, object: &str) -> Self {
    Self {
      subject:   Node::Iri(subject.to_owned()),
      predicate: predicate.to_owned(),
      object:    Object::Node(Node::Iri(object.to_owned())),
    }
  }

  pub fn literal(subject: &str, predicate: &str, literal: Literal) -> Self {
    Self {
      subject:   Node::Iri(subject.to_owned()),
      predicate: predicate.to_owned(),
      object:    Object::Literal(literal),
    }
  }
}

// ─── Classes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
  Iri(String),
  Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
  pub predicate: String,
  pub value:     AnnotationValue,
}

/// A named OWL class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwlClass {
  pub iri:          String,
  /// Named direct superclasses, in source declaration order.
  pub superclasses: Vec<String>,
  pub annotations:  Vec<Annotation>,
}

impl OwlClass {
  fn new(iri: String) -> Self {
    Self { iri, superclasses: Vec::new(), annotations: Vec::new() }
  }

  /// Annotation values for `predicate`, in source order.
  pub fn values<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a AnnotationValue> {
    self
      .annotations
      .iter()
      .filter(move |a| a.predicate == predicate)
      .map(|a| &a.value)
  }
}

// ─── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OntologyGraph {
  pub iri:          Option<String>,
  pub version_iri:  Option<String>,
  pub version_info: Option<String>,
  /// Ontologies listed with `owl:imports`, in source order.
  pub imports:      Vec<String>,
  classes:          Vec<OwlClass>,
  index:            HashMap<String, usize>,
  subclasses:       HashMap<String, Vec<String>>,
}

impl OntologyGraph {
  pub fn new() -> Self { Self::default() }

  /// Build a graph from triples in source order.
  ///
  /// Classes are IRIs typed `owl:Class`/`rdfs:Class` or appearing on either
  /// side of `rdfs:subClassOf`. Anonymous superclasses (restrictions and
  /// class expressions) are ignored. Annotations are kept only for classes.
  pub fn from_triples<I>(triples: I) -> Self
  where
    I: IntoIterator<Item = Triple>,
  {
    let triples: Vec<Triple> = triples.into_iter().collect();
    let mut graph = Self::new();

    for t in &triples {
      let Some(subject) = t.subject.as_iri() else { continue };
      let object_iri = match &t.object {
        Object::Node(node) => node.as_iri(),
        Object::Literal(_) => None,
      };

      match (t.predicate.as_str(), object_iri) {
        (iri::RDF_TYPE, Some(iri::OWL_CLASS | iri::RDFS_CLASS)) => {
          graph.declare_class(subject);
        }
        (iri::RDF_TYPE, Some(iri::OWL_ONTOLOGY)) => {
          if graph.iri.is_none() {
            graph.iri = Some(subject.to_owned());
          }
        }
        (iri::RDFS_SUBCLASS_OF, Some(parent)) => graph.add_subclass(subject, parent),
        (iri::RDFS_SUBCLASS_OF, None) => {
          graph.declare_class(subject);
        }
        (iri::OWL_IMPORTS, Some(import)) => {
          if !graph.imports.iter().any(|i| i == import) {
            graph.imports.push(import.to_owned());
          }
        }
        _ => {}
      }
    }

    for t in triples {
      let Node::Iri(subject) = t.subject else { continue };

      if graph.iri.as_deref() == Some(subject.as_str()) {
        match (t.predicate.as_str(), &t.object) {
          (iri::OWL_VERSION_IRI, Object::Node(Node::Iri(v))) => {
            graph.version_iri.get_or_insert_with(|| v.clone());
          }
          (iri::OWL_VERSION_INFO, Object::Literal(l)) => {
            graph.version_info.get_or_insert_with(|| l.lexical.clone());
          }
          _ => {}
        }
        continue;
      }

      if !graph.index.contains_key(&subject)
        || t.predicate == iri::RDF_TYPE
        || t.predicate == iri::RDFS_SUBCLASS_OF
      {
        continue;
      }
      let value = match t.object {
        Object::Node(Node::Iri(iri)) => AnnotationValue::Iri(iri),
        Object::Literal(literal) => AnnotationValue::Literal(literal),
        Object::Node(Node::Blank(_)) => continue,
      };
      graph.annotate(&subject, Annotation { predicate: t.predicate, value });
    }

    graph
  }

  /// Register `iri` as a class, returning its index. Idempotent.
  pub fn declare_class(&mut self, iri: &str) -> usize {
    match self.index.entry(iri.to_owned()) {
      Entry::Occupied(e) => *e.get(),
      Entry::Vacant(e) => {
        let idx = self.classes.len();
        self.classes.push(OwlClass::new(iri.to_owned()));
        e.insert(idx);
        idx
      }
    }
  }

  /// Record `child rdfs:subClassOf parent`, declaring both.
  pub fn add_subclass(&mut self, child: &str, parent: &str) {
    let idx = self.declare_class(child);
    self.declare_class(parent);
    if child == parent || self.classes[idx].superclasses.iter().any(|p| p == parent) {
      return;
    }
    self.classes[idx].superclasses.push(parent.to_owned());
    self
      .subclasses
      .entry(parent.to_owned())
      .or_default()
      .push(child.to_owned());
  }

  pub fn annotate(&mut self, iri: &str, annotation: Annotation) {
    let idx = self.declare_class(iri);
    let class = &mut self.classes[idx];
    if !class.annotations.contains(&annotation) {
      class.annotations.push(annotation);
    }
  }

  pub fn class(&self, iri: &str) -> Option<&OwlClass> {
    self.index.get(iri).map(|&idx| &self.classes[idx])
  }

  pub fn contains(&self, iri: &str) -> bool { self.index.contains_key(iri) }

  /// Classes in declaration order.
  pub fn classes(&self) -> &[OwlClass] { &self.classes }

  /// Direct named subclasses of `iri`, in declaration order.
  pub fn direct_subclasses(&self, iri: &str) -> &[String] {
    self.subclasses.get(iri).map(Vec::as_slice).unwrap_or_default()
  }

  /// The version recorded for this ontology: `owl:versionIRI`, else
  /// `owl:versionInfo`.
  pub fn version(&self) -> Option<&str> {
    self.version_iri.as_deref().or(self.version_info.as_deref())
  }

  /// Fold an imported ontology into this one. Header fields of `self` win;
  /// classes, superclasses and annotations are unioned in `other`'s order
  /// after this graph's own.
  pub fn merge(&mut self, other: OntologyGraph) {
    for class in other.classes {
      self.declare_class(&class.iri);
      for parent in &class.superclasses {
        self.add_subclass(&class.iri, parent);
      }
      for annotation in class.annotations {
        self.annotate(&class.iri, annotation);
      }
    }
    for import in other.imports {
      if !self.imports.contains(&import) {
        self.imports.push(import);
      }
    }
  }
}
