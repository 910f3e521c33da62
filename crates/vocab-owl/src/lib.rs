//! RDF ontology loading for vocabulary tables.
//!
//! [`RdfLoader`] implements [`vocab_core::store::OntologySource`]: it reads a
//! document from disk or over HTTP, parses Turtle, N-Triples or RDF/XML with
//! sophia, and hands the triples to
//! [`OntologyGraph::from_triples`](vocab_core::graph::OntologyGraph::from_triples).

pub mod error;
pub mod format;
pub mod loader;
pub mod parse;

pub use error::{Error, Result};
pub use format::RdfFormat;
pub use loader::RdfLoader;
pub use parse::{parse_graph, parse_triples};
