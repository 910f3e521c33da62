//! Core types and the reconciliation engine for ontology vocabulary tables.
//!
//! A vocabulary table holds one [`term::TermRecord`] per `(id, language)`
//! pair. Tables are refreshed from parsed ontology graphs: the
//! [`extract::Extractor`] walks a class hierarchy, the
//! [`reconcile::Reconciler`] merges candidates into the table, and every
//! committed change becomes an append-only [`history::HistoryEntry`].
//!
//! RDF parsing and persistence live behind the [`store::OntologySource`] and
//! [`store::TableStore`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod history;
pub mod language;
pub mod lease;
pub mod prefix;
pub mod reconcile;
pub mod refresh;
pub mod service;
pub mod store;
pub mod table;
pub mod term;

pub use error::{Error, Result, SourceError, ValidationError};
pub use refresh::{RefreshOptions, refresh};
