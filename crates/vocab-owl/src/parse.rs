//! sophia parsers → [`vocab_core::graph::Triple`]s.
//!
//! sophia terms are read through their N-Triples display form (`<iri>`,
//! `_:b0`, `"lex"@lang`, `"lex"^^<dt>`) so the rest of the workspace never
//! sees sophia types.

use std::io::Cursor;

use sophia::api::{source::TripleSource as _, triple::Triple as _};
use tracing::debug;
use vocab_core::graph::{Literal, Node, Object, OntologyGraph, Triple};

use crate::{Error, Result, format::RdfFormat};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TermError(String);

/// Parse `bytes` as `format`. `location` is only used in error messages.
pub fn parse_triples(bytes: &[u8], format: RdfFormat, location: &str) -> Result<Vec<Triple>> {
  let reader = Cursor::new(bytes);
  let mut out = Vec::new();

  let streamed = match format {
    RdfFormat::NTriples => sophia::turtle::parser::nt::parse_bufread(reader)
      .try_for_each_triple(|t| push(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string()))
      .map_err(|e| e.to_string()),
    RdfFormat::Turtle => sophia::turtle::parser::turtle::parse_bufread(reader)
      .try_for_each_triple(|t| push(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string()))
      .map_err(|e| e.to_string()),
    RdfFormat::RdfXml => sophia::xml::parser::parse_bufread(reader)
      .try_for_each_triple(|t| push(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string()))
      .map_err(|e| e.to_string()),
  };
  streamed.map_err(|reason| Error::Parse { location: location.to_owned(), reason })?;

  debug!(location, %format, triples = out.len(), "parsed");
  Ok(out)
}

/// Parse `bytes` straight into an [`OntologyGraph`].
pub fn parse_graph(bytes: &[u8], format: RdfFormat, location: &str) -> Result<OntologyGraph> {
  Ok(OntologyGraph::from_triples(parse_triples(bytes, format, location)?))
}

fn push(out: &mut Vec<Triple>, s: &str, p: &str, o: &str) -> Result<(), TermError> {
  let subject = match parse_term(s)? {
    Object::Node(node) => node,
    Object::Literal(_) => return Err(TermError(format!("literal in subject position: {s}"))),
  };
  // Generalised RDF can put blank nodes here; nothing downstream reads them.
  let Object::Node(Node::Iri(predicate)) = parse_term(p)? else {
    return Ok(());
  };
  let object = parse_term(o)?;
  out.push(Triple { subject, predicate, object });
  Ok(())
}

fn parse_term(term: &str) -> Result<Object, TermError> {
  let s = term.trim();

  if let Some(iri) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
    return Ok(Object::Node(Node::Iri(iri.to_owned())));
  }
  if let Some(label) = s.strip_prefix("_:") {
    return Ok(Object::Node(Node::Blank(label.to_owned())));
  }
  if !s.starts_with('"') {
    return Err(TermError(format!("unsupported RDF term: {s}")));
  }

  let mut end = None;
  let mut escaped = false;
  for (i, ch) in s.char_indices().skip(1) {
    match ch {
      '\\' if !escaped => escaped = true,
      '"' if !escaped => {
        end = Some(i);
        break;
      }
      _ => escaped = false,
    }
  }
  let Some(end) = end else {
    return Err(TermError(format!("unterminated literal: {s}")));
  };

  let lexical = unescape(&s[1..end]);
  let rest = s[end + 1..].trim();
  let mut literal = Literal { lexical, language: None, datatype: None };
  if let Some(lang) = rest.strip_prefix('@') {
    literal.language = Some(lang.to_owned());
  } else if let Some(dt) = rest.strip_prefix("^^") {
    let dt = dt.trim();
    let dt = dt.strip_prefix('<').and_then(|d| d.strip_suffix('>')).unwrap_or(dt);
    literal.datatype = Some(dt.to_owned());
  }
  Ok(Object::Literal(literal))
}

fn unescape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('t') => out.push('\t'),
      Some('"') => out.push('"'),
      Some('\'') => out.push('\''),
      Some('\\') => out.push('\\'),
      Some('u') => push_code_point(&mut out, &mut chars, 4),
      Some('U') => push_code_point(&mut out, &mut chars, 8),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

fn push_code_point(out: &mut String, chars: &mut std::str::Chars<'_>, digits: usize) {
  let hex: String = chars.by_ref().take(digits).collect();
  match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
    Some(c) => out.push(c),
    None => {
      out.push('\\');
      out.push_str(&hex);
    }
  }
}
