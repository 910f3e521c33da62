//! RDF serialisation detection.

use std::{fmt, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
  NTriples,
  Turtle,
  RdfXml,
}

impl RdfFormat {
  /// Guess from a file name or URL path. `.owl` is taken to be RDF/XML.
  pub fn from_extension(location: &str) -> Option<Self> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
      "nt" | "ntriples" => Some(Self::NTriples),
      "ttl" | "turtle" => Some(Self::Turtle),
      "rdf" | "owl" | "xml" => Some(Self::RdfXml),
      _ => None,
    }
  }

  /// Map an HTTP `Content-Type` header value, ignoring parameters.
  pub fn from_content_type(value: &str) -> Option<Self> {
    let mime = value.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
      "application/n-triples" => Some(Self::NTriples),
      "text/turtle" | "application/x-turtle" => Some(Self::Turtle),
      "application/rdf+xml" | "application/owl+xml" | "application/xml" | "text/xml" => {
        Some(Self::RdfXml)
      }
      _ => None,
    }
  }

  /// Last resort: look at the first non-blank bytes of the document.
  pub fn sniff(bytes: &[u8]) -> Self {
    let start = bytes
      .iter()
      .position(|b| !b.is_ascii_whitespace())
      .unwrap_or(bytes.len());
    if bytes[start..].starts_with(b"<?xml") || bytes[start..].starts_with(b"<rdf:RDF") {
      Self::RdfXml
    } else {
      Self::Turtle
    }
  }
}

impl fmt::Display for RdfFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::NTriples => "N-Triples",
      Self::Turtle => "Turtle",
      Self::RdfXml => "RDF/XML",
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extensions_and_urls() {
    assert_eq!(RdfFormat::from_extension("genepio.owl"), Some(RdfFormat::RdfXml));
    assert_eq!(RdfFormat::from_extension("dir/terms.TTL"), Some(RdfFormat::Turtle));
    assert_eq!(
      RdfFormat::from_extension("https://example.org/onto.nt?download=1"),
      Some(RdfFormat::NTriples)
    );
    assert_eq!(RdfFormat::from_extension("https://example.org/onto"), None);
  }

  #[test]
  fn content_types_ignore_parameters() {
    assert_eq!(
      RdfFormat::from_content_type("text/turtle; charset=utf-8"),
      Some(RdfFormat::Turtle)
    );
    assert_eq!(RdfFormat::from_content_type("application/rdf+xml"), Some(RdfFormat::RdfXml));
    assert_eq!(RdfFormat::from_content_type("text/html"), None);
  }

  #[test]
  fn sniffing_falls_back_to_turtle() {
    assert_eq!(RdfFormat::sniff(b"\n  <?xml version=\"1.0\"?>"), RdfFormat::RdfXml);
    assert_eq!(RdfFormat::sniff(b"@prefix owl: <http://www.w3.org/2002/07/owl#> ."), RdfFormat::Turtle);
    assert_eq!(RdfFormat::sniff(b""), RdfFormat::Turtle);
  }
}
