//! Error type for `vocab-owl`.

use thiserror::Error;
use vocab_core::SourceError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   String,
    #[source]
    source: std::io::Error,
  },

  #[error("request for {url} failed: {source}")]
  Http {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("cannot tell the RDF format of {0}")]
  UnknownFormat(String),

  #[error("failed to parse {location}: {reason}")]
  Parse { location: String, reason: String },
}

impl From<Error> for SourceError {
  fn from(e: Error) -> Self {
    match e {
      Error::Parse { location, reason } => SourceError::Parse { location, reason },
      Error::UnknownFormat(location) => SourceError::Parse {
        location,
        reason: "unrecognised RDF serialisation".to_owned(),
      },
      Error::Io { path, source } => SourceError::Unavailable {
        location: path,
        reason:   source.to_string(),
      },
      Error::Http { url, source } => SourceError::Unavailable {
        location: url,
        reason:   source.to_string(),
      },
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
