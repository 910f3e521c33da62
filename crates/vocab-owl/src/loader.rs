//! [`RdfLoader`]: file and HTTP ontology source.

use std::{
  collections::{HashSet, VecDeque},
  path::{Path, PathBuf},
  time::Instant,
};

use tracing::{debug, info, warn};
use vocab_core::{
  SourceError,
  graph::OntologyGraph,
  store::{OntologySource, SourceRef},
};

use crate::{Error, Result, format::RdfFormat, parse::parse_graph};

/// Loads ontology documents from paths or http(s) URLs.
///
/// With `follow_imports` on (the default) every `owl:imports` target is
/// loaded once and merged into the importing graph. An import that cannot be
/// read is logged and skipped; only the top-level document is required.
#[derive(Debug, Clone)]
pub struct RdfLoader {
  client:         reqwest::Client,
  follow_imports: bool,
  import_dir:     Option<PathBuf>,
}

impl Default for RdfLoader {
  fn default() -> Self { Self::new() }
}

impl RdfLoader {
  pub fn new() -> Self { Self::with_client(reqwest::Client::new()) }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client, follow_imports: true, import_dir: None }
  }

  pub fn follow_imports(mut self, follow: bool) -> Self {
    self.follow_imports = follow;
    self
  }

  /// Look for imported documents in `dir` first, by the last path segment
  /// of the import IRI.
  pub fn import_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.import_dir = Some(dir.into());
    self
  }

  /// Load `source` and, if enabled, everything it imports.
  pub async fn load_graph(&self, source: &SourceRef) -> Result<OntologyGraph> {
    let started = Instant::now();
    let mut graph = self.load_document(source).await?;
    if self.follow_imports {
      self.merge_imports(&mut graph).await;
    }
    info!(
      %source,
      classes = graph.classes().len(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "ontology loaded"
    );
    Ok(graph)
  }

  async fn load_document(&self, source: &SourceRef) -> Result<OntologyGraph> {
    let location = source.to_string();
    let (bytes, declared) = match source {
      SourceRef::Path(path) => (read_file(path).await?, None),
      SourceRef::Url(url) => self.fetch(url).await?,
    };
    let format = declared
      .or_else(|| RdfFormat::from_extension(&location))
      .unwrap_or_else(|| RdfFormat::sniff(&bytes));
    parse_graph(&bytes, format, &location)
  }

  /// GET `url`, returning the body and the format named by its content type.
  async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<RdfFormat>)> {
    let http = |source| Error::Http { url: url.to_owned(), source };

    debug!(url, "fetching");
    let response = self
      .client
      .get(url)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(http)?;
    let declared = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .and_then(RdfFormat::from_content_type);
    let body = response.bytes().await.map_err(http)?;
    Ok((body.to_vec(), declared))
  }

  async fn merge_imports(&self, graph: &mut OntologyGraph) {
    let mut seen: HashSet<String> = graph.iri.iter().cloned().collect();
    let mut queue: VecDeque<String> = graph.imports.iter().cloned().collect();

    while let Some(import) = queue.pop_front() {
      if !seen.insert(import.clone()) {
        continue;
      }
      let Some(source) = self.resolve_import(&import).await else {
        warn!(%import, "import is neither a local file nor a URL; skipped");
        continue;
      };

      match self.load_document(&source).await {
        Ok(imported) => {
          debug!(%import, %source, classes = imported.classes().len(), "import merged");
          if let Some(iri) = &imported.iri {
            seen.insert(iri.clone());
          }
          queue.extend(imported.imports.iter().cloned());
          graph.merge(imported);
        }
        Err(e) => warn!(%import, error = %e, "import could not be loaded; skipped"),
      }
    }
  }

  async fn resolve_import(&self, iri: &str) -> Option<SourceRef> {
    if let Some(dir) = &self.import_dir
      && let Some(name) = iri.trim_end_matches('/').rsplit('/').next()
      && !name.is_empty()
    {
      let local = dir.join(name);
      if tokio::fs::try_exists(&local).await.unwrap_or(false) {
        return Some(SourceRef::Path(local));
      }
    }

    if let Some(path) = iri.strip_prefix("file://") {
      return Some(SourceRef::Path(PathBuf::from(path)));
    }
    match iri.parse::<SourceRef>() {
      Ok(url @ SourceRef::Url(_)) => Some(url),
      _ => None,
    }
  }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
  tokio::fs::read(path).await.map_err(|source| Error::Io {
    path: path.display().to_string(),
    source,
  })
}

impl OntologySource for RdfLoader {
  async fn load(&self, source: &SourceRef) -> Result<OntologyGraph, SourceError> {
    Ok(self.load_graph(source).await?)
  }
}
