//! Layered configuration: `vocab.toml` (or `--config`), then `VOCAB_*`
//! environment variables, then command-line flags.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use vocab_core::{
  RefreshOptions,
  extract::{AnnotationMap, ExtractOptions},
  prefix::PrefixMap,
  reconcile::SourcePolicy,
};
use vocab_owl::RdfLoader;

/// Shape of the optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:      PathBuf,
  /// Ontology prefixes from most to least trusted. Empty keeps whichever
  /// source supplied a term first.
  pub source_priority: Vec<String>,
  /// Extra prefixes for compacting non-OBO IRIs.
  pub namespaces:      Vec<Namespace>,
  pub ontology_prefix: Option<String>,
  pub annotations:     AnnotationMap,
  pub follow_imports:  bool,
  /// Directory searched for imported documents before going to the network.
  pub import_dir:      Option<PathBuf>,
  /// Seconds after which another writer may take over a table's lease.
  pub lease_ttl_secs:  u64,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:      PathBuf::from("vocab.db"),
      source_priority: Vec::new(),
      namespaces:      Vec::new(),
      ontology_prefix: None,
      annotations:     AnnotationMap::default(),
      follow_imports:  true,
      import_dir:      None,
      lease_ttl_secs:  vocab_store_sqlite::DEFAULT_LEASE_TTL.as_secs(),
    }
  }
}

/// A `[[namespaces]]` entry. Config case-folds table keys; prefixes are
/// case-sensitive.
#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
  pub prefix:    String,
  pub namespace: String,
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("VOCAB"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn refresh_options(&self) -> anyhow::Result<RefreshOptions> {
    let mut prefixes = PrefixMap::new();
    for Namespace { prefix, namespace } in &self.namespaces {
      prefixes
        .register(prefix, namespace)
        .with_context(|| format!("invalid namespace prefix {prefix:?}"))?;
    }

    let policy = if self.source_priority.is_empty() {
      SourcePolicy::PreferExisting
    } else {
      SourcePolicy::Priority(self.source_priority.clone())
    };

    Ok(RefreshOptions {
      policy,
      extract: ExtractOptions {
        prefixes,
        annotations: self.annotations.clone(),
        ontology_prefix: self.ontology_prefix.clone(),
      },
      ..RefreshOptions::default()
    })
  }

  pub fn lease_ttl(&self) -> Duration { Duration::from_secs(self.lease_ttl_secs) }

  pub fn loader(&self) -> RdfLoader {
    let loader = RdfLoader::new().follow_imports(self.follow_imports);
    match &self.import_dir {
      Some(dir) => loader.import_dir(expand_tilde(dir)),
      None => loader,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
