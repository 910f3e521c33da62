//! IRI ↔ CURIE conversion.

use std::collections::BTreeMap;

use crate::{error::ValidationError, term::LOCAL_PREFIX};

/// Base of every OBO Foundry class IRI (`…/obo/PFX_LOCAL`).
pub const OBO_BASE: &str = "http://purl.obolibrary.org/obo/";

/// Registered namespace prefixes plus the OBO Foundry naming rule.
#[derive(Debug, Clone, Default)]
pub struct PrefixMap {
  namespaces: BTreeMap<String, String>,
}

impl PrefixMap {
  pub fn new() -> Self { Self::default() }

  /// Register `prefix` for IRIs starting with `namespace`. The reserved
  /// local prefix cannot be registered.
  pub fn register(
    &mut self,
    prefix: impl Into<String>,
    namespace: impl Into<String>,
  ) -> Result<(), ValidationError> {
    let prefix = prefix.into();
    if prefix.eq_ignore_ascii_case(LOCAL_PREFIX) {
      return Err(ValidationError::ReservedPrefix(prefix));
    }
    self.namespaces.insert(prefix, namespace.into());
    Ok(())
  }

  pub fn with(
    mut self,
    prefix: impl Into<String>,
    namespace: impl Into<String>,
  ) -> Result<Self, ValidationError> {
    self.register(prefix, namespace)?;
    Ok(self)
  }

  pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
    self.namespaces.iter().map(|(p, n)| (p.as_str(), n.as_str()))
  }

  /// Compact `iri` to `prefix:local`, or `None` if no rule applies.
  ///
  /// The longest matching registered namespace wins; the OBO rule is tried
  /// last and never yields the reserved local prefix.
  pub fn compact(&self, iri: &str) -> Option<String> {
    let registered = self
      .namespaces
      .iter()
      .filter(|(_, ns)| iri.starts_with(ns.as_str()) && iri.len() > ns.len())
      .max_by_key(|(_, ns)| ns.len())
      .map(|(prefix, ns)| format!("{prefix}:{}", &iri[ns.len()..]));
    if registered.is_some() {
      return registered;
    }

    let local = iri.strip_prefix(OBO_BASE)?;
    let (prefix, id) = local.split_once('_')?;
    if prefix.is_empty()
      || id.is_empty()
      || prefix.contains('/')
      || prefix.eq_ignore_ascii_case(LOCAL_PREFIX)
    {
      return None;
    }
    Some(format!("{prefix}:{id}"))
  }

  /// Compact `iri`, falling back to the IRI unchanged.
  pub fn compact_or_keep(&self, iri: &str) -> String {
    self.compact(iri).unwrap_or_else(|| iri.to_owned())
  }

  /// Expand a CURIE back to a full IRI. Unregistered prefixes follow the OBO
  /// rule. Local ids have no IRI.
  pub fn expand(&self, curie: &str) -> Option<String> {
    let (prefix, local) = curie.split_once(':')?;
    if local.starts_with("//") || prefix.eq_ignore_ascii_case(LOCAL_PREFIX) {
      return None;
    }
    match self.namespaces.get(prefix) {
      Some(ns) => Some(format!("{ns}{local}")),
      None => Some(format!("{OBO_BASE}{prefix}_{local}")),
    }
  }
}
