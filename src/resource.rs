//! Resource identifiers and descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::QueryError;
use crate::params::Signature;

/// Identifies one cache slot: a (view-instance, resource) pair such as
/// `companies:table` or `countries`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
  pub fn new(id: &str) -> Result<Self, QueryError> {
    let valid = !id.is_empty()
      && id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '/' | '.' | '-'));
    if !valid {
      return Err(QueryError::InvalidResource(id.to_string()));
    }
    Ok(Self(id.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl FromStr for ResourceId {
  type Err = QueryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s)
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// How freshness is judged for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
  /// Paginated list view; an entry is valid for the signature it was fetched
  /// with.
  Paginated,
  /// Session-scoped reference data; valid for `ttl` regardless of parameters,
  /// mirrored to session storage.
  Reference { ttl: Duration },
}

impl ResourceKind {
  pub fn name(&self) -> &'static str {
    match self {
      ResourceKind::Paginated => "paginated",
      ResourceKind::Reference { .. } => "reference",
    }
  }

  pub fn ttl(&self) -> Option<Duration> {
    match self {
      ResourceKind::Paginated => None,
      ResourceKind::Reference { ttl } => Some(*ttl),
    }
  }
}

/// A cache slot plus the endpoint that fills it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  pub id: ResourceId,
  pub endpoint: String,
  pub kind: ResourceKind,
}

impl Resource {
  pub fn paginated(id: &str, endpoint: &str) -> Result<Self, QueryError> {
    Self::new(id, endpoint, ResourceKind::Paginated)
  }

  pub fn reference(id: &str, endpoint: &str, ttl: Duration) -> Result<Self, QueryError> {
    Self::new(id, endpoint, ResourceKind::Reference { ttl })
  }

  pub fn new(id: &str, endpoint: &str, kind: ResourceKind) -> Result<Self, QueryError> {
    let id = ResourceId::new(id)?;
    if !endpoint.starts_with('/') || endpoint.chars().any(char::is_whitespace) {
      return Err(QueryError::InvalidResource(endpoint.to_string()));
    }
    Ok(Self {
      id,
      endpoint: endpoint.to_string(),
      kind,
    })
  }

  pub fn is_reference(&self) -> bool {
    matches!(self.kind, ResourceKind::Reference { .. })
  }

  /// Coalescing key. Keyed by endpoint rather than slot so identical queries
  /// from different views share one call.
  pub fn request_key(&self, signature: &Signature) -> String {
    request_key(&self.endpoint, signature)
  }
}

pub(crate) fn request_key(endpoint: &str, signature: &Signature) -> String {
  format!("{}?{}", endpoint, signature.cache_hash())
}
