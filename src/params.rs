//! Query parameters and their canonical signatures.
//!
//! A `QueryParams` is what a view sends with a request; a `Signature` is what
//! the cache compares. Empty strings and unset values carry no meaning, so two
//! parameter sets that differ only in empty keys produce the same signature.
//! Numbers are always significant, including zero.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Keys that ride along with a request but never describe the query itself.
const TRANSIENT_KEYS: &[&str] = &["background"];

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 25;

/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Int(i64),
  Text(String),
}

impl ParamValue {
  /// The value if it counts as "set". Only empty text is absent.
  fn effective(&self) -> Option<&ParamValue> {
    match self {
      ParamValue::Text(s) if s.is_empty() => None,
      v => Some(v),
    }
  }
}

impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::Int(n) => write!(f, "{}", n),
      ParamValue::Text(s) => f.write_str(s),
    }
  }
}

impl From<i64> for ParamValue {
  fn from(n: i64) -> Self {
    ParamValue::Int(n)
  }
}

impl From<u32> for ParamValue {
  fn from(n: u32) -> Self {
    ParamValue::Int(i64::from(n))
  }
}

impl From<&str> for ParamValue {
  fn from(s: &str) -> Self {
    ParamValue::Text(s.to_string())
  }
}

impl From<String> for ParamValue {
  fn from(s: String) -> Self {
    ParamValue::Text(s)
  }
}

/// Ordered mapping of named fields to optional scalar values.
///
/// `None` models an explicitly present but null/undefined field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
  fields: BTreeMap<String, Option<ParamValue>>,
}

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style setter.
  pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
    self.set(key, value);
    self
  }

  pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) {
    self.fields.insert(key.to_string(), Some(value.into()));
  }

  /// Set a field that may be missing; `None` keeps the key but marks it unset.
  pub fn set_opt<V: Into<ParamValue>>(&mut self, key: &str, value: Option<V>) {
    self.fields.insert(key.to_string(), value.map(Into::into));
  }

  pub fn remove(&mut self, key: &str) {
    self.fields.remove(key);
  }

  /// Effective value of a field.
  pub fn get(&self, key: &str) -> Option<&ParamValue> {
    self.fields.get(key)?.as_ref()?.effective()
  }

  /// Effective (non-empty, non-transient) fields in key order.
  pub fn effective(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
    self
      .fields
      .iter()
      .filter(|(k, _)| !TRANSIENT_KEYS.contains(&k.as_str()))
      .filter_map(|(k, v)| v.as_ref()?.effective().map(|v| (k.as_str(), v)))
  }

  /// Compare against previously used parameters over the union of keys.
  ///
  /// Keys missing on one side and empty on the other are equal; two set but
  /// different values never are.
  pub fn matches(&self, other: &QueryParams) -> bool {
    let keys: BTreeSet<&str> = self
      .fields
      .keys()
      .chain(other.fields.keys())
      .map(String::as_str)
      .filter(|k| !TRANSIENT_KEYS.contains(k))
      .collect();

    keys.into_iter().all(|k| self.get(k) == other.get(k))
  }

  /// Canonical signature of the effective fields.
  pub fn signature(&self) -> Signature {
    Signature {
      fields: self
        .effective()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect(),
    }
  }

  /// Query-string pairs for the effective fields.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    self
      .effective()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }
}

/// Canonical, order-independent representation of a query's effective
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
  fields: BTreeMap<String, ParamValue>,
}

impl Signature {
  /// The signature of a parameterless request.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn get(&self, key: &str) -> Option<&ParamValue> {
    self.fields.get(key)
  }

  /// Stable fixed-length hash, used for coalescing and storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for (k, v) in &self.fields {
      if !first {
        f.write_str("&")?;
      }
      first = false;
      // Tag the variant so Int(1) and Text("1") never collide.
      match v {
        ParamValue::Int(n) => write!(f, "{}=#{}", k, n)?,
        ParamValue::Text(s) => write!(f, "{}={:?}", k, s)?,
      }
    }
    Ok(())
  }
}

impl From<&QueryParams> for Signature {
  fn from(params: &QueryParams) -> Self {
    params.signature()
  }
}

/// Every filter a list view recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilters {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub company_name: Option<String>,
  pub industry: Option<String>,
  pub sub_industry: Option<String>,
  pub country: Option<String>,
  pub state: Option<String>,
  pub revenue: Option<String>,
  pub employee_size: Option<String>,
  pub technology: Option<String>,
}

impl Default for ListFilters {
  fn default() -> Self {
    Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
  }
}

impl ListFilters {
  pub fn new(page: u32, limit: u32) -> Self {
    Self {
      page: Some(page),
      limit: Some(limit),
      search: None,
      company_name: None,
      industry: None,
      sub_industry: None,
      country: None,
      state: None,
      revenue: None,
      employee_size: None,
      technology: None,
    }
  }

  /// Set a filter by its wire name. Returns false for unknown names.
  pub fn set_field(&mut self, name: &str, value: Option<String>) -> bool {
    let slot = match name {
      "search" => &mut self.search,
      "companyName" => &mut self.company_name,
      "industry" => &mut self.industry,
      "subIndustry" => &mut self.sub_industry,
      "country" => &mut self.country,
      "state" => &mut self.state,
      "revenue" => &mut self.revenue,
      "employeeSize" => &mut self.employee_size,
      "technology" => &mut self.technology,
      _ => return false,
    };
    *slot = value;
    true
  }

  /// True when nothing but pagination is set.
  pub fn has_only_defaults(&self) -> bool {
    let defaults = Self::new(
      self.page.unwrap_or(DEFAULT_PAGE),
      self.limit.unwrap_or(DEFAULT_LIMIT),
    );
    self.to_params().signature() == defaults.to_params().signature()
  }

  pub fn to_params(&self) -> QueryParams {
    let mut params = QueryParams::new();
    params.set_opt("page", self.page);
    params.set_opt("limit", self.limit);
    params.set_opt("search", self.search.clone());
    params.set_opt("companyName", self.company_name.clone());
    params.set_opt("industry", self.industry.clone());
    params.set_opt("subIndustry", self.sub_industry.clone());
    params.set_opt("country", self.country.clone());
    params.set_opt("state", self.state.clone());
    params.set_opt("revenue", self.revenue.clone());
    params.set_opt("employeeSize", self.employee_size.clone());
    params.set_opt("technology", self.technology.clone());
    params
  }

  pub fn signature(&self) -> Signature {
    self.to_params().signature()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extra_empty_keys_do_not_break_equality() {
    let a = QueryParams::new()
      .with("page", 1u32)
      .with("limit", 25u32)
      .with("industry", "");
    let mut b = QueryParams::new().with("limit", 25u32).with("page", 1u32);
    b.set_opt::<String>("search", None);

    assert!(a.matches(&b));
    assert!(b.matches(&a));
    assert_eq!(a.signature(), b.signature());
    assert_eq!(a.signature().cache_hash(), b.signature().cache_hash());
  }

  #[test]
  fn test_differing_values_break_equality() {
    let a = QueryParams::new().with("page", 1u32).with("search", "acme");
    let b = QueryParams::new().with("page", 1u32).with("search", "acm");

    assert!(!a.matches(&b));
    assert_ne!(a.signature(), b.signature());
  }

  #[test]
  fn test_zero_is_significant() {
    let zero = QueryParams::new().with("page", 0u32);
    let unset = QueryParams::new();

    assert!(!zero.matches(&unset));
    assert_ne!(zero.signature(), unset.signature());
  }

  #[test]
  fn test_transient_keys_ignored() {
    let a = QueryParams::new().with("page", 2u32).with("background", 1i64);
    let b = QueryParams::new().with("page", 2u32);

    assert!(a.matches(&b));
    assert_eq!(a.signature(), b.signature());
    assert!(a.query_pairs().iter().all(|(k, _)| k != "background"));
  }

  #[test]
  fn test_text_and_number_do_not_collide() {
    let a = QueryParams::new().with("page", 1u32);
    let b = QueryParams::new().with("page", "1");

    assert_ne!(a.signature(), b.signature());
    assert_ne!(a.signature().cache_hash(), b.signature().cache_hash());
  }

  #[test]
  fn test_query_pairs_skip_empty() {
    let mut filters = ListFilters::new(3, 50);
    filters.search = Some(String::new());
    filters.revenue = Some("$1M - $50M".to_string());

    let pairs = filters.to_params().query_pairs();
    assert_eq!(
      pairs,
      vec![
        ("limit".to_string(), "50".to_string()),
        ("page".to_string(), "3".to_string()),
        ("revenue".to_string(), "$1M - $50M".to_string()),
      ]
    );
  }

  #[test]
  fn test_has_only_defaults() {
    let mut filters = ListFilters::new(4, 10);
    assert!(filters.has_only_defaults());

    filters.industry = Some(String::new());
    assert!(filters.has_only_defaults());

    assert!(filters.set_field("industry", Some("Software".into())));
    assert!(!filters.has_only_defaults());
    assert!(!filters.set_field("unknown", None));
  }
}
