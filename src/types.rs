//! Domain types served by the backend.

use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// A company row from `/admin/companies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
  #[serde(alias = "_id")]
  pub id: String,
  pub company_name: String,
  #[serde(default)]
  pub industry: Option<String>,
  #[serde(default)]
  pub sub_industry: Option<String>,
  #[serde(default)]
  pub country: Option<String>,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub city: Option<String>,
  #[serde(default)]
  pub website: Option<String>,
  #[serde(default)]
  pub revenue: Option<String>,
  #[serde(default)]
  pub employee_size: Option<String>,
  #[serde(default)]
  pub technology: Option<String>,
}

impl Cacheable for Company {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn label(&self) -> &str {
    &self.company_name
  }

  fn entity_type() -> &'static str {
    "company"
  }
}

/// Company names only, for autocomplete corpora. Deduplicated by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyName {
  pub company_name: String,
}

impl Cacheable for CompanyName {
  fn cache_key(&self) -> String {
    self.company_name.clone()
  }

  fn label(&self) -> &str {
    &self.company_name
  }

  fn entity_type() -> &'static str {
    "company_name"
  }
}

/// An entry of the `/common/countries` reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
  #[serde(rename = "_id", alias = "id", default)]
  pub id: Option<String>,
  pub name: String,
  #[serde(default)]
  pub code: Option<String>,
}

impl Cacheable for Country {
  fn cache_key(&self) -> String {
    self
      .code
      .clone()
      .or_else(|| self.id.clone())
      .unwrap_or_else(|| self.name.clone())
  }

  fn label(&self) -> &str {
    &self.name
  }

  fn entity_type() -> &'static str {
    "country"
  }
}
