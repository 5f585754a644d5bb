//! HTTP data source backed by reqwest.
//!
//! List endpoints answer `{ "<items>": [...], "pagination": {...} }`;
//! reference endpoints answer a bare array.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::params::QueryParams;
use crate::source::{DataSource, Page, Pagination};

pub const TOKEN_ENV: &str = "QUERYCACHE_API_TOKEN";

/// Talks to the backend API.
#[derive(Clone)]
pub struct HttpSource {
  client: Client,
  base: Url,
  timeout: Duration,
}

impl HttpSource {
  pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
      headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token))
          .map_err(|e| eyre!("Invalid API token: {}", e))?,
      );
    }

    let client = Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      timeout,
    })
  }

  /// Source authenticated with `QUERYCACHE_API_TOKEN`, if set.
  pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self> {
    let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
    Self::new(base_url, token.as_deref(), timeout)
  }

  /// `endpoint` appended to the base path, with effective params as the query.
  fn url(&self, endpoint: &str, params: &QueryParams) -> std::result::Result<Url, FetchError> {
    let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), endpoint);
    let mut url = Url::parse(&joined)
      .map_err(|e| FetchError::Network(format!("invalid URL {}: {}", joined, e)))?;
    let pairs = params.query_pairs();
    if !pairs.is_empty() {
      url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
  }

  fn get_json(&self, url: Url) -> BoxFuture<'static, std::result::Result<Value, FetchError>> {
    let client = self.client.clone();
    let timeout = self.timeout;
    async move {
      debug!(%url, "GET");
      let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

      let status = response.status();
      let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(e, timeout))?;

      if !status.is_success() {
        return Err(status_error(status, &body));
      }

      serde_json::from_slice(&body).map_err(|e| FetchError::Server {
        status: status.as_u16(),
        message: format!("Invalid response body: {}", e),
      })
    }
    .boxed()
  }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout(timeout)
  } else {
    FetchError::Network(e.to_string())
  }
}

/// Error for a non-2xx response, preferring the body's `message` field.
fn status_error(status: StatusCode, body: &[u8]) -> FetchError {
  let message = serde_json::from_slice::<Value>(body)
    .ok()
    .and_then(|v| v.get("message")?.as_str().map(str::to_string))
    .filter(|m| !m.is_empty())
    .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
  FetchError::Server {
    status: status.as_u16(),
    message,
  }
}

fn decode_error(e: impl std::fmt::Display) -> FetchError {
  FetchError::Server {
    status: 200,
    message: format!("Unexpected response shape: {}", e),
  }
}

/// Unwrap a `{ "data": {...} }` envelope if present.
fn unwrap_envelope(value: Value) -> Value {
  match value {
    Value::Object(mut map)
      if !map.contains_key("pagination") && map.get("data").is_some_and(Value::is_object) =>
    {
      map.remove("data").unwrap_or(Value::Null)
    }
    other => other,
  }
}

/// The one array-valued field of a list response.
fn take_items(map: &mut Map<String, Value>) -> std::result::Result<Value, FetchError> {
  let key = ["items", "data"]
    .iter()
    .map(|k| k.to_string())
    .find(|k| map.get(k).is_some_and(Value::is_array))
    .or_else(|| {
      map
        .iter()
        .find(|(_, v)| v.is_array())
        .map(|(k, _)| k.clone())
    })
    .ok_or_else(|| decode_error("no item list in response"))?;
  map.remove(&key).ok_or_else(|| decode_error("no item list in response"))
}

pub(crate) fn parse_page<T: DeserializeOwned>(
  value: Value,
) -> std::result::Result<Page<T>, FetchError> {
  let Value::Object(mut map) = unwrap_envelope(value) else {
    return Err(decode_error("expected an object"));
  };
  let pagination: Pagination = map
    .remove("pagination")
    .ok_or_else(|| decode_error("missing pagination"))
    .and_then(|p| serde_json::from_value(p).map_err(decode_error))?;
  let items = serde_json::from_value(take_items(&mut map)?).map_err(decode_error)?;
  Ok(Page { items, pagination })
}

pub(crate) fn parse_collection<T: DeserializeOwned>(
  value: Value,
) -> std::result::Result<Vec<T>, FetchError> {
  match unwrap_envelope(value) {
    array @ Value::Array(_) => serde_json::from_value(array).map_err(decode_error),
    Value::Object(mut map) => serde_json::from_value(take_items(&mut map)?).map_err(decode_error),
    _ => Err(decode_error("expected an array")),
  }
}

impl<T> DataSource<T> for HttpSource
where
  T: DeserializeOwned + Send + 'static,
{
  fn fetch_page(
    &self,
    endpoint: &str,
    params: &QueryParams,
  ) -> BoxFuture<'static, std::result::Result<Page<T>, FetchError>> {
    let request = self.url(endpoint, params).map(|url| self.get_json(url));
    async move { parse_page(request?.await?) }.boxed()
  }

  fn fetch_collection(
    &self,
    endpoint: &str,
  ) -> BoxFuture<'static, std::result::Result<Vec<T>, FetchError>> {
    let request = self
      .url(endpoint, &QueryParams::new())
      .map(|url| self.get_json(url));
    async move { parse_collection(request?.await?) }.boxed()
  }
}
