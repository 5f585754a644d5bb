//! Error kinds for the query layer.
//!
//! Remote failures (`FetchError`) are attached to a resource's state and never
//! replace cached data. Caller mistakes (`QueryError`) are reported
//! synchronously, before any network call.

use std::time::Duration;

use thiserror::Error;

/// A failed network operation. Cloneable because every coalesced caller
/// observes the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// The request never reached the server, or no response came back.
  #[error("Network error. Please check your connection.")]
  Network(String),

  /// Non-2xx response with a server-supplied message.
  #[error("{message}")]
  Server { status: u16, message: String },

  /// The fixed per-call deadline expired.
  #[error("Request timed out after {}ms", .0.as_millis())]
  Timeout(Duration),
}

impl FetchError {
  /// The message surfaced to consumers as `{ message }`.
  pub fn message(&self) -> String {
    self.to_string()
  }
}

/// Fatal errors raised before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
  #[error("Invalid resource identifier: {0:?}")]
  InvalidResource(String),

  #[error("Resource {id} is {actual}, expected {expected}")]
  KindMismatch {
    id: String,
    expected: &'static str,
    actual: &'static str,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    assert_eq!(
      FetchError::Network("connection refused".into()).message(),
      "Network error. Please check your connection."
    );
    assert_eq!(
      FetchError::Server {
        status: 500,
        message: "Failed to fetch companies".into()
      }
      .message(),
      "Failed to fetch companies"
    );
    assert_eq!(
      FetchError::Timeout(Duration::from_secs(30)).message(),
      "Request timed out after 30000ms"
    );
  }
}
