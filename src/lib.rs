//! Client-side query cache and fetch coordination.
//!
//! A [`client::QueryClient`] keeps the most recent result per resource,
//! decides from navigation and query signatures whether a refetch is needed,
//! merges identical in-flight requests, and commits results in relevance
//! order so a slow stale response never overwrites a newer one.

pub mod accumulate;
pub mod cache;
pub mod client;
pub mod coalesce;
pub mod config;
pub mod debounce;
pub mod error;
pub mod http;
pub mod params;
pub mod policy;
pub mod query;
pub mod resource;
pub mod source;
pub mod types;
pub mod view;

#[cfg(test)]
mod testing;
