//! Data-access layer for a nonprofit's volunteer and donation site.
//!
//! - [`client::ApiClient`] sends JSON requests with auth, per-attempt
//!   timeouts, error classification and exponential-backoff retries
//! - [`cache::TtlCache`] holds responses for a time-to-live under an LRU bound
//! - [`query::Query`] ties an operation to the cache, the network status and
//!   the retry policy, and tracks data/loading/error
//! - [`context::AppContext`] owns the shared state and the cache sweep
//! - [`api::NonprofitApi`] is the typed client for the site's endpoints

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod network;
pub mod notify;
pub mod query;
pub mod retry;
pub mod storage;
pub mod transport;

pub use client::{ApiClient, RequestOptions};
pub use context::AppContext;
pub use error::{ApiError, ErrorKind};
pub use query::{Query, QueryOptions, RequestState};
