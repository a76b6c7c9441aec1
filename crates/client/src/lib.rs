//! Client code for sift.
//!
//! This crate provides concrete [`Transport`](sift_core::Transport)
//! implementations: an HTTP transport for JSON page endpoints and a TTL cache
//! that can wrap any transport.

pub mod cache;
pub mod http;

pub use cache::{CachingTransport, cache_key};
pub use http::{HttpConfig, HttpError, HttpTransport, build_url};
