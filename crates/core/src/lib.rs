//! Core types for sift.
//!
//! This crate provides:
//! - Parameter descriptors and immutable parameter snapshots with refinement
//! - Page decoding and refinement
//! - Result accumulators that buffer pages per snapshot
//! - Search sessions that keep a stack of cached, successively refined results
//! - Unified error types and layered configuration

pub mod accumulator;
pub mod config;
pub mod error;
pub mod page;
pub mod params;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{DEFAULT_MAX_PARALLEL, ResultAccumulator};
pub use config::{AppConfig, ConfigError};
pub use error::{BoxError, Error};
pub use page::{Page, decode_page, refine_page};
pub use params::{DescriptorSet, ParamDescriptor, ParameterSnapshot};
pub use session::{SearchSession, SessionOptions};
pub use transport::{ItemDecoder, PageQuery, Transport, serde_decoder};
