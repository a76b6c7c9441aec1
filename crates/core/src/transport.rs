//! Seams to the outside world: page transport and item decoding.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::BoxError;

/// Everything a transport needs to fetch one page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageQuery {
    /// Encoded values of the set parameters only.
    pub params: BTreeMap<String, String>,
    /// 1-based page id.
    pub page_id: u64,
    pub page_size: usize,
}

/// Fetches raw pages from the remote collection.
///
/// A raw page is a JSON object with `items`, `pageId` and `isLastPage`.
/// Retries, authentication and URL construction are the transport's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, BoxError>;
}

#[async_trait]
impl<X: Transport + ?Sized> Transport for Arc<X> {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, BoxError> {
        (**self).fetch_page(query).await
    }
}

/// Turns one raw item into a `T`.
pub type ItemDecoder<T> = Arc<dyn Fn(Value) -> Result<T, BoxError> + Send + Sync>;

/// Decoder backed by `serde`.
pub fn serde_decoder<T: DeserializeOwned + 'static>() -> ItemDecoder<T> {
    Arc::new(|raw: Value| serde_json::from_value::<T>(raw).map_err(BoxError::from))
}
