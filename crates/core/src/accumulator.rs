//! Paginated result accumulation for a single parameter snapshot.
//!
//! A [`ResultAccumulator`] is an immutable list of pages fetched under one
//! snapshot. Loading returns a new accumulator with the fetched pages appended;
//! the old one is left intact, so a failed load never leaves partial state behind.
//!
//! ### Page arithmetic
//!
//! - `next_page_id = item_count / page_size + 1`
//! - `skip_next_page_items = item_count % page_size`
//!
//! After a refinement drops items, the next fetch asks the remote (which filters
//! with the new parameters) for the page containing the first item not yet held,
//! and skips the ones already buffered.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use futures::future::try_join_all;

use crate::page::decode_requested_page;
use crate::{Error, ItemDecoder, Page, PageQuery, ParameterSnapshot, Transport, refine_page};

/// Default number of concurrent fetches for [`ResultAccumulator::load_all_pages`].
pub const DEFAULT_MAX_PARALLEL: usize = 5;

/// Receives every accumulator produced by a successful load.
pub(crate) trait ResultSink<T>: Send + Sync {
    /// Returns whether the accumulator became the current result.
    fn update_result(&self, result: &ResultAccumulator<T>) -> bool;
}

/// Collaborators shared by every accumulator of a session.
pub(crate) struct Context<T> {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) decoder: ItemDecoder<T>,
    pub(crate) page_size: usize,
    pub(crate) sink: Option<Weak<dyn ResultSink<T>>>,
}

/// Pages fetched under one snapshot, in fetch order.
pub struct ResultAccumulator<T> {
    context: Arc<Context<T>>,
    parameters: ParameterSnapshot<T>,
    pages: Vec<Arc<Page<T>>>,
    items: Arc<OnceLock<Vec<T>>>,
}

impl<T> Clone for ResultAccumulator<T> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            parameters: self.parameters.clone(),
            pages: self.pages.clone(),
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> ResultAccumulator<T> {
    pub(crate) fn with_context(context: Arc<Context<T>>, parameters: ParameterSnapshot<T>) -> Self {
        Self { context, parameters, pages: Vec::new(), items: Arc::new(OnceLock::new()) }
    }

    pub fn parameters(&self) -> &ParameterSnapshot<T> {
        &self.parameters
    }

    pub fn pages(&self) -> &[Arc<Page<T>>] {
        &self.pages
    }

    pub fn page_size(&self) -> usize {
        self.context.page_size
    }

    /// Whether this accumulator was produced under `context`.
    pub(crate) fn belongs_to(&self, context: &Arc<Context<T>>) -> bool {
        Arc::ptr_eq(&self.context, context)
    }

    /// Number of buffered items, without materialising them.
    pub fn item_count(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    pub fn next_page_id(&self) -> u64 {
        (self.item_count() / self.context.page_size) as u64 + 1
    }

    pub fn skip_next_page_items(&self) -> usize {
        self.item_count() % self.context.page_size
    }

    /// False until a page flagged as last has been appended.
    pub fn has_last_page(&self) -> bool {
        self.pages.last().is_some_and(|p| p.is_last_page)
    }
}

impl<T: Clone + Send + Sync + 'static> ResultAccumulator<T> {
    /// Accumulator not attached to any session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `page_size` is 0.
    pub fn new(
        transport: Arc<dyn Transport>, decoder: ItemDecoder<T>, page_size: usize, parameters: ParameterSnapshot<T>,
    ) -> Result<Self, Error> {
        if page_size == 0 {
            return Err(Error::Configuration("page_size must be greater than 0".into()));
        }
        let context = Arc::new(Context { transport, decoder, page_size, sink: None });
        Ok(Self::with_context(context, parameters))
    }

    /// All buffered items in fetch order. Computed once per accumulator.
    pub fn items(&self) -> &[T] {
        self.items
            .get_or_init(|| self.pages.iter().flat_map(|p| p.items.iter().cloned()).collect())
    }

    /// Fetch the next page. Returns an unchanged copy once the last page is held.
    pub async fn load_next_page(&self) -> Result<Self, Error> {
        self.load_next_n_pages(1).await
    }

    /// Fetch the next `n` pages concurrently and append them in page-id order.
    ///
    /// Pages past the first one flagged as last are discarded. Any failure fails
    /// the whole call and nothing is appended.
    pub async fn load_next_n_pages(&self, n: usize) -> Result<Self, Error> {
        if n == 0 || self.has_last_page() {
            return Ok(self.clone());
        }

        let first = self.next_page_id();
        let skip = self.skip_next_page_items();

        tracing::debug!(first_page = first, count = n, skip, params = %self.parameters, "loading pages");

        let fetches = (0..n as u64).map(|offset| self.fetch(first + offset, if offset == 0 { skip } else { 0 }));
        let fetched = try_join_all(fetches).await?;

        let mut pages = Vec::with_capacity(fetched.len());
        for page in fetched {
            let is_last_page = page.is_last_page;
            pages.push(page);
            if is_last_page {
                break;
            }
        }

        let next = self.append(pages);
        self.commit(&next);
        Ok(next)
    }

    /// Keep loading `max_parallel` pages at a time until the last page is held.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `max_parallel` is 0, otherwise the first
    /// load error. Rounds completed before the error have already been committed.
    pub async fn load_all_pages(&self, max_parallel: usize) -> Result<Self, Error> {
        if max_parallel == 0 {
            return Err(Error::Configuration("max_parallel must be at least 1".into()));
        }

        let mut current = self.clone();
        while !current.has_last_page() {
            current = current.load_next_n_pages(max_parallel).await?;
        }
        Ok(current)
    }

    /// Narrow every buffered page to `snapshot`. No network access.
    ///
    /// # Errors
    ///
    /// Returns `Error::RefinementViolation` if `snapshot` does not refine this
    /// accumulator's parameters.
    pub fn refine(&self, snapshot: &ParameterSnapshot<T>) -> Result<Self, Error> {
        if !snapshot.is_refinement_of(&self.parameters) {
            return Err(Error::RefinementViolation {
                target: self.parameters.to_string(),
                candidate: snapshot.to_string(),
            });
        }

        let pages = self
            .pages
            .iter()
            .map(|page| refine_page(page, snapshot).map(Arc::new))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            context: Arc::clone(&self.context),
            parameters: snapshot.clone(),
            pages,
            items: Arc::new(OnceLock::new()),
        })
    }

    async fn fetch(&self, page_id: u64, skip: usize) -> Result<Page<T>, Error> {
        let query = PageQuery {
            params: self.parameters.values_to_string_map(),
            page_id,
            page_size: self.context.page_size,
        };

        let raw = self
            .context
            .transport
            .fetch_page(&query)
            .await
            .map_err(Error::Transport)?;

        decode_requested_page(raw, page_id, &self.parameters, &self.context.decoder, skip)
    }

    fn append(&self, pages: Vec<Page<T>>) -> Self {
        let mut all = self.pages.clone();
        all.extend(pages.into_iter().map(Arc::new));
        Self {
            context: Arc::clone(&self.context),
            parameters: self.parameters.clone(),
            pages: all,
            items: Arc::new(OnceLock::new()),
        }
    }

    fn commit(&self, next: &Self) {
        if let Some(sink) = self.context.sink.as_ref().and_then(Weak::upgrade) {
            sink.update_result(next);
        }
    }
}

impl<T: PartialEq> PartialEq for ResultAccumulator<T> {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
            && self.pages.len() == other.pages.len()
            && self.pages.iter().zip(&other.pages).all(|(a, b)| a == b)
    }
}

impl<T> fmt::Debug for ResultAccumulator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAccumulator")
            .field("parameters", &self.parameters)
            .field("pages", &self.pages.len())
            .field("items", &self.item_count())
            .field("has_last_page", &self.has_last_page())
            .finish()
    }
}
