//! Search sessions: a stack of cached results under successively refined parameters.
//!
//! The bottom of the stack always holds the empty snapshot and every entry refines
//! the one below it. Editing a parameter pops every entry the new snapshot does not
//! refine, then pushes a refinement of what is left. Narrowing edits therefore reuse
//! every page fetched so far, while any other edit falls back to the nearest entry
//! it still refines.
//!
//! Loads complete asynchronously. A finished load is committed back through
//! [`SearchSession::update_result`] and only becomes current if its snapshot is
//! still at the top of the stack.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::accumulator::{Context, ResultSink};
use crate::{AppConfig, DescriptorSet, Error, ItemDecoder, ParameterSnapshot, ResultAccumulator, Transport};

/// Static settings of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub page_size: usize,
    pub max_parallel: usize,
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::from(&config)
    }
}

impl From<&AppConfig> for SessionOptions {
    fn from(config: &AppConfig) -> Self {
        Self { page_size: config.page_size, max_parallel: config.max_parallel, event_capacity: config.event_capacity }
    }
}

/// Owns the result stack and notifies subscribers when the current result changes.
pub struct SearchSession<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SearchSession<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

struct Shared<T> {
    descriptors: Arc<DescriptorSet<T>>,
    context: Arc<Context<T>>,
    options: SessionOptions,
    state: Mutex<State<T>>,
}

struct State<T> {
    stack: Vec<ResultAccumulator<T>>,
    results: Option<broadcast::Sender<ResultAccumulator<T>>>,
    resets: Option<broadcast::Sender<SearchSession<T>>>,
}

impl<T: Clone + Send + Sync + 'static> SearchSession<T> {
    /// Create a session with default options and the given page size.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `page_size` is 0.
    pub fn new(
        descriptors: Arc<DescriptorSet<T>>, transport: Arc<dyn Transport>, decoder: ItemDecoder<T>, page_size: usize,
    ) -> Result<Self, Error> {
        let options = SessionOptions { page_size, ..Default::default() };
        Self::with_options(descriptors, transport, decoder, options)
    }

    /// Create a session sized from application configuration.
    pub fn from_config(
        descriptors: Arc<DescriptorSet<T>>, transport: Arc<dyn Transport>, decoder: ItemDecoder<T>,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Self::with_options(descriptors, transport, decoder, SessionOptions::from(config))
    }

    pub fn with_options(
        descriptors: Arc<DescriptorSet<T>>, transport: Arc<dyn Transport>, decoder: ItemDecoder<T>,
        options: SessionOptions,
    ) -> Result<Self, Error> {
        if options.page_size == 0 {
            return Err(Error::Configuration("page_size must be greater than 0".into()));
        }
        if options.max_parallel == 0 {
            return Err(Error::Configuration("max_parallel must be at least 1".into()));
        }
        if options.event_capacity == 0 {
            return Err(Error::Configuration("event_capacity must be greater than 0".into()));
        }

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| {
            let sink: Weak<dyn ResultSink<T>> = weak.clone();
            let context = Arc::new(Context { transport, decoder, page_size: options.page_size, sink: Some(sink) });
            let initial = ResultAccumulator::with_context(
                Arc::clone(&context),
                ParameterSnapshot::empty(Arc::clone(&descriptors)),
            );
            let (results, _) = broadcast::channel(options.event_capacity);
            let (resets, _) = broadcast::channel(options.event_capacity);

            Shared {
                descriptors,
                context,
                options,
                state: Mutex::new(State { stack: vec![initial], results: Some(results), resets: Some(resets) }),
            }
        });

        Ok(Self { shared })
    }

    /// The current result (top of the stack).
    pub fn result(&self) -> ResultAccumulator<T> {
        self.shared.state.lock().top().clone()
    }

    /// The parameters of the current result.
    pub fn parameters(&self) -> ParameterSnapshot<T> {
        self.shared.state.lock().top().parameters().clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.shared.state.lock().top().parameters().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.shared.state.lock().top().parameters().has(name)
    }

    pub fn page_size(&self) -> usize {
        self.shared.options.page_size
    }

    pub fn options(&self) -> SessionOptions {
        self.shared.options
    }

    pub fn descriptors(&self) -> &Arc<DescriptorSet<T>> {
        &self.shared.descriptors
    }

    pub fn stack_depth(&self) -> usize {
        self.shared.state.lock().stack.len()
    }

    /// Query string of every stack entry, bottom first.
    pub fn param_strings(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .stack
            .iter()
            .map(|entry| entry.parameters().to_query_string())
            .collect()
    }

    /// Set `name` to `value` and rebuild the stack.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an unknown parameter and
    /// `Error::Disposed` after [`dispose`](Self::dispose).
    pub fn set_param_value(&self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return Err(Error::Disposed);
        }
        let next = state.top().parameters().set(name, value)?;
        state.rebuild(next)
    }

    /// Unset `name` and rebuild the stack.
    ///
    /// # Errors
    ///
    /// Same as [`set_param_value`](Self::set_param_value).
    pub fn delete_param_value(&self, name: &str) -> Result<(), Error> {
        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return Err(Error::Disposed);
        }
        let next = state.top().parameters().delete(name)?;
        state.rebuild(next)
    }

    /// Offer a loaded accumulator to the stack.
    ///
    /// The entry with equal parameters is replaced. Subscribers are notified only
    /// when that entry is the top; a result whose snapshot was popped by a later
    /// edit is ignored, as is one loaded outside this session (different page
    /// size, transport or decoder). Returns whether the result became current.
    pub fn update_result(&self, result: &ResultAccumulator<T>) -> bool {
        self.shared.update_result(result)
    }

    /// Load the next page of the current result.
    pub async fn load_next_page(&self) -> Result<ResultAccumulator<T>, Error> {
        let current = self.result();
        current.load_next_page().await
    }

    /// Load the next `n` pages of the current result concurrently.
    pub async fn load_next_n_pages(&self, n: usize) -> Result<ResultAccumulator<T>, Error> {
        let current = self.result();
        current.load_next_n_pages(n).await
    }

    /// Load every remaining page of the current result, `max_parallel` at a time.
    pub async fn load_all_pages(&self) -> Result<ResultAccumulator<T>, Error> {
        let current = self.result();
        current.load_all_pages(self.shared.options.max_parallel).await
    }

    /// Receiver of every accepted change of the current result.
    ///
    /// Closed once the session is disposed.
    pub fn subscribe_results(&self) -> broadcast::Receiver<ResultAccumulator<T>> {
        match &self.shared.state.lock().results {
            Some(tx) => tx.subscribe(),
            None => closed_receiver(),
        }
    }

    /// Receiver of the sessions created by [`reset`](Self::reset).
    pub fn subscribe_resets(&self) -> broadcast::Receiver<SearchSession<T>> {
        match &self.shared.state.lock().resets {
            Some(tx) => tx.subscribe(),
            None => closed_receiver(),
        }
    }

    /// A fresh session with the same descriptors, transport, decoder and options.
    ///
    /// Nothing cached here is carried over. The new session is announced to
    /// reset subscribers of this one.
    ///
    /// # Errors
    ///
    /// Returns `Error::Disposed` after [`dispose`](Self::dispose).
    pub fn reset(&self) -> Result<SearchSession<T>, Error> {
        let state = self.shared.state.lock();
        if state.is_disposed() {
            return Err(Error::Disposed);
        }

        let fresh = Self::with_options(
            Arc::clone(&self.shared.descriptors),
            Arc::clone(&self.shared.context.transport),
            Arc::clone(&self.shared.context.decoder),
            self.shared.options,
        )?;

        tracing::debug!(discarded_depth = state.stack.len(), "session reset");
        if let Some(tx) = &state.resets {
            let _ = tx.send(fresh.clone());
        }
        Ok(fresh)
    }

    /// Close both notification streams. Later edits fail and later loads are not
    /// committed.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        state.results = None;
        state.resets = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().is_disposed()
    }
}

impl<T: Clone + Send + Sync + 'static> ResultSink<T> for Shared<T> {
    fn update_result(&self, result: &ResultAccumulator<T>) -> bool {
        if !result.belongs_to(&self.context) {
            tracing::warn!(params = %result.parameters(), "rejecting result loaded outside this session");
            return false;
        }

        let mut state = self.state.lock();
        if state.is_disposed() {
            return false;
        }

        let Some(index) = state.stack.iter().rposition(|e| e.parameters() == result.parameters()) else {
            tracing::debug!(params = %result.parameters(), "dropping result for a discarded snapshot");
            return false;
        };

        state.stack[index] = result.clone();
        if index + 1 == state.stack.len() {
            tracing::debug!(params = %result.parameters(), items = result.item_count(), "current result updated");
            state.notify();
            true
        } else {
            tracing::trace!(params = %result.parameters(), depth = index, "cached result updated below top");
            false
        }
    }
}

impl<T: Clone + Send + Sync + 'static> State<T> {
    fn top(&self) -> &ResultAccumulator<T> {
        // The bottom entry is never popped: every snapshot refines the empty one.
        &self.stack[self.stack.len() - 1]
    }

    fn is_disposed(&self) -> bool {
        self.results.is_none()
    }

    fn rebuild(&mut self, next: ParameterSnapshot<T>) -> Result<(), Error> {
        let depth = self.stack.len();
        while self.stack.len() > 1 && !next.is_refinement_of(self.top().parameters()) {
            self.stack.pop();
        }
        let popped = depth - self.stack.len();

        if self.top().parameters() == &next {
            tracing::trace!(params = %next, popped, "parameters unchanged after rebuild");
            if popped > 0 {
                self.notify();
            }
            return Ok(());
        }

        let refined = self.top().refine(&next)?;
        self.stack.push(refined);
        tracing::trace!(params = %next, popped, depth = self.stack.len(), "pushed refined result");
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        if let Some(tx) = &self.results {
            let _ = tx.send(self.top().clone());
        }
    }
}

fn closed_receiver<E: Clone>() -> broadcast::Receiver<E> {
    let (_, rx) = broadcast::channel(1);
    rx
}

impl<T> fmt::Debug for SearchSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}
