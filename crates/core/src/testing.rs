//! Test fixtures: a tiny item type and an in-memory paginated remote.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{BoxError, DescriptorSet, ItemDecoder, PageQuery, ParamDescriptor, Transport, serde_decoder};

pub const FIXTURE: &[&str] = &["a", "abcd", "abcdefghi", "abc", "ab", "abcd", "abcdef", "abcdefg"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub a: String,
}

pub fn item(a: &str) -> Item {
    Item { a: a.to_string() }
}

pub fn items(values: &[&str]) -> Vec<Item> {
    values.iter().map(|a| item(a)).collect()
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack.as_str(), needle.as_str()) {
        (Some(h), Some(n)) => h.contains(n),
        _ => false,
    }
}

/// `a`: substring match, refinement by containment. `n`: defaults only.
pub fn descriptors() -> Arc<DescriptorSet<Item>> {
    Arc::new(DescriptorSet::new([
        ParamDescriptor::new("a").matcher(contains),
        ParamDescriptor::new("n"),
    ]))
}

pub fn decoder() -> ItemDecoder<Item> {
    serde_decoder()
}

/// Remote that filters `a` by substring and paginates server-side.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    data: Vec<String>,
    fetches: AtomicUsize,
    completed: Mutex<Vec<u64>>,
    failing: Mutex<HashSet<u64>>,
    malformed: Mutex<HashSet<u64>>,
    reverse_delays: bool,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self { data: FIXTURE.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    /// Later page ids answer sooner.
    pub fn with_reverse_delays(mut self) -> Self {
        self.reverse_delays = true;
        self
    }

    pub fn fail_page(&self, page_id: u64) {
        self.failing.lock().insert(page_id);
    }

    /// Answer `page_id` without its last-page flag.
    pub fn malform_page(&self, page_id: u64) {
        self.malformed.lock().insert(page_id);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        self.malformed.lock().clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn completion_order(&self) -> Vec<u64> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Value, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.reverse_delays {
            let delay = 10u64.saturating_sub(query.page_id) * 15;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.failing.lock().contains(&query.page_id) {
            return Err(format!("page {} unavailable", query.page_id).into());
        }

        let filtered: Vec<&String> = self
            .data
            .iter()
            .filter(|a| query.params.get("a").is_none_or(|needle| a.contains(needle.as_str())))
            .collect();

        let start = (query.page_id as usize - 1) * query.page_size;
        let page: Vec<Value> = filtered
            .iter()
            .skip(start)
            .take(query.page_size)
            .map(|a| json!({ "a": a }))
            .collect();
        let is_last_page = start + query.page_size >= filtered.len();

        self.completed.lock().push(query.page_id);

        if self.malformed.lock().contains(&query.page_id) {
            return Ok(json!({ "items": page, "pageId": query.page_id }));
        }
        Ok(json!({ "items": page, "pageId": query.page_id, "isLastPage": is_last_page }))
    }
}
