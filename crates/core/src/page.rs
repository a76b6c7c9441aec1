//! Decoded pages and the raw page decoder.

use serde_json::Value;

use crate::{Error, ItemDecoder, ParameterSnapshot};

/// One fetched, decoded and filtered batch of items.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub parameters: ParameterSnapshot<T>,
    pub items: Vec<T>,
    pub is_last_page: bool,
}

impl<T: PartialEq> PartialEq for Page<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_last_page == other.is_last_page && self.parameters == other.parameters && self.items == other.items
    }
}

/// Raw page fields, accepted in camelCase or snake_case.
struct RawPage {
    items: Vec<Value>,
    page_id: u64,
    is_last_page: bool,
}

impl RawPage {
    fn parse(raw: Value) -> Result<Self, Error> {
        let Value::Object(mut fields) = raw else {
            return Err(Error::DecodePayload("page is not an object".into()));
        };

        let items = match fields.remove("items") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(Error::DecodePayload("items is not an array".into())),
            None => return Err(Error::DecodePayload("missing items".into())),
        };

        let page_id = fields
            .get("pageId")
            .or_else(|| fields.get("page_id"))
            .ok_or_else(|| Error::DecodePayload("missing pageId".into()))?
            .as_u64()
            .ok_or_else(|| Error::DecodePayload("pageId is not a non-negative integer".into()))?;

        let is_last_page = fields
            .get("isLastPage")
            .or_else(|| fields.get("is_last_page"))
            .ok_or_else(|| Error::DecodePayload("missing isLastPage".into()))?
            .as_bool()
            .ok_or_else(|| Error::DecodePayload("isLastPage is not a boolean".into()))?;

        Ok(Self { items, page_id, is_last_page })
    }
}

/// Decode a raw page fetched under `snapshot`.
///
/// Items are re-checked against `snapshot` since the remote (or a cache in front
/// of it) may answer for a different parameter state. The first `skip` surviving
/// items are dropped.
///
/// # Errors
///
/// Returns `Error::DecodePayload` for a malformed page and `Error::ItemDecode`
/// when the decoder rejects an item.
pub fn decode_page<T>(
    raw: Value, snapshot: &ParameterSnapshot<T>, decoder: &ItemDecoder<T>, skip: usize,
) -> Result<Page<T>, Error> {
    decode_raw_page(RawPage::parse(raw)?, snapshot, decoder, skip)
}

/// Same as [`decode_page`], warning when the remote answers for another page id.
pub(crate) fn decode_requested_page<T>(
    raw: Value, page_id: u64, snapshot: &ParameterSnapshot<T>, decoder: &ItemDecoder<T>, skip: usize,
) -> Result<Page<T>, Error> {
    let raw = RawPage::parse(raw)?;
    if raw.page_id != page_id {
        tracing::warn!(requested = page_id, received = raw.page_id, "remote answered with a different page id");
    }
    decode_raw_page(raw, snapshot, decoder, skip)
}

fn decode_raw_page<T>(
    raw: RawPage, snapshot: &ParameterSnapshot<T>, decoder: &ItemDecoder<T>, skip: usize,
) -> Result<Page<T>, Error> {
    let decoded = raw
        .items
        .into_iter()
        .map(|raw_item| decoder(raw_item).map_err(Error::ItemDecode))
        .collect::<Result<Vec<T>, Error>>()?;
    let received = decoded.len();

    let matching: Vec<T> = decoded.into_iter().filter(|item| snapshot.matches(item)).collect();
    if matching.len() < received {
        tracing::debug!(
            page_id = raw.page_id,
            dropped = received - matching.len(),
            params = %snapshot,
            "remote returned items outside the current parameters"
        );
    }

    let items = matching.into_iter().skip(skip).collect();

    Ok(Page { parameters: snapshot.clone(), items, is_last_page: raw.is_last_page })
}

/// Narrow `page` to `snapshot` without re-decoding.
///
/// `is_last_page` is kept: narrowing only removes items, it cannot reveal more
/// remote data.
///
/// # Errors
///
/// Returns `Error::RefinementViolation` if `snapshot` does not refine the page's
/// parameters.
pub fn refine_page<T: Clone>(page: &Page<T>, snapshot: &ParameterSnapshot<T>) -> Result<Page<T>, Error> {
    if !snapshot.is_refinement_of(&page.parameters) {
        return Err(Error::RefinementViolation {
            target: page.parameters.to_string(),
            candidate: snapshot.to_string(),
        });
    }

    Ok(Page {
        parameters: snapshot.clone(),
        items: page.items.iter().filter(|item| snapshot.matches(item)).cloned().collect(),
        is_last_page: page.is_last_page,
    })
}
