//! Page request URL construction and validation.

use sift_core::PageQuery;
use url::Url;

use crate::http::HttpError;

/// Build the URL for one page request.
///
/// The endpoint's own query string is kept; the set parameters follow in name
/// order, then the page id and page size.
///
/// # Errors
///
/// Returns `HttpError::InvalidUrl` if the endpoint does not parse, is not
/// http(s), or a search parameter collides with the paging parameters.
pub fn build_url(
    endpoint: &str, query: &PageQuery, page_param: &str, page_size_param: &str,
) -> Result<Url, HttpError> {
    let mut url = Url::parse(endpoint.trim()).map_err(|e| HttpError::InvalidUrl(format!("{endpoint}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpError::InvalidUrl(format!("unsupported scheme: {}", url.scheme())));
    }

    for reserved in [page_param, page_size_param] {
        if query.params.contains_key(reserved) {
            return Err(HttpError::InvalidUrl(format!(
                "search parameter '{reserved}' collides with a paging parameter"
            )));
        }
    }

    url.set_fragment(None);
    {
        let mut pairs = url.query_pairs_mut();
        pairs.extend_pairs(&query.params);
        pairs.append_pair(page_param, &query.page_id.to_string());
        pairs.append_pair(page_size_param, &query.page_size.to_string());
    }

    Ok(url)
}
