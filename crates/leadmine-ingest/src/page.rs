//! Paginated record collection from upstream open-data APIs.
//!
//! Both paged sources answer with the same envelope:
//!
//! ```text
//! { "total": 123456, "results": [ { …record… }, … ] }
//! ```
//!
//! The collector walks pages until a page comes back shorter than the
//! requested size. Some upstreams refuse deep pagination with an HTTP 400
//! once the page window passes their result ceiling; that case truncates the
//! collection instead of failing the run.

use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::fetch::RateLimitedFetcher;

/// Maximum number of pages to fetch before returning an error.
/// Guards against an upstream that keeps returning full pages forever.
pub const MAX_PAGES: usize = 500;

/// How the page window is encoded in query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    /// `page=<1-based page>&size=<page size>`.
    PageNumber,
    /// `offset=<records skipped>&limit=<page size>`.
    Offset,
}

/// A paged query against one upstream endpoint.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub base_url: String,
    pub page_size: u32,
    pub style: PageStyle,
    /// Source-specific filter parameters appended to every page request.
    pub params: Vec<(String, String)>,
}

/// The outcome of draining a paged source.
#[derive(Debug)]
pub struct PageCollection {
    pub records: Vec<serde_json::Value>,
    pub pages_fetched: usize,
    /// `true` when the upstream pagination ceiling cut the collection short:
    /// the records gathered so far are kept and internally consistent, but
    /// the source holds more than could be read.
    pub truncated: bool,
}

/// Drives repeated fetches across pages until exhaustion or a known upstream
/// pagination ceiling.
pub struct PageCollector<'a> {
    fetcher: &'a RateLimitedFetcher,
    spec: PageSpec,
}

impl<'a> PageCollector<'a> {
    #[must_use]
    pub fn new(fetcher: &'a RateLimitedFetcher, spec: PageSpec) -> Self {
        Self { fetcher, spec }
    }

    /// Fetches every page of the source, in order.
    ///
    /// Termination:
    /// - a page with fewer records than `page_size` is the last page;
    /// - HTTP 404 means "zero results" for the requested window — an empty
    ///   page, not an error;
    /// - HTTP 400 after the first page is the documented pagination ceiling:
    ///   collection stops with `truncated = true` and a warning;
    /// - cancellation stops before the next page fetch, keeping what was
    ///   already collected.
    ///
    /// Any other failure is fatal: on the first page nothing usable exists
    /// yet, and on later pages a partial result of unknown completeness is
    /// unsafe to silently accept.
    ///
    /// # Errors
    ///
    /// Propagates [`IngestError`] from the fetcher as described above, or
    /// [`IngestError::PaginationLimit`] if the upstream keeps producing full
    /// pages past [`MAX_PAGES`].
    pub async fn collect_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PageCollection, IngestError> {
        let mut records: Vec<serde_json::Value> = Vec::new();
        let mut pages_fetched = 0usize;
        let mut truncated = false;

        loop {
            if pages_fetched >= MAX_PAGES {
                return Err(IngestError::PaginationLimit {
                    url: self.spec.base_url.clone(),
                    max_pages: MAX_PAGES,
                });
            }
            if cancel.is_cancelled() {
                tracing::warn!(
                    url = %self.spec.base_url,
                    pages_fetched,
                    "collection cancelled — keeping records gathered so far"
                );
                break;
            }

            let url = self.page_url(pages_fetched)?;
            let page = match self.fetcher.get_json(&url).await {
                Ok(value) => parse_results(&value, &url)?,
                Err(IngestError::NotFound { .. }) => {
                    // Zero results for the requested window.
                    break;
                }
                Err(IngestError::UpstreamStatus { status: 400, .. }) if pages_fetched > 0 => {
                    tracing::warn!(
                        url = %self.spec.base_url,
                        pages_fetched,
                        collected = records.len(),
                        "upstream pagination ceiling reached — truncating collection"
                    );
                    truncated = true;
                    break;
                }
                Err(err) => return Err(err),
            };

            pages_fetched += 1;
            let page_len = page.len();
            records.extend(page);

            if page_len < self.spec.page_size as usize {
                break;
            }
        }

        Ok(PageCollection {
            records,
            pages_fetched,
            truncated,
        })
    }

    /// Builds the URL for the page at `page_index` (0-based).
    fn page_url(&self, page_index: usize) -> Result<String, IngestError> {
        let mut url =
            reqwest::Url::parse(&self.spec.base_url).map_err(|e| IngestError::InvalidUrl {
                url: self.spec.base_url.clone(),
                reason: e.to_string(),
            })?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.spec.params {
                pairs.append_pair(key, value);
            }
            match self.spec.style {
                PageStyle::PageNumber => {
                    pairs.append_pair("page", &(page_index + 1).to_string());
                    pairs.append_pair("size", &self.spec.page_size.to_string());
                }
                PageStyle::Offset => {
                    let offset = page_index * self.spec.page_size as usize;
                    pairs.append_pair("offset", &offset.to_string());
                    pairs.append_pair("limit", &self.spec.page_size.to_string());
                }
            }
        }

        Ok(url.to_string())
    }
}

/// Extracts the `results` array from a page envelope.
fn parse_results(value: &serde_json::Value, url: &str) -> Result<Vec<serde_json::Value>, IngestError> {
    value
        .get("results")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .ok_or_else(|| IngestError::Deserialize {
            context: format!("page envelope from {url}"),
            source: <serde_json::Error as serde::de::Error>::custom("missing \"results\" array"),
        })
}
