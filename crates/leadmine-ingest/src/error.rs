use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {host} (retry after {retry_after_secs}s)")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv_async::Error,
    },

    #[error("pagination limit reached for {url}: exceeded {max_pages} pages")]
    PaginationLimit { url: String, max_pages: usize },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid source configuration: {reason}")]
    InvalidSourceConfig { reason: String },

    #[error("storage collaborator error: {0}")]
    Store(String),
}

impl IngestError {
    /// Returns `true` if the error represents a transient condition worth
    /// retrying after a backoff delay: HTTP 429, a 5xx status, or a
    /// network-level failure (connection reset, timeout).
    ///
    /// Everything else (404, 4xx, parse failures, configuration errors) is
    /// propagated immediately — retrying would return the same result.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            IngestError::RateLimited { .. } | IngestError::Http(_) | IngestError::Timeout { .. } => {
                true
            }
            IngestError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_transient() {
        let err = IngestError::RateLimited {
            host: "data.example.gouv.fr".to_owned(),
            retry_after_secs: 2,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = IngestError::UpstreamStatus {
            status: 503,
            url: "https://example.test/lines".to_owned(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        for status in [400, 403, 422] {
            let err = IngestError::UpstreamStatus {
                status,
                url: "https://example.test/lines".to_owned(),
            };
            assert!(!err.is_transient(), "status {status} should not retry");
        }
    }

    #[test]
    fn not_found_is_not_transient() {
        let err = IngestError::NotFound {
            url: "https://example.test/lines".to_owned(),
        };
        assert!(!err.is_transient());
    }
}
