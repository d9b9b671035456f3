//! Integration tests for `PageCollector` pagination semantics.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadmine_ingest::{
    FetchConfig, IngestError, PageCollector, PageSpec, PageStyle, RateLimitedFetcher,
};

fn fetcher() -> RateLimitedFetcher {
    RateLimitedFetcher::new(&FetchConfig {
        timeout_secs: 5,
        user_agent: "leadmine-test/0.1".to_owned(),
        min_request_interval_ms: 0,
        max_retries: 0,
        backoff_base_secs: 0,
    })
    .expect("failed to build fetcher")
}

fn spec(base_url: &str, page_size: u32) -> PageSpec {
    PageSpec {
        base_url: format!("{base_url}/lines"),
        page_size,
        style: PageStyle::PageNumber,
        params: vec![],
    }
}

/// A page envelope with `count` records.
fn page_body(count: usize) -> serde_json::Value {
    let records: Vec<serde_json::Value> =
        (0..count).map(|i| json!({"record": i})).collect();
    json!({"total": 999_999, "results": records})
}

#[tokio::test]
async fn collects_pages_until_a_short_page() {
    let server = MockServer::start().await;
    for (page, count) in [(1, 1000), (2, 1000), (3, 400)] {
        Mock::given(method("GET"))
            .and(path("/lines"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(count)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let collection = collector.collect_all(&CancellationToken::new()).await.unwrap();

    // Page sizes [1000, 1000, 400] with page_size=1000: exactly 3 fetches,
    // 2400 records, then stop.
    assert_eq!(collection.records.len(), 2400);
    assert_eq!(collection.pages_fetched, 3);
    assert!(!collection.truncated);
}

#[tokio::test]
async fn single_short_page_stops_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(3)))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let collection = collector.collect_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(collection.records.len(), 3);
    assert_eq!(collection.pages_fetched, 1);
}

#[tokio::test]
async fn not_found_on_first_page_means_zero_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let collection = collector.collect_all(&CancellationToken::new()).await.unwrap();
    assert!(collection.records.is_empty());
    assert!(!collection.truncated);
}

#[tokio::test]
async fn pagination_ceiling_truncates_and_keeps_collected_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1000)))
        .mount(&server)
        .await;
    // Page 2 is past the upstream's deep-pagination window.
    Mock::given(method("GET"))
        .and(path("/lines"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let collection = collector.collect_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(collection.records.len(), 1000);
    assert!(collection.truncated, "ceiling must mark the collection truncated");
}

#[tokio::test]
async fn bad_request_on_first_page_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let err = collector
        .collect_all(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::UpstreamStatus { status: 400, .. }
    ));
}

#[tokio::test]
async fn server_error_on_a_later_page_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1000)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lines"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let err = collector
        .collect_all(&CancellationToken::new())
        .await
        .unwrap_err();
    // Partial results of unknown completeness are unsafe to accept silently.
    assert!(matches!(
        err,
        IngestError::UpstreamStatus { status: 500, .. }
    ));
}

#[tokio::test]
async fn cancellation_stops_before_the_first_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(10)))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let collection = collector.collect_all(&cancel).await.unwrap();
    assert!(collection.records.is_empty());
    assert_eq!(collection.pages_fetched, 0);
}

#[tokio::test]
async fn envelope_without_results_array_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 5})))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let collector = PageCollector::new(&fetcher, spec(&server.uri(), 1000));
    let err = collector
        .collect_all(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Deserialize { .. }));
}
