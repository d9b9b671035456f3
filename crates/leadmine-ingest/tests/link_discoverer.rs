//! Integration tests for the registry-file link discoverer.

use std::collections::HashSet;

use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadmine_ingest::{discover_new_files, FetchConfig, IngestError, RateLimitedFetcher};

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

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()
}

const INDEX_HTML: &str = r#"
<html><body>
  <a class="download-link" href="/files/deces-2025-m06.csv">juin 2025</a>
  <a class="download-link" href="/files/deces-2025-m04.csv">avril 2025</a>
  <a class="download-link" href="/files/deces-2024-m08.csv">août 2024</a>
  <a class="download-link" href="/files/deces-2023-m05.csv">mai 2023</a>
  <a class="download-link" href="/files/notes.pdf">notes</a>
  <a class="download-link" href="/files/deces-annuel.csv">annuel</a>
  <a class="other" href="/files/deces-2025-m05.csv">mai 2025</a>
</body></html>
"#;

#[tokio::test]
async fn discovers_recent_novel_files_sorted_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fr/deces/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_HTML))
        .mount(&server)
        .await;

    let known: HashSet<String> = ["deces-2025-m04.csv".to_owned()].into();
    let fetcher = fetcher();
    let files = discover_new_files(
        &fetcher,
        &format!("{}/fr/deces/index.html", server.uri()),
        &known,
        today(),
    )
    .await
    .unwrap();

    // deces-2023-m05 is outside the 12-month window, deces-2025-m04 is known,
    // the PDF and the non-matching filename are dropped, the `other`-class
    // anchor is not a download link. Remainder comes back oldest first.
    let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, vec!["deces-2024-m08.csv", "deces-2025-m06.csv"]);

    assert_eq!(files[0].year, 2024);
    assert_eq!(files[0].month, 8);
    assert!(files[0].url.ends_with("/files/deces-2024-m08.csv"));
    assert!(files[0].url.starts_with(&server.uri()));
}

#[tokio::test]
async fn file_exactly_twelve_months_old_is_kept() {
    let server = MockServer::start().await;
    let html = r#"<a class="download-link" href="/files/deces-2024-m07.csv">x</a>"#;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let files = discover_new_files(&fetcher, &server.uri(), &HashSet::new(), today())
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn empty_index_yields_no_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>rien</body></html>"))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let files = discover_new_files(&fetcher, &server.uri(), &HashSet::new(), today())
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn unreachable_index_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let err = discover_new_files(&fetcher, &server.uri(), &HashSet::new(), today())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::UpstreamStatus { status: 500, .. }
    ));
}
