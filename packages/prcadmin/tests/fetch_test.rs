//! Fetcher tests against a mock provider serving the fixture site.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pretty_assertions::assert_eq;
use prcadmin::dataset::read_dataset;
use prcadmin::{fetch_year, normalize_file, DivisionError, FetchConfig, FetchOptions, FetchReport};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Pages of the fixture site, relative to `tests/fixtures/site`.
const SITE_PAGES: &[&str] = &[
    "2023/index.html",
    "2023/11.html",
    "2023/11/1101.html",
    "2023/11/01/110101.html",
    "2023/11/01/01/110101001.html",
    "2023/44.html",
    "2023/44/4420.html",
    "2023/44/20/442000001.html",
];

/// Rows the fixture site publishes for 2023.
const PUBLISHED_ROWS: usize = 12;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn html(body: impl Into<Vec<u8>>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

async fn mount_site(server: &MockServer) {
    for page in SITE_PAGES {
        let body = fs::read(fixture_path(&format!("site/{page}")))
            .unwrap_or_else(|e| panic!("Failed to load {page}: {e}"));
        Mock::given(method("GET"))
            .and(path(format!("/{page}")))
            .respond_with(html(body))
            .mount(server)
            .await;
    }
}

fn test_config(server: &MockServer) -> FetchConfig {
    FetchConfig::builder()
        .base_url(server.uri())
        .max_retries(3)
        .retry_base_delay(Duration::ZERO)
        .throttle_delay(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .build()
}

/// The client is blocking, so run it off the async runtime.
async fn fetch(
    config: FetchConfig,
    year: u16,
    output: PathBuf,
    normalize: bool,
) -> prcadmin::Result<FetchReport> {
    tokio::task::spawn_blocking(move || {
        fetch_year(&config, year, &output, FetchOptions { normalize }, |_| {})
    })
    .await
    .expect("fetch task panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_then_sort_end_to_end() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let sorted = dir.path().join("current.csv");

    let report = fetch(test_config(&server), 2023, raw.clone(), false)
        .await
        .unwrap();
    assert_eq!(report.rows, PUBLISHED_ROWS);
    assert_eq!(report.pages_scanned, SITE_PAGES.len());
    assert_eq!(report.missing_pages.len(), 1);
    assert!(report.missing_pages[0].ends_with("/2023/11/01/110102.html"));

    let normalized = normalize_file(&raw, &sorted).unwrap();
    assert_eq!(normalized.rows, PUBLISHED_ROWS);
    assert!(normalized.gaps.is_empty());

    let rows = read_dataset(&sorted).unwrap();
    assert_eq!(rows.len(), PUBLISHED_ROWS);
    let codes: Vec<&str> = rows.iter().map(|r| r.record.code.as_str()).collect();
    let smallest = codes.iter().min().copied();
    assert_eq!(codes.first().copied(), smallest);
    assert!(codes.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_with_sort_matches_published_snapshot() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("current.csv");
    fetch(test_config(&server), 2023, output.clone(), true)
        .await
        .unwrap();

    let expected = fs::read_to_string(fixture_path("2023.csv")).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refetch_is_byte_identical() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    fetch(test_config(&server), 2023, first.clone(), true)
        .await
        .unwrap();
    fetch(test_config(&server), 2023, second.clone(), true)
        .await
        .unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unpublished_year_is_not_found() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("2022.csv");
    let err = fetch(test_config(&server), 2022, output.clone(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, DivisionError::NotFound { year: 2022 }));
    assert!(!output.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_year_1900_is_not_found_without_requests() {
    let server = MockServer::start().await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("1900.csv");
    let err = fetch(test_config(&server), 1900, output.clone(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, DivisionError::NotFound { year: 1900 }));
    assert!(!output.exists());
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_changed_page_layout_is_source_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2023/index.html"))
        .respond_with(html("<html><body><div class=\"list\">新版页面</div></body></html>"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("current.csv");
    fs::write(&output, "previous contents").unwrap();

    let err = fetch(test_config(&server), 2023, output.clone(), false)
        .await
        .unwrap_err();

    match err {
        DivisionError::SourceFormat { url, .. } => assert!(url.ends_with("/2023/index.html")),
        other => panic!("expected source format error, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous contents");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2023/11.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let report = fetch(test_config(&server), 2023, dir.path().join("out.csv"), false)
        .await
        .unwrap();
    assert_eq!(report.rows, PUBLISHED_ROWS);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_throttle_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2023/44.html"))
        .respond_with(html(
            "<html><script>var encode_version = 'jsjiami.com.v6';</script></html>",
        ))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let report = fetch(test_config(&server), 2023, dir.path().join("out.csv"), false)
        .await
        .unwrap();
    assert_eq!(report.rows, PUBLISHED_ROWS);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2023/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let err = fetch(test_config(&server), 2023, output.clone(), false)
        .await
        .unwrap_err();

    match err {
        DivisionError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected retries exhausted, got {other:?}"),
    }
    assert!(!output.exists());
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2023/index.html"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = fetch(test_config(&server), 2023, dir.path().join("out.csv"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, DivisionError::Http(_)));
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
}

/// 北京市 in GB2312.
const BEIJING_GB2312: &[u8] = &[0xb1, 0xb1, 0xbe, 0xa9, 0xca, 0xd0];

fn gb2312_index(head: &str) -> Vec<u8> {
    let mut page = format!(
        "<html><head>{head}</head><body><table class=\"provincetable\">\
<tr class=\"provincetr\"><td><a href='11.html'>"
    )
    .into_bytes();
    page.extend_from_slice(BEIJING_GB2312);
    page.extend_from_slice(b"<br/></a></td></tr></table></body></html>");
    page
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gb2312_page_decoded_from_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2015/index.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(gb2312_index(""), "text/html; charset=gb2312"),
        )
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("2015.csv");
    let report = fetch(test_config(&server), 2015, output.clone(), false)
        .await
        .unwrap();

    assert_eq!(report.rows, 1);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "code,name,urban_rural_code\n110000000000,北京市,\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gb2312_page_decoded_from_meta_tag() {
    let server = MockServer::start().await;
    let head = "<meta http-equiv=\"Content-Type\" content=\"text/html; charset=gb2312\">";
    Mock::given(method("GET"))
        .and(path("/2015/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(gb2312_index(head), "text/html"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("2015.csv");
    fetch(test_config(&server), 2015, output.clone(), false)
        .await
        .unwrap();

    let rows = read_dataset(&output).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.name, "北京市");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_undecodable_page_is_source_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2015/index.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(gb2312_index(""), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("2015.csv");
    let err = fetch(test_config(&server), 2015, output.clone(), false)
        .await
        .unwrap_err();

    match err {
        DivisionError::SourceFormat { url, message } => {
            assert!(url.ends_with("/2015/index.html"));
            assert!(message.contains("UTF-8"));
        }
        other => panic!("expected source format error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unwritable_output_fails_before_crawling() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("no-such-dir").join("current.csv");
    let err = fetch(test_config(&server), 2023, output.clone(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, DivisionError::Io(_)));
    assert!(!output.exists());
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}
