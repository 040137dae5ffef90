//! HTTP client wrapper for the statistics provider.

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::config::{FetchConfig, THROTTLE_MARKER};
use crate::error::{DivisionError, Result};

/// User agent string identifying this tool.
const USER_AGENT: &str = concat!("prcadmin/", env!("CARGO_PKG_VERSION"));

/// Bytes searched for a `<meta>` charset declaration.
const META_SNIFF_LEN: usize = 1024;

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)<meta\b[^>]*?charset\s*=\s*["']?([a-z0-9_:.\-]+)"#).expect("valid regex")
});

/// Result of fetching one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Decoded page body.
    Page(String),
    /// The provider answered 404.
    NotFound,
}

/// Why the previous attempt did not succeed.
enum Retry {
    Transient,
    Throttled,
}

/// Create a configured HTTP client.
pub fn create_client(config: &FetchConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Fetch a page with retry logic.
///
/// Connection errors, timeouts, 5xx responses and the provider's
/// anti-scraping page are retried up to `config.max_retries` attempts in
/// total. Transient failures back off exponentially from
/// `config.retry_base_delay`; throttling waits `config.throttle_delay`.
/// A 404 is returned as [`Fetched::NotFound`]; other 4xx responses fail
/// immediately.
pub fn fetch_page(client: &Client, url: &str, config: &FetchConfig) -> Result<Fetched> {
    let mut last_error: Option<String> = None;
    let mut retry: Option<Retry> = None;

    for attempt in 0..config.max_retries {
        if let Some(reason) = retry.take() {
            let delay = match reason {
                Retry::Transient => backoff_delay(config.retry_base_delay, attempt),
                Retry::Throttled => config.throttle_delay,
            };
            tracing::debug!(url, attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
            thread::sleep(delay);
        }

        let response = match client.get(url).send() {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!(
                    url,
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    "Connection error, will retry"
                );
                last_error = Some(e.to_string());
                retry = Some(Retry::Transient);
                continue;
            }
            Err(e) => return Err(DivisionError::Http(e)),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if status.is_server_error() {
            tracing::warn!(
                url,
                status = %status,
                attempt = attempt + 1,
                max_retries = config.max_retries,
                "Server error, will retry"
            );
            last_error = Some(format!("Server error: {status}"));
            retry = Some(Retry::Transient);
            continue;
        }

        // Other client errors won't succeed on retry
        let response = response.error_for_status()?;
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(header_charset)
            .map(str::to_string);
        let bytes = match response.bytes() {
            Ok(bytes) => bytes,
            Err(e) if e.is_timeout() => {
                tracing::warn!(url, error = %e, attempt = attempt + 1, "Body read timed out, will retry");
                last_error = Some(e.to_string());
                retry = Some(Retry::Transient);
                continue;
            }
            Err(e) => return Err(DivisionError::Http(e)),
        };

        let body = decode_body(&bytes, declared.as_deref(), url)?;
        if body.contains(THROTTLE_MARKER) {
            tracing::warn!(
                url,
                attempt = attempt + 1,
                delay_secs = config.throttle_delay.as_secs(),
                "Provider is throttling requests, backing off"
            );
            last_error = Some("throttled by provider".to_string());
            retry = Some(Retry::Throttled);
            continue;
        }

        return Ok(Fetched::Page(body));
    }

    Err(DivisionError::RetriesExhausted {
        url: url.to_string(),
        attempts: config.max_retries,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Exponential backoff: base, 2x base, 4x base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// `charset` parameter of a `Content-Type` header value.
fn header_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Charset named by a `<meta>` tag near the start of the page.
fn meta_charset(bytes: &[u8]) -> Option<&str> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LEN)];
    let label = META_CHARSET.captures(head)?.get(1)?;
    std::str::from_utf8(label.as_bytes()).ok()
}

/// Decode a page body.
///
/// A byte order mark wins, then the `Content-Type` charset, then a `<meta>`
/// declaration; pages declaring nothing are read as UTF-8. Older year tables
/// are served as GB2312. Bytes that are not valid in the chosen encoding are
/// a [`DivisionError::SourceFormat`] error rather than replacement characters.
pub fn decode_body(bytes: &[u8], declared: Option<&str>, url: &str) -> Result<String> {
    let format_error = |message: String| DivisionError::SourceFormat {
        url: url.to_string(),
        message,
    };

    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => {
            let label = declared.or_else(|| meta_charset(bytes));
            let encoding = match label {
                Some(label) => Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| format_error(format!("unsupported charset '{label}'")))?,
                None => UTF_8,
            };
            (encoding, bytes)
        }
    };

    tracing::trace!(url, encoding = encoding.name(), "decoding page");
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| format_error(format!("body is not valid {}", encoding.name())))
}
