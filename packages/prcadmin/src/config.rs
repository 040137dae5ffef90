//! Configuration constants and validation functions.

use std::time::Duration;

use chrono::Datelike;

use crate::error::{DivisionError, Result};

/// Base URL of the statistical division code tables.
pub const STATS_BASE_URL: &str = "http://www.stats.gov.cn/sj/tjbz/tjyqhdmhcxhfdm";

/// First year the provider published a division code table.
pub const FIRST_PUBLISHED_YEAR: u16 = 2009;

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
pub const MAX_RETRIES: u32 = 5;

/// Base delay for exponential backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 5_000;

/// How long to back off when the provider serves its anti-scraping page.
pub const THROTTLE_DELAY_SECS: u64 = 60;

/// Marker of the provider's anti-scraping challenge page.
pub const THROTTLE_MARKER: &str = "jsjiami.com.v6";

/// Header row of every dataset file.
pub const CSV_HEADER: [&str; 3] = ["code", "name", "urban_rural_code"];

/// Check that the provider can have published a table for `year`.
///
/// Rejects years before the first publication and years in the future
/// without touching the network.
///
/// # Examples
/// ```
/// use prcadmin::config::validate_year;
///
/// assert!(validate_year(2023).is_ok());
/// assert!(validate_year(1900).is_err());
/// ```
pub fn validate_year(year: u16) -> Result<()> {
    let this_year = chrono::Local::now().year();
    if year < FIRST_PUBLISHED_YEAR || i32::from(year) > this_year {
        return Err(DivisionError::NotFound { year });
    }
    Ok(())
}

/// Build the entry page URL for a year.
///
/// # Examples
/// ```
/// use prcadmin::config::{year_url, STATS_BASE_URL};
///
/// assert_eq!(
///     year_url(STATS_BASE_URL, 2023),
///     "http://www.stats.gov.cn/sj/tjbz/tjyqhdmhcxhfdm/2023/index.html"
/// );
/// ```
pub fn year_url(base_url: &str, year: u16) -> String {
    format!("{}/{year}/index.html", base_url.trim_end_matches('/'))
}

/// Settings for a fetch run.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub throttle_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: STATS_BASE_URL.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            throttle_delay: Duration::from_secs(THROTTLE_DELAY_SECS),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Entry page for `year` under this configuration's base URL.
    pub fn year_url(&self, year: u16) -> String {
        year_url(&self.base_url, year)
    }
}

#[derive(Debug)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Total attempts per request; values below 1 are raised to 1.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries.max(1);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn throttle_delay(mut self, delay: Duration) -> Self {
        self.config.throttle_delay = delay;
        self
    }

    pub fn build(self) -> FetchConfig {
        self.config
    }
}
