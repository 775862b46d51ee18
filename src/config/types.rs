use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seed: Option<SeedConfig>,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    pub parser: ParserConfig,
}

/// Crawler pacing and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Minimum time between any two requests to the site (milliseconds).
    /// Zero disables throttling; negative values are rejected.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: i64,

    /// Number of concurrent workers pulling from the frontier
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Attempts per fetch, including the first one
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    /// How often an entry whose fetch attempts were exhausted is requeued
    #[serde(default = "default_max_session_retries")]
    pub max_session_retries: u32,

    /// Base delay of the exponential backoff between attempts (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of the backoff delay (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Timeout of a single HTTP attempt (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Stop paginating after this many index pages
    #[serde(default)]
    pub max_index_pages: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            workers: default_workers(),
            max_fetch_attempts: default_max_fetch_attempts(),
            max_session_retries: default_max_session_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_index_pages: None,
        }
    }
}

fn default_request_interval_ms() -> i64 {
    1000
}

fn default_workers() -> u32 {
    2
}

fn default_max_fetch_attempts() -> u32 {
    3
}

fn default_max_session_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Client identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Full browser-like identifier, used verbatim when set
    #[serde(rename = "browser-string", default)]
    pub browser_string: Option<String>,
}

impl UserAgentConfig {
    /// Returns the User-Agent header value sent with every request
    pub fn header_value(&self) -> String {
        match &self.browser_string {
            Some(value) => value.clone(),
            None => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, self.contact_url
            ),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON result document
    #[serde(rename = "results-path")]
    pub results_path: String,
}

/// Fixed start page
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(rename = "start-url")]
    pub start_url: String,
}

/// Search query rendered into the first index page URL
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchConfig {
    /// Template with `{keywords}`, `{location}`, `{min_price}`,
    /// `{max_price}` and `{page}` placeholders
    pub url_template: String,

    pub keywords: String,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub min_price: Option<u32>,

    #[serde(default)]
    pub max_price: Option<u32>,
}

/// Page layout rules for the HTML listing parser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParserConfig {
    /// Selects one element per listing on an index page
    pub listing_selector: String,

    /// Selects the detail link inside a listing element
    pub link_selector: String,

    /// Attribute of the listing element holding the site-assigned id
    #[serde(default)]
    pub id_attribute: Option<String>,

    /// Selects the "next page" link on an index page
    pub next_page_selector: String,

    /// Listings whose text contains this marker are ignored
    #[serde(default)]
    pub skip_marker: Option<String>,

    /// Field name -> selector on the detail page (`selector@attr` reads an attribute)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}
