//! Crawler module for listing page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Process-wide request pacing
//! - HTTP fetching with retry logic
//! - Page parsing into listing references and listing fields
//! - The deduplicating frontier
//! - Overall crawl coordination

mod backoff;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod rate_limiter;

pub use backoff::RetryPolicy;
pub use coordinator::{run_crawl, Coordinator, StopHandle};
pub use fetcher::{
    build_http_client, classify_error, classify_status, FetchError, FetchedPage, Fetcher,
};
pub use frontier::{EntryKind, Frontier, FrontierEntry};
pub use parser::{HtmlListingParser, PageKind, PageParser, ParseError, ParsedPage};
pub use rate_limiter::RateLimiter;

use crate::config::Config;
use crate::output::CrawlSummary;
use crate::CrawlError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the result document and rebuild the seen set from it
/// 2. Resume from a checkpoint or seed the first index page
/// 3. Fetch index and detail pages under the shared rate limit
/// 4. Append every parsed listing to the result document
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl finished or was stopped
/// * `Err(CrawlError)` - Crawl could not start or lost the ability to persist
pub async fn crawl(config: Config) -> Result<CrawlSummary, CrawlError> {
    run_crawl(config).await
}
