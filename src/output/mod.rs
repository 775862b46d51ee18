//! Output module for crawl summaries and result statistics
//!
//! This module handles:
//! - The end-of-crawl summary returned by the driver
//! - Statistics over an existing result document

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{print_summary, CrawlSummary, FailedEntry, FailureReason};
