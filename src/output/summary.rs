//! End-of-crawl summary

use crate::state::CrawlPhase;
use serde::Serialize;
use std::fmt;

/// Why an entry ended in a failed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A 4xx response or an unusable request; fetched exactly once
    PermanentFetch,

    /// The page was fetched but could not be parsed
    Parse,

    /// Still failing transiently after the session-level retry limit
    Abandoned,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PermanentFetch => "permanent fetch failure",
            Self::Parse => "parse failure",
            Self::Abandoned => "abandoned after retries",
        };
        write!(f, "{}", label)
    }
}

/// A URL left for manual follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub url: String,
    pub reason: FailureReason,
    pub message: String,
}

/// Counts reported when a crawl session ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlSummary {
    /// Phase the session ended in
    pub phase: CrawlPhase,

    /// Records appended to the result document in this session
    pub records_stored: u64,

    /// Detail pages whose record id was already stored
    pub duplicates_skipped: u64,

    /// Index pages parsed successfully
    pub index_pages: u64,

    /// Listing references newly queued from index pages
    pub listings_discovered: u64,

    /// Individual transient attempt failures, retried or not
    pub transient_events: u64,

    pub permanent_failures: u64,
    pub parse_failures: u64,
    pub abandoned: u64,

    /// Every entry that ended failed, in the order it failed
    pub failed: Vec<FailedEntry>,

    pub elapsed_secs: f64,
}

impl Default for CrawlSummary {
    fn default() -> Self {
        Self {
            phase: CrawlPhase::Seeding,
            records_stored: 0,
            duplicates_skipped: 0,
            index_pages: 0,
            listings_discovered: 0,
            transient_events: 0,
            permanent_failures: 0,
            parse_failures: 0,
            abandoned: 0,
            failed: Vec::new(),
            elapsed_secs: 0.0,
        }
    }
}

impl CrawlSummary {
    /// Records a failed entry and bumps the counter for its reason
    pub fn record_failure(
        &mut self,
        url: impl Into<String>,
        reason: FailureReason,
        message: impl Into<String>,
    ) {
        match reason {
            FailureReason::PermanentFetch => self.permanent_failures += 1,
            FailureReason::Parse => self.parse_failures += 1,
            FailureReason::Abandoned => self.abandoned += 1,
        }
        self.failed.push(FailedEntry {
            url: url.into(),
            reason,
            message: message.into(),
        });
    }

    pub fn total_failures(&self) -> u64 {
        self.permanent_failures + self.parse_failures + self.abandoned
    }

    /// Returns true if the crawl ran to completion
    pub fn is_complete(&self) -> bool {
        self.phase == CrawlPhase::Done
    }
}

/// Prints a crawl summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Session ended: {}", summary.phase);
    println!("Elapsed: {:.1}s", summary.elapsed_secs);
    println!();

    println!("Results:");
    println!("  Records stored: {}", summary.records_stored);
    println!("  Duplicates skipped: {}", summary.duplicates_skipped);
    println!("  Index pages: {}", summary.index_pages);
    println!("  Listings discovered: {}", summary.listings_discovered);
    println!();

    println!("Failures:");
    println!("  Transient events: {}", summary.transient_events);
    println!("  Permanent failures: {}", summary.permanent_failures);
    println!("  Parse failures: {}", summary.parse_failures);
    println!("  Abandoned after retries: {}", summary.abandoned);

    if !summary.failed.is_empty() {
        println!();
        println!("Failed URLs ({}):", summary.failed.len());
        for entry in &summary.failed {
            println!("  - {} [{}] {}", entry.url, entry.reason, entry.message);
        }
    }

    if summary.phase == CrawlPhase::Stopped {
        println!();
        println!("Crawl was stopped; run again to resume.");
    }
}
