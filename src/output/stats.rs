//! Statistics over an existing result document
//!
//! This module provides functionality for summarizing what a result file
//! holds without crawling anything.

use crate::storage::ResultStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Result document statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    /// Number of stored records
    pub total_records: u64,

    /// Records with a non-null value, per field name
    pub field_coverage: BTreeMap<String, u64>,

    /// Earliest fetch time
    pub first_fetched: Option<DateTime<Utc>>,

    /// Latest fetch time
    pub last_fetched: Option<DateTime<Utc>>,

    /// Records per host
    pub records_by_host: BTreeMap<String, u64>,
}

/// Computes statistics over the records in a store
pub fn load_statistics(store: &dyn ResultStore) -> CrawlStatistics {
    let records = store.snapshot();

    let mut field_coverage = BTreeMap::new();
    let mut records_by_host = BTreeMap::new();
    let mut first_fetched: Option<DateTime<Utc>> = None;
    let mut last_fetched: Option<DateTime<Utc>> = None;

    for record in &records {
        for (name, value) in &record.fields {
            let covered = field_coverage.entry(name.clone()).or_insert(0);
            if !value.is_null() {
                *covered += 1;
            }
        }

        let host = record.url.host_str().unwrap_or("unknown").to_string();
        *records_by_host.entry(host).or_insert(0) += 1;

        first_fetched = Some(first_fetched.map_or(record.fetched_at, |t| t.min(record.fetched_at)));
        last_fetched = Some(last_fetched.map_or(record.fetched_at, |t| t.max(record.fetched_at)));
    }

    CrawlStatistics {
        total_records: records.len() as u64,
        field_coverage,
        first_fetched,
        last_fetched,
        records_by_host,
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Result Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    if let (Some(first), Some(last)) = (stats.first_fetched, stats.last_fetched) {
        println!("  Fetched between: {} and {}", first.to_rfc3339(), last.to_rfc3339());
    }
    println!();

    if !stats.field_coverage.is_empty() {
        println!("Field Coverage:");
        for (name, count) in &stats.field_coverage {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", name, count, percentage);
        }
        println!();
    }

    if !stats.records_by_host.is_empty() {
        println!("Records by Host:");
        let mut hosts: Vec<_> = stats.records_by_host.iter().collect();
        hosts.sort_by(|a, b| b.1.cmp(a.1));
        for (host, count) in hosts {
            println!("  {}: {}", host, count);
        }
    }
}
