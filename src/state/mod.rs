//! State module for the crawl data model
//!
//! # Components
//!
//! - `ListingRef`: a listing discovered on an index page, not yet fetched
//! - `ListingRecord`: the structured result of a fetched detail page
//! - `CrawlPhase`: the lifecycle of a crawl session

mod crawl_phase;
mod listing;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use listing::{ListingFields, ListingRecord, ListingRef};
