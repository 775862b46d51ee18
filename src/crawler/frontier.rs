//! Pending-work queue for a crawl session
//!
//! The frontier holds index and detail entries awaiting a fetch, keyed by
//! normalized URL. A key is marked seen when its entry is popped, not when it
//! is pushed, so an entry that failed transiently can be handed back with
//! [`Frontier::requeue`] without ever being fetched twice after success.

use crate::state::ListingRef;
use crate::url::listing_key;
use std::collections::{HashMap, HashSet, VecDeque};
use url::Url;

/// What a frontier entry points at
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    /// A listing overview page; `page_number` starts at 1
    Index { page_number: u32 },

    /// A single listing discovered on an index page
    Detail(ListingRef),
}

/// A unit of pending work
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub kind: EntryKind,
    pub url: Url,

    /// Number of times the driver handed this entry back after its fetch
    /// exhausted the fetcher's own retries
    pub retry_count: u32,
}

impl FrontierEntry {
    pub fn index(url: Url, page_number: u32) -> Self {
        Self {
            kind: EntryKind::Index { page_number },
            url,
            retry_count: 0,
        }
    }

    pub fn detail(listing: ListingRef) -> Self {
        Self {
            url: listing.url.clone(),
            kind: EntryKind::Detail(listing),
            retry_count: 0,
        }
    }

    /// Dedup key of this entry
    pub fn key(&self) -> String {
        listing_key(&self.url)
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind, EntryKind::Index { .. })
    }

    pub fn page_number(&self) -> Option<u32> {
        match self.kind {
            EntryKind::Index { page_number } => Some(page_number),
            EntryKind::Detail(_) => None,
        }
    }
}

/// Deduplicating FIFO work queue
///
/// Detail entries are popped before index entries. Both kinds are FIFO, so
/// details come out in the order their index pages listed them, and the next
/// index page is only fetched once the current page's listings have been
/// handed out. This keeps the amount of pending work small.
#[derive(Debug, Default)]
pub struct Frontier {
    index_queue: VecDeque<FrontierEntry>,
    detail_queue: VecDeque<FrontierEntry>,

    /// Keys currently waiting in either queue
    queued: HashSet<String>,

    /// Popped entries that have not been completed or requeued
    in_flight: HashMap<String, FrontierEntry>,

    /// Keys claimed for fetching in this session or stored by an earlier one
    seen: HashSet<String>,

    last_index_page: u32,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier whose seen set is pre-populated, e.g. from the keys
    /// of records stored by an earlier session
    pub fn with_seen<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seen: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds an entry unless its key is seen, queued or in flight
    ///
    /// Returns true if the entry was queued.
    pub fn push(&mut self, entry: FrontierEntry) -> bool {
        let key = entry.key();
        if self.seen.contains(&key)
            || self.queued.contains(&key)
            || self.in_flight.contains_key(&key)
        {
            return false;
        }

        self.enqueue(key, entry);
        true
    }

    /// Takes the next entry, marking its key seen
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self
            .detail_queue
            .pop_front()
            .or_else(|| self.index_queue.pop_front())?;

        let key = entry.key();
        self.queued.remove(&key);
        self.seen.insert(key.clone());
        self.in_flight.insert(key, entry.clone());
        Some(entry)
    }

    /// Retires an in-flight entry that reached a final state
    ///
    /// Completing an index page advances [`Frontier::last_index_page`].
    pub fn complete(&mut self, key: &str) -> Option<FrontierEntry> {
        let entry = self.in_flight.remove(key)?;
        if let Some(page_number) = entry.page_number() {
            self.last_index_page = self.last_index_page.max(page_number);
        }
        Some(entry)
    }

    /// Hands an in-flight entry back to the end of its queue
    ///
    /// Returns false, leaving the frontier untouched, if the entry is not in
    /// flight. The key stays seen, so a concurrent push of the same URL is
    /// still rejected.
    pub fn requeue(&mut self, entry: FrontierEntry) -> bool {
        let key = entry.key();
        if self.in_flight.remove(&key).is_none() {
            return false;
        }

        self.enqueue(key, entry);
        true
    }

    /// Entries not yet in a final state: queued first, then in flight
    pub fn pending(&self) -> Vec<FrontierEntry> {
        let mut in_flight: Vec<_> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));

        self.index_queue
            .iter()
            .chain(self.detail_queue.iter())
            .cloned()
            .chain(in_flight)
            .collect()
    }

    /// Returns true if nothing is queued and nothing is in flight
    pub fn is_drained(&self) -> bool {
        self.index_queue.is_empty() && self.detail_queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.index_queue.len() + self.detail_queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Highest index page number completed so far
    pub fn last_index_page(&self) -> u32 {
        self.last_index_page
    }

    /// Restores the pagination watermark from a checkpoint
    pub fn set_last_index_page(&mut self, page_number: u32) {
        self.last_index_page = page_number;
    }

    fn enqueue(&mut self, key: String, entry: FrontierEntry) {
        self.queued.insert(key);
        if entry.is_index() {
            self.index_queue.push_back(entry);
        } else {
            self.detail_queue.push_back(entry);
        }
    }
}
