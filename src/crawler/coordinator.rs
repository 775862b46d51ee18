//! Crawl driver - main crawl orchestration logic
//!
//! This module contains the crawl session state machine and its worker pool:
//! - Rebuilding the seen set from stored records and seeding the frontier
//! - Running a fixed pool of workers that pop, fetch, parse and persist
//! - Requeueing or abandoning entries that keep failing transiently
//! - Checkpointing pending work so an interrupted crawl can resume

use crate::config::{Config, CrawlerConfig};
use crate::crawler::fetcher::{FetchError, Fetcher};
use crate::crawler::frontier::{EntryKind, Frontier, FrontierEntry};
use crate::crawler::parser::{HtmlListingParser, PageKind, PageParser, ParsedPage};
use crate::crawler::rate_limiter::RateLimiter;
use crate::output::{CrawlSummary, FailureReason};
use crate::state::{CrawlPhase, ListingRecord, ListingRef};
use crate::storage::{open_store, session_path_for, PendingIndex, ResultStore, SessionState};
use crate::url::listing_key;
use crate::{CrawlError, FailureKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;
use url::Url;

/// Requests a cooperative stop of a running crawl
///
/// Workers finish the entry they are processing and then stop popping;
/// everything still pending is checkpointed for the next run.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        tracing::info!("Stop requested, finishing in-flight work");
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

/// State shared by all workers of one session
struct Shared {
    crawler: CrawlerConfig,
    fetcher: Fetcher,
    parser: Arc<dyn PageParser>,
    frontier: Mutex<Frontier>,
    work_ready: Notify,
    store: Mutex<Box<dyn ResultStore>>,
    summary: Mutex<CrawlSummary>,
    checkpoint: Mutex<()>,
    session_path: PathBuf,
    config_hash: Option<String>,
    stop: watch::Receiver<bool>,
}

/// Main crawl driver
pub struct Coordinator {
    config: Config,
    seed_url: Url,
    phase: CrawlPhase,
    fresh: bool,
    store: Option<Box<dyn ResultStore>>,
    parser: Arc<dyn PageParser>,
    fetcher: Fetcher,
    session_path: PathBuf,
    config_hash: Option<String>,
    stop_sender: Arc<watch::Sender<bool>>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Discard stored records and any checkpoint instead of resuming
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Failed to open the result document or build the client
    pub fn new(config: Config, fresh: bool) -> Result<Self, CrawlError> {
        let results_path = config.results_path();
        let store = open_store(&results_path, fresh)?;
        let parser = Arc::new(HtmlListingParser::new(config.parser.clone()));
        let session_path = session_path_for(&results_path);

        Self::with_parts(config, Box::new(store), parser, session_path, fresh)
    }

    /// Creates a coordinator around an already opened store and a parser
    pub fn with_parts(
        config: Config,
        store: Box<dyn ResultStore>,
        parser: Arc<dyn PageParser>,
        session_path: PathBuf,
        fresh: bool,
    ) -> Result<Self, CrawlError> {
        let seed_url = config.seed_url()?;
        let limiter = Arc::new(RateLimiter::from_millis(
            config.crawler.request_interval_ms,
        )?);
        let fetcher = Fetcher::from_config(&config.crawler, &config.user_agent, limiter)?;
        let (stop_sender, _) = watch::channel(false);

        Ok(Self {
            config,
            seed_url,
            phase: CrawlPhase::Seeding,
            fresh,
            store: Some(store),
            parser,
            fetcher,
            session_path,
            config_hash: None,
            stop_sender: Arc::new(stop_sender),
        })
    }

    /// Records the configuration digest in checkpoints
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = Some(config_hash.into());
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: Arc::clone(&self.stop_sender),
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Runs the crawl session to completion or until stopped
    ///
    /// Per-entry failures are recorded in the returned summary. Only a
    /// persistence failure ends the session with an error, after every worker
    /// has stopped.
    pub async fn run(&mut self) -> Result<CrawlSummary, CrawlError> {
        let start_time = Instant::now();
        let store = self.store.take().ok_or_else(|| {
            CrawlError::Worker("crawl session has already run".to_string())
        })?;

        let frontier = self.seed(store.as_ref())?;
        self.transition(CrawlPhase::Draining)?;

        let shared = Arc::new(Shared {
            crawler: self.config.crawler.clone(),
            fetcher: self.fetcher.clone(),
            parser: Arc::clone(&self.parser),
            frontier: Mutex::new(frontier),
            work_ready: Notify::new(),
            store: Mutex::new(store),
            summary: Mutex::new(CrawlSummary::default()),
            checkpoint: Mutex::new(()),
            session_path: self.session_path.clone(),
            config_hash: self.config_hash.clone(),
            stop: self.stop_sender.subscribe(),
        });

        let workers = self.config.crawler.workers.max(1);
        tracing::info!(
            "Draining frontier with {} workers, {:?} between requests",
            workers,
            self.fetcher.limiter().interval()
        );

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            tasks.spawn(run_worker(worker_id, Arc::clone(&shared)));
        }

        let mut fatal: Option<CrawlError> = None;
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => CrawlError::Worker(e.to_string()),
            };

            tracing::error!("Aborting crawl: {}", error);
            self.stop_sender.send_replace(true);
            shared.work_ready.notify_waiters();
            fatal.get_or_insert(error);
        }

        if let Some(error) = fatal {
            // Best effort; the result document stays valid either way
            if let Err(e) = checkpoint(&shared).await {
                tracing::warn!("Could not write checkpoint: {}", e);
            }
            return Err(error);
        }

        let drained = shared.frontier.lock().await.is_drained();
        if drained {
            self.transition(CrawlPhase::Done)?;
            SessionState::clear(&self.session_path)?;
        } else {
            self.transition(CrawlPhase::Stopped)?;
            checkpoint(&shared).await?;
            tracing::info!(
                "Checkpoint written to {}",
                self.session_path.display()
            );
        }

        let mut summary = shared.summary.lock().await.clone();
        summary.phase = self.phase;
        summary.elapsed_secs = start_time.elapsed().as_secs_f64();

        tracing::info!(
            "Crawl {}: {} records stored, {} permanent failures, {} abandoned in {:.1}s",
            summary.phase,
            summary.records_stored,
            summary.permanent_failures,
            summary.abandoned,
            summary.elapsed_secs
        );

        Ok(summary)
    }

    /// Builds the initial frontier
    ///
    /// The seen set is rebuilt once from the stored records. Pending work comes
    /// from the checkpoint when there is one, otherwise from the seed page.
    fn seed(&self, store: &dyn ResultStore) -> Result<Frontier, CrawlError> {
        let records = store.snapshot();
        tracing::info!("Rebuilding seen set from {} stored records", records.len());
        let mut frontier = Frontier::with_seen(records.iter().map(|r| listing_key(&r.url)));

        let session = if self.fresh {
            SessionState::clear(&self.session_path)?;
            None
        } else {
            SessionState::load(&self.session_path)?
        };

        match session {
            Some(session) if !session.is_exhausted() => {
                if session.config_hash.is_some() && session.config_hash != self.config_hash {
                    tracing::warn!("Configuration changed since the checkpoint was written");
                }

                tracing::info!(
                    "Resuming after index page {}: {} index pages and {} listings pending",
                    session.last_index_page,
                    session.pending_index_pages.len(),
                    session.pending_details.len()
                );
                frontier.set_last_index_page(session.last_index_page);

                for pending in session.pending_index_pages {
                    frontier.push(FrontierEntry::index(pending.url, pending.page_number));
                }
                for listing in session.pending_details {
                    if !store.contains_id(&listing.id) {
                        frontier.push(FrontierEntry::detail(listing));
                    }
                }
            }
            _ => {
                tracing::info!("Seeding frontier with {}", self.seed_url);
                frontier.push(FrontierEntry::index(self.seed_url.clone(), 1));
            }
        }

        Ok(frontier)
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<(), CrawlError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        tracing::debug!("Crawl phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Runs a coordinator for the given configuration, resuming stored work
pub async fn run_crawl(config: Config) -> Result<CrawlSummary, CrawlError> {
    let mut coordinator = Coordinator::new(config, false)?;
    coordinator.run().await
}

async fn run_worker(worker_id: u32, shared: Arc<Shared>) -> Result<(), CrawlError> {
    tracing::debug!("Worker {} started", worker_id);

    while let Some(entry) = next_entry(&shared).await {
        let result = process_entry(&shared, entry).await;
        shared.work_ready.notify_waiters();
        result?;
    }

    tracing::debug!("Worker {} finished", worker_id);
    Ok(())
}

/// Waits for the next entry
///
/// Returns `None` once a stop is requested, or once the frontier is empty with
/// nothing in flight that could still add work.
async fn next_entry(shared: &Shared) -> Option<FrontierEntry> {
    let mut stop = shared.stop.clone();

    loop {
        if *stop.borrow() {
            return None;
        }

        let notified = shared.work_ready.notified();
        tokio::pin!(notified);

        {
            let mut frontier = shared.frontier.lock().await;
            if let Some(entry) = frontier.pop() {
                return Some(entry);
            }
            if frontier.is_drained() {
                shared.work_ready.notify_waiters();
                return None;
            }
            // Register before unlocking so a completion in between is not missed
            notified.as_mut().enable();
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = stop.changed() => {}
        }
    }
}

async fn process_entry(shared: &Shared, entry: FrontierEntry) -> Result<(), CrawlError> {
    let page = match shared.fetcher.fetch(&entry.url).await {
        Ok(page) => page,
        Err(error) => {
            handle_fetch_error(shared, entry, error).await;
            return Ok(());
        }
    };

    if page.transient_failures > 0 {
        shared.summary.lock().await.transient_events += u64::from(page.transient_failures);
    }

    let kind = if entry.is_index() {
        PageKind::Index
    } else {
        PageKind::Detail
    };

    let parsed = shared.parser.parse(&page.body, kind, &page.final_url);
    match (parsed, &entry.kind) {
        (Ok(ParsedPage::Index { refs, next_page }), EntryKind::Index { page_number }) => {
            handle_index(shared, &entry, *page_number, refs, next_page).await
        }
        (Ok(ParsedPage::Detail { fields }), EntryKind::Detail(listing)) => {
            let record = ListingRecord::from_ref(listing, fields);
            handle_detail(shared, &entry, record).await
        }
        (Ok(_), _) => {
            record_failure(shared, &entry, FailureReason::Parse, "unexpected page layout").await;
            Ok(())
        }
        (Err(e), _) => {
            tracing::warn!("Failed to parse {}: {}", entry.url, e);
            record_failure(shared, &entry, FailureReason::Parse, e.to_string()).await;
            Ok(())
        }
    }
}

async fn handle_index(
    shared: &Shared,
    entry: &FrontierEntry,
    page_number: u32,
    refs: Vec<ListingRef>,
    next_page: Option<Url>,
) -> Result<(), CrawlError> {
    let fresh_refs: Vec<_> = {
        let store = shared.store.lock().await;
        refs.into_iter()
            .filter(|listing| !store.contains_id(&listing.id))
            .collect()
    };

    let within_limit = shared
        .crawler
        .max_index_pages
        .map_or(true, |max| page_number < max);

    let (discovered, next_queued) = {
        let mut frontier = shared.frontier.lock().await;
        let discovered = fresh_refs
            .into_iter()
            .filter(|listing| frontier.push(FrontierEntry::detail(listing.clone())))
            .count();

        let next_queued = match next_page {
            Some(next) if within_limit => {
                frontier.push(FrontierEntry::index(next, page_number + 1))
            }
            Some(_) => {
                tracing::info!("Reached index page limit at page {}", page_number);
                false
            }
            None => false,
        };

        frontier.complete(&entry.key());
        (discovered, next_queued)
    };

    tracing::info!(
        "Index page {}: {} new listings{}",
        page_number,
        discovered,
        if next_queued { ", next page queued" } else { "" }
    );

    {
        let mut summary = shared.summary.lock().await;
        summary.index_pages += 1;
        summary.listings_discovered += discovered as u64;
    }

    checkpoint(shared).await
}

async fn handle_detail(
    shared: &Shared,
    entry: &FrontierEntry,
    record: ListingRecord,
) -> Result<(), CrawlError> {
    let id = record.id.clone();
    let appended = {
        let mut store = shared.store.lock().await;
        blocking_io(|| store.append(record))?
    };

    {
        let mut summary = shared.summary.lock().await;
        if appended {
            summary.records_stored += 1;
        } else {
            summary.duplicates_skipped += 1;
        }
    }

    if appended {
        tracing::debug!("Stored listing {} from {}", id, entry.url);
    } else {
        tracing::debug!("Listing {} already stored, skipping", id);
    }

    shared.frontier.lock().await.complete(&entry.key());
    Ok(())
}

async fn handle_fetch_error(shared: &Shared, mut entry: FrontierEntry, error: FetchError) {
    if error.transient_failures > 0 {
        shared.summary.lock().await.transient_events += u64::from(error.transient_failures);
    }

    match error.kind {
        FailureKind::Permanent => {
            tracing::warn!("Permanent failure for {}: {}", entry.url, error.message);
            record_failure(shared, &entry, FailureReason::PermanentFetch, error.message).await;
        }
        FailureKind::Transient if entry.retry_count < shared.crawler.max_session_retries => {
            entry.retry_count += 1;
            tracing::warn!(
                "Requeueing {} after {} ({}/{})",
                entry.url,
                error.message,
                entry.retry_count,
                shared.crawler.max_session_retries
            );
            shared.frontier.lock().await.requeue(entry);
        }
        FailureKind::Transient => {
            tracing::warn!(
                "Abandoning {} after {} session retries: {}",
                entry.url,
                entry.retry_count,
                error.message
            );
            record_failure(shared, &entry, FailureReason::Abandoned, error.message).await;
        }
    }
}

/// Records a failed entry and retires it from the frontier
async fn record_failure(
    shared: &Shared,
    entry: &FrontierEntry,
    reason: FailureReason,
    message: impl Into<String>,
) {
    shared
        .summary
        .lock()
        .await
        .record_failure(entry.url.as_str(), reason, message);
    shared.frontier.lock().await.complete(&entry.key());
}

/// Runs synchronous file I/O from a worker
///
/// On a multi-threaded runtime the worker thread is handed over with
/// `block_in_place` so other workers keep running while the document is
/// written. A current-thread runtime cannot do that, so the call runs inline.
fn blocking_io<T>(io: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(io),
        _ => io(),
    }
}

/// Writes the pending work of the frontier to the session sidecar
async fn checkpoint(shared: &Shared) -> Result<(), CrawlError> {
    // Serializes snapshot and write so checkpoints land in order
    let _guard = shared.checkpoint.lock().await;

    let mut state = SessionState::new(shared.config_hash.clone());
    {
        let frontier = shared.frontier.lock().await;
        state.last_index_page = frontier.last_index_page();
        for entry in frontier.pending() {
            match entry.kind {
                EntryKind::Index { page_number } => state.pending_index_pages.push(PendingIndex {
                    url: entry.url,
                    page_number,
                }),
                EntryKind::Detail(listing) => state.pending_details.push(listing),
            }
        }
    }

    blocking_io(|| state.save(&shared.session_path))?;
    tracing::trace!(
        "Checkpoint: {} index pages, {} listings pending",
        state.pending_index_pages.len(),
        state.pending_details.len()
    );
    Ok(())
}
