//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, including resuming from disk.

use listing_harvester::config::{
    Config, CrawlerConfig, OutputConfig, ParserConfig, SeedConfig, UserAgentConfig,
};
use listing_harvester::crawler::Coordinator;
use listing_harvester::output::FailureReason;
use listing_harvester::state::{ListingFields, ListingRecord, ListingRef};
use listing_harvester::storage::{session_path_for, JsonStore, ResultStore, SessionState};
use listing_harvester::CrawlPhase;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling from `start_url` into `results_path`
fn create_test_config(start_url: String, results_path: &Path) -> Config {
    let mut fields = BTreeMap::new();
    fields.insert("title".to_string(), "h1#viewad-title".to_string());
    fields.insert("price".to_string(), "#viewad-price".to_string());

    Config {
        crawler: CrawlerConfig {
            request_interval_ms: 0,
            workers: 2,
            max_fetch_attempts: 3,
            max_session_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            request_timeout_secs: 5,
            max_index_pages: None,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            browser_string: None,
        },
        output: OutputConfig {
            results_path: results_path.display().to_string(),
        },
        seed: Some(SeedConfig { start_url }),
        search: None,
        parser: ParserConfig {
            listing_selector: "article.aditem".to_string(),
            link_selector: "a.ellipsis".to_string(),
            id_attribute: Some("data-adid".to_string()),
            next_page_selector: "a.pagination-next".to_string(),
            skip_marker: Some("TOP Anzeige".to_string()),
            fields,
        },
    }
}

/// Renders an index page listing `ids`, optionally linking to `next`
fn index_page(ids: &[&str], next: Option<&str>) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<article class="aditem" data-adid="{id}">
                     <a class="ellipsis" href="/s-anzeige/item/{id}-1-2">Listing {id}</a>
                   </article>"#,
                id = id
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="pagination-next" href="{}">Weiter</a>"#, href))
        .unwrap_or_default();

    format!("<html><body>{}{}</body></html>", items, next)
}

fn detail_page(title: &str) -> String {
    format!(
        r#"<html><body><h1 id="viewad-title">{}</h1><h2 id="viewad-price">50 €</h2></body></html>"#,
        title
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

async fn mount_index(server: &MockServer, at: &str, ids: &[&str], next: Option<&str>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(html(index_page(ids, next)))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: &str, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/s-anzeige/item/{}-1-2", id)))
        .respond_with(html(detail_page(&format!("Listing {}", id))))
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Two index pages, three listings in total
async fn mount_two_page_site(server: &MockServer, detail_hits: u64) {
    mount_index(server, "/list/1", &["1", "2"], Some("/list/2")).await;
    mount_index(server, "/list/2", &["3"], None).await;
    for id in ["1", "2", "3"] {
        mount_detail(server, id, detail_hits).await;
    }
}

fn stored_ids(results_path: &Path) -> Vec<String> {
    let store = JsonStore::open(results_path).expect("Failed to reopen result document");
    let mut ids: Vec<_> = store.snapshot().into_iter().map(|r| r.id).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_full_crawl_two_index_pages() {
    let server = MockServer::start().await;
    mount_two_page_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let mut coordinator = Coordinator::new(config, false).expect("Failed to create coordinator");
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.records_stored, 3);
    assert_eq!(summary.index_pages, 2);
    assert_eq!(summary.listings_discovered, 3);
    assert_eq!(summary.permanent_failures, 0);
    assert_eq!(summary.abandoned, 0);
    assert!(summary.failed.is_empty());

    assert_eq!(stored_ids(&results_path), vec!["1", "2", "3"]);

    // The document is a plain JSON array of records
    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&results_path).unwrap()).unwrap();
    let records = document.as_array().expect("Expected a JSON array");
    assert_eq!(records.len(), 3);
    for record in records {
        assert!(record["id"].is_string());
        assert!(record["url"].is_string());
        assert!(record["fields"]["title"].is_string());
    }

    // Finished sessions leave no checkpoint behind
    assert!(!session_path_for(&results_path).exists());
}

#[tokio::test]
async fn test_rerun_stores_no_duplicates() {
    let server = MockServer::start().await;
    // Each detail page is fetched once across both runs
    mount_two_page_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let first = Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.records_stored, 3);

    let second = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(second.phase, CrawlPhase::Done);
    assert_eq!(second.records_stored, 0);
    assert_eq!(second.listings_discovered, 0);

    assert_eq!(stored_ids(&results_path), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_fresh_crawl_discards_stored_records() {
    let server = MockServer::start().await;
    mount_two_page_site(&server, 2).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    let summary = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records_stored, 3);
    assert_eq!(stored_ids(&results_path).len(), 3);
}

#[tokio::test]
async fn test_resume_skips_records_already_stored() {
    let server = MockServer::start().await;
    mount_index(&server, "/list/1", &["1", "2", "3"], None).await;
    mount_detail(&server, "1", 0).await;
    mount_detail(&server, "2", 0).await;
    mount_detail(&server, "3", 1).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");

    // An earlier session stored two listings before it was killed
    {
        let mut store = JsonStore::create(&results_path).unwrap();
        for id in ["1", "2"] {
            let url = url::Url::parse(&format!("{}/s-anzeige/item/{}-1-2", server.uri(), id))
                .unwrap();
            let mut fields = ListingFields::new();
            fields.insert("title".to_string(), json!(format!("Listing {}", id)));
            let record = ListingRecord::from_ref(&ListingRef::new(id, url), fields);
            assert!(store.append(record).unwrap());
        }
    }

    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);
    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records_stored, 1);
    assert_eq!(stored_ids(&results_path), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_resume_from_checkpoint() {
    let server = MockServer::start().await;
    // The seed page was already processed by the interrupted session
    Mock::given(method("GET"))
        .and(path("/list/1"))
        .respond_with(html(index_page(&["1"], None)))
        .expect(0)
        .mount(&server)
        .await;
    mount_index(&server, "/list/3", &["9"], None).await;
    mount_detail(&server, "7", 1).await;
    mount_detail(&server, "9", 1).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let session_path = session_path_for(&results_path);

    let mut session = SessionState::new(None);
    session.last_index_page = 2;
    session.pending_index_pages.push(listing_harvester::storage::PendingIndex {
        url: url::Url::parse(&format!("{}/list/3", server.uri())).unwrap(),
        page_number: 3,
    });
    session.pending_details.push(ListingRef::new(
        "7",
        url::Url::parse(&format!("{}/s-anzeige/item/7-1-2", server.uri())).unwrap(),
    ));
    session.save(&session_path).unwrap();

    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);
    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.records_stored, 2);
    assert_eq!(summary.index_pages, 1);
    assert_eq!(stored_ids(&results_path), vec!["7", "9"]);
    assert!(!session_path.exists());
}

#[tokio::test]
async fn test_not_found_detail_is_permanent_failure() {
    let server = MockServer::start().await;
    mount_index(&server, "/list/1", &["1", "2", "3"], None).await;
    mount_detail(&server, "1", 1).await;
    mount_detail(&server, "3", 1).await;
    Mock::given(method("GET"))
        .and(path("/s-anzeige/item/2-1-2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.records_stored, 2);
    assert_eq!(summary.permanent_failures, 1);
    assert_eq!(summary.transient_events, 0);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].reason, FailureReason::PermanentFetch);
    assert!(summary.failed[0].url.ends_with("/s-anzeige/item/2-1-2"));
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let server = MockServer::start().await;
    mount_index(&server, "/list/1", &["1"], None).await;
    Mock::given(method("GET"))
        .and(path("/s-anzeige/item/1-1-2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s-anzeige/item/1-1-2"))
        .respond_with(html(detail_page("Listing 1")))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records_stored, 1);
    assert_eq!(summary.transient_events, 2);
    assert_eq!(summary.abandoned, 0);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_persistent_unavailability_is_abandoned() {
    let server = MockServer::start().await;
    mount_index(&server, "/list/1", &["1", "2"], None).await;
    mount_detail(&server, "1", 1).await;
    // 3 fetch attempts per try, 1 try plus 2 session retries
    Mock::given(method("GET"))
        .and(path("/s-anzeige/item/2-1-2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(9)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.records_stored, 1);
    assert_eq!(summary.abandoned, 1);
    assert_eq!(summary.transient_events, 9);
    assert_eq!(summary.failed[0].reason, FailureReason::Abandoned);
}

#[tokio::test]
async fn test_sponsored_listings_are_not_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list/1"))
        .respond_with(html(
            r#"<html><body>
                 <article class="aditem" data-adid="1">
                   <a class="ellipsis" href="/s-anzeige/item/1-1-2">Listing 1</a>
                   <span>TOP Anzeige</span>
                 </article>
                 <article class="aditem" data-adid="2">
                   <a class="ellipsis" href="/s-anzeige/item/2-1-2">Listing 2</a>
                 </article>
               </body></html>"#
                .to_string(),
        ))
        .mount(&server)
        .await;
    mount_detail(&server, "1", 0).await;
    mount_detail(&server, "2", 1).await;

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records_stored, 1);
    assert_eq!(stored_ids(&results_path), vec!["2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_mid_crawl_then_resume() {
    use std::time::Duration;

    let server = MockServer::start().await;
    mount_index(&server, "/list/1", &["1", "2", "3", "4"], None).await;
    for (id, delay_ms) in [("1", 200), ("2", 600), ("3", 600), ("4", 0)] {
        Mock::given(method("GET"))
            .and(path(format!("/s-anzeige/item/{}-1-2", id)))
            .respond_with(
                html(detail_page(&format!("Listing {}", id)))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("results.json");
    let session_path = session_path_for(&results_path);
    let config = create_test_config(format!("{}/list/1", server.uri()), &results_path);

    let mut coordinator = Coordinator::new(config.clone(), false).unwrap();
    let stop = coordinator.stop_handle();
    let stop_after_first_record = async {
        while !results_path.exists() || stored_ids(&results_path).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.stop();
    };
    let (summary, ()) = tokio::join!(coordinator.run(), stop_after_first_record);
    let summary = summary.unwrap();

    // Listing 1 landed first; 2 and 3 were in flight and still finish
    assert_eq!(summary.phase, CrawlPhase::Stopped);
    assert_eq!(stored_ids(&results_path), vec!["1", "2", "3"]);

    let session = SessionState::load(&session_path).unwrap().unwrap();
    assert!(session.pending_index_pages.is_empty());
    let pending: Vec<_> = session.pending_details.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(pending, vec!["4"]);

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.records_stored, 1);
    assert_eq!(stored_ids(&results_path), vec!["1", "2", "3", "4"]);
    assert!(!session_path.exists());
}
