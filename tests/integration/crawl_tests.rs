//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small listing site and run the full
//! crawl cycle end-to-end: listing pages, detail pages, checkpoints, final
//! export and the run ledger.

use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use sumi_harvest::config::Config;
use sumi_harvest::crawler::{crawl, crawl_with_samplers, CrawlOptions, CrawlOutcome};
use sumi_harvest::storage::{JsonCheckpointStore, RunLedger, RunStatus};
use sumi_harvest::supervisor::{LoadSampler, RestartMarker, RESTART_EXIT_CODE};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server, writing into `dir`
fn create_test_config(server: &MockServer, dir: &Path, max_pages: u32, limit: usize) -> Config {
    let mut config = Config::default();

    config.crawler.base_url = format!("{}/search?page=", server.uri());
    config.crawler.max_pages = max_pages;
    config.crawler.limit = limit;
    config.crawler.detail_workers = 3;
    config.crawler.page_pause_ms = 0;
    config.crawler.restart_grace_secs = 0;

    config.fetch.retry_delay_min_ms = 0;
    config.fetch.retry_delay_max_ms = 0;
    config.fetch.page_settle_min_ms = 0;
    config.fetch.page_settle_max_ms = 0;
    config.fetch.detail_settle_min_ms = 0;
    config.fetch.detail_settle_max_ms = 0;
    config.fetch.page_timeout_secs = 5;
    config.fetch.detail_timeout_secs = 5;

    config.watchdog.enabled = false;

    let out = |name: &str| dir.join(name).to_string_lossy().into_owned();
    config.output.data_path = out("harvest_progress.json");
    config.output.state_path = out("harvest_state.json");
    config.output.marker_path = out("restart_flag.txt");
    config.output.final_path = out("harvest_final.json");
    config.output.database_path = out("harvest_runs.db");

    config
}

fn listing_html(page: u32, count: u32) -> String {
    let mut html = String::from("<html><head><title>Search</title></head><body>");
    for i in 1..=count {
        html.push_str(&format!(
            r#"<article>
                 <a href="/programs/{p}-{i}"><h2 class="StudyName">Program {p}-{i}</h2></a>
                 <strong class="OrganisationName">University {p}</strong>
               </article>"#,
            p = page,
            i = i
        ));
    }
    html.push_str("</body></html>");
    html
}

fn detail_html(page: u32, i: u32) -> String {
    format!(
        r#"<html><head><title>Program {p}-{i}</title></head><body>
             <h2>About</h2><p>About program {p}-{i}.</p>
             <span class="js-duration">{m} months</span>
             <article class="FactItem Disciplines"><a class="TextOnly">Physics</a></article>
           </body></html>"#,
        p = page,
        i = i,
        m = 12 + i
    )
}

/// Mounts `pages` listing pages with `per_page` listings each, plus their detail pages
async fn mount_site(server: &MockServer, pages: u32, per_page: u32) {
    for page in 1..=pages {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(page, per_page)))
            .mount(server)
            .await;

        for i in 1..=per_page {
            Mock::given(method("GET"))
                .and(path(format!("/programs/{}-{}", page, i)))
                .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(page, i)))
                .mount(server)
                .await;
        }
    }
}

async fn requests_to(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

/// Reports the same load on every sample
struct FixedLoad(f32);

impl LoadSampler for FixedLoad {
    fn sample(&mut self) -> f32 {
        self.0
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_full_crawl_exports_every_record() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 3).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 2, 100);

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.scraped_count, 6);
    assert_eq!(report.current_page, 3);

    let exported = read_json(&dir.path().join("harvest_final.json"));
    let rows = exported.as_array().unwrap();
    assert_eq!(rows.len(), 6);

    let row = rows
        .iter()
        .find(|row| row["Title"] == "Program 2-3")
        .unwrap();
    assert_eq!(row["Parent"], "University 2");
    assert_eq!(row["Duration"], "15 months");
    assert_eq!(row["About"], "About program 2-3.");
    assert_eq!(row["Disciplines"], serde_json::json!(["Physics"]));
    assert_eq!(row["Tuition Fee"], "");
    assert!(row["Key"].as_str().unwrap().ends_with("/programs/2-3"));

    let columns: Vec<&String> = row.as_object().unwrap().keys().take(4).collect();
    assert_eq!(columns, vec!["Key", "Title", "Parent", "Link"]);

    let state = read_json(&dir.path().join("harvest_state.json"));
    assert_eq!(state["current_page"], 3);
    assert_eq!(state["scraped_count"], 6);

    let ledger = RunLedger::open(&dir.path().join("harvest_runs.db")).unwrap();
    let run = ledger.get_run(report.run_id.unwrap()).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.scraped_count, 6);
    assert_eq!(ledger.count_records().unwrap(), 6);
}

#[tokio::test]
async fn test_limit_stops_partway_through_second_page() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 3).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 2, 4);

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.scraped_count, 4);
    assert_eq!(report.current_page, 3);

    let data = read_json(&dir.path().join("harvest_progress.json"));
    assert_eq!(data.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_failed_detail_page_is_dropped() {
    let server = MockServer::start().await;
    // Mounted first so it takes precedence over the site's detail mock
    Mock::given(method("GET"))
        .and(path("/programs/1-2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_site(&server, 2, 3).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 2, 100);

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.scraped_count, 5);
    assert_eq!(requests_to(&server, "/programs/1-2").await, 3);
}

#[tokio::test]
async fn test_error_page_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/programs/1-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><title>Error | Site</title></html>"),
        )
        .mount(&server)
        .await;
    mount_site(&server, 1, 2).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 1, 100);

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.scraped_count, 1);
    assert_eq!(requests_to(&server, "/programs/1-1").await, 1);
}

#[tokio::test]
async fn test_resume_does_not_refetch_collected_records() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 3).await;
    let dir = TempDir::new().unwrap();

    let first = crawl(
        create_test_config(&server, dir.path(), 1, 100),
        CrawlOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(first.scraped_count, 3);
    assert_eq!(first.current_page, 2);

    let second = crawl(
        create_test_config(&server, dir.path(), 2, 100),
        CrawlOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(second.scraped_count, 6);
    assert_eq!(second.current_page, 3);
    assert_eq!(requests_to(&server, "/programs/1-1").await, 1);

    let exported = read_json(&dir.path().join("harvest_final.json"));
    let mut keys: Vec<&str> = exported
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["Key"].as_str().unwrap())
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 6);

    let ledger = RunLedger::open(&dir.path().join("harvest_runs.db")).unwrap();
    let runs = ledger.recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].start_page, 2);
}

#[tokio::test]
async fn test_fresh_start_ignores_checkpoint() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 2).await;
    let dir = TempDir::new().unwrap();

    crawl(
        create_test_config(&server, dir.path(), 1, 100),
        CrawlOptions::default(),
    )
    .await
    .unwrap();

    let report = crawl(
        create_test_config(&server, dir.path(), 1, 100),
        CrawlOptions {
            fresh: true,
            ..CrawlOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.scraped_count, 2);
    assert_eq!(requests_to(&server, "/programs/1-1").await, 2);
}

#[tokio::test]
async fn test_restart_marker_is_consumed() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 1).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 1, 100);

    let marker = RestartMarker::new(dir.path().join("restart_flag.txt"));
    marker.write().unwrap();

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_unreadable_state_file_starts_over() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 2).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 1, 100);

    std::fs::write(dir.path().join("harvest_progress.json"), "[]").unwrap();
    std::fs::write(dir.path().join("harvest_state.json"), "not json").unwrap();

    let report = crawl(config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.scraped_count, 2);
    let store = JsonCheckpointStore::new(
        dir.path().join("harvest_progress.json"),
        dir.path().join("harvest_state.json"),
    );
    let state = store.read_state().unwrap().unwrap();
    assert_eq!(state.current_page, 2);
    assert_eq!(state.scraped_count, 2);
}

#[tokio::test]
async fn test_zero_budget_stops_before_first_page() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 1).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 1, 100);

    let report = crawl(
        config,
        CrawlOptions {
            runtime_budget: Some(Duration::ZERO),
            ..CrawlOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::BudgetExceeded);
    assert_eq!(report.scraped_count, 0);
    assert!(dir.path().join("harvest_state.json").exists());
    assert!(dir.path().join("harvest_final.json").exists());
}

#[tokio::test]
async fn test_sustained_overload_forces_restart() {
    let server = MockServer::start().await;
    // The listing page hangs long enough for the watchdog to trip first
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_html(1, 2))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, dir.path(), 1, 100);
    config.fetch.page_timeout_secs = 60;
    config.watchdog.enabled = true;
    config.watchdog.threshold_percent = 99.0;
    config.watchdog.sustain_samples = 15;
    config.watchdog.sample_interval_ms = 20;

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        crawl_with_samplers(
            config,
            CrawlOptions::default(),
            FixedLoad(99.5),
            Box::new(FixedLoad(5.0)),
        ),
    )
    .await
    .expect("watchdog never stopped the crawl")
    .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::WatchdogRestart);
    assert_eq!(report.outcome.exit_code(), RESTART_EXIT_CODE);
    assert_eq!(RESTART_EXIT_CODE, 75);
    assert_eq!(report.current_page, 1);

    let state = read_json(&dir.path().join("harvest_state.json"));
    assert_eq!(state["current_page"], 1);
    assert_eq!(state["scraped_count"], 0);
    assert!(RestartMarker::new(dir.path().join("restart_flag.txt")).exists());
    assert!(!dir.path().join("harvest_final.json").exists());

    let ledger = RunLedger::open(&dir.path().join("harvest_runs.db")).unwrap();
    let run = ledger.get_run(report.run_id.unwrap()).unwrap();
    assert_eq!(run.status, RunStatus::WatchdogRestart);
}

#[tokio::test]
async fn test_watchdog_below_threshold_lets_crawl_finish() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 2).await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, dir.path(), 1, 100);
    config.watchdog.enabled = true;
    config.watchdog.sample_interval_ms = 10;

    let report = crawl_with_samplers(
        config,
        CrawlOptions::default(),
        FixedLoad(50.0),
        Box::new(FixedLoad(50.0)),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.scraped_count, 2);
    assert!(!RestartMarker::new(dir.path().join("restart_flag.txt")).exists());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_crawling() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, dir.path(), 1, 100);
    config.crawler.max_pages = u32::MAX;

    assert!(crawl(config, CrawlOptions::default()).await.is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
