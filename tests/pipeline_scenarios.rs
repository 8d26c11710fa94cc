//! End-to-end scenarios driving the frontier/fetcher/content-filter stages
//! together against a mock HTTP server. No real network, no Postgres: these
//! exercise the crawl-side of the pipeline (everything short of the indexer,
//! which needs a live database) the way the spec's worked examples describe.

use std::time::Duration;

use tuer_content::html::DEFAULT_EXTENSION_BLOCKLIST;
use tuer_content::{parse_html, AdmissionFilter};
use tuer_core::{CrawlJob, CrawlOutcome, FetchConfig};
use tuer_fetcher::{FetchOutcome, Fetcher};
use tuer_frontier::Frontier;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        total_timeout: Duration::from_secs(5),
        max_retries: 3,
        retry_delay: Duration::from_millis(20),
        politeness_delay: Duration::from_millis(0),
        ..FetchConfig::default()
    }
}

/// Drives one discovered URL through fetch -> parse -> admission -> link
/// push, mirroring the inline content-filter step in `src/pipeline.rs`'s
/// fetch worker, minus the indexer handoff.
async fn crawl_one(
    frontier: &Frontier,
    fetcher: &Fetcher,
    admission: &AdmissionFilter,
    job: CrawlJob,
) {
    if admission.pre_fetch_check(&job.url).is_err() {
        frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        return;
    }

    match fetcher.fetch(&job.url).await {
        FetchOutcome::RobotsDisallowed => {
            frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        }
        FetchOutcome::TransientFail(_) | FetchOutcome::PermanentFail(_) => {
            frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        }
        FetchOutcome::Ok(response) => {
            let extension_blocklist: Vec<String> =
                DEFAULT_EXTENSION_BLOCKLIST.iter().map(|s| s.to_string()).collect();
            let body = String::from_utf8_lossy(&response.body);
            let Some(parsed) = parse_html(&body, &response.final_url, &extension_blocklist) else {
                frontier.complete(&job.url, CrawlOutcome::Ignored).await;
                return;
            };
            if admission.post_fetch_check(&response.final_url, &parsed).is_err() {
                frontier.complete(&job.url, CrawlOutcome::Ignored).await;
                return;
            }
            for link in &parsed.outbound_links {
                if let Ok(url) = Url::parse(&link.url) {
                    frontier
                        .push(CrawlJob {
                            url,
                            depth: job.depth + 1,
                            source_url: Some(response.final_url.to_string()),
                            retry_count: 0,
                        })
                        .await;
                }
            }
            frontier.complete(&job.url, CrawlOutcome::Admitted).await;
        }
    }
}

async fn drain(frontier: &Frontier, fetcher: &Fetcher, admission: &AdmissionFilter) {
    while let Some(job) = frontier.try_pop().await {
        crawl_one(frontier, fetcher, admission, job).await;
    }
}

/// Scenario 1: seed with one page, one outbound link.
#[tokio::test]
async fn seed_with_one_outbound_link_admits_both_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html lang="en"><body>tübingen <a href="/b">b</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html lang="en"><body>tübingen, no further links here</body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let frontier = Frontier::new("/tmp/tuer-test-scenario1.json");
    let fetcher = Fetcher::new(fast_fetch_config(), 4).unwrap();
    let admission = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tübingen".into()]);

    frontier.add_seeds(&[format!("{}/a", server.uri())]).await;
    drain(&frontier, &fetcher, &admission).await;

    assert!(frontier.is_empty().await);
    assert!(frontier.is_quiescent().await);
    assert_eq!(frontier.visited_len().await, 2);
}

/// Scenario 2: robots disallow.
#[tokio::test]
async fn robots_disallow_ignores_the_seed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>tübingen</body></html>"))
        .mount(&server)
        .await;

    let frontier = Frontier::new("/tmp/tuer-test-scenario2.json");
    let fetcher = Fetcher::new(fast_fetch_config(), 4).unwrap();
    let admission = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tübingen".into()]);

    frontier.add_seeds(&[format!("{}/a", server.uri())]).await;
    drain(&frontier, &fetcher, &admission).await;

    assert_eq!(frontier.visited_len().await, 0);
    assert!(frontier.is_quiescent().await);
}

/// Scenario 3: language rejection — German page, no English path segment,
/// required keyword present but the language gate still rejects it.
#[tokio::test]
async fn language_mismatch_is_rejected_even_with_keyword_match() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html lang="de"><body>willkommen in tübingen, einer stadt in deutschland</body></html>"#,
        ))
        .mount(&server)
        .await;

    let frontier = Frontier::new("/tmp/tuer-test-scenario3.json");
    let fetcher = Fetcher::new(fast_fetch_config(), 4).unwrap();
    let admission = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tübingen".into()]);

    frontier.add_seeds(&[format!("{}/a", server.uri())]).await;
    drain(&frontier, &fetcher, &admission).await;

    assert_eq!(frontier.visited_len().await, 0);
    assert_eq!(frontier.ignored_len().await, 1);
}

/// Scenario 4: retry and give up — three consecutive server errors exhaust
/// `max_retries` and the URL ends up ignored, no panic, no infinite loop.
#[tokio::test]
async fn exhausted_retries_give_up_and_ignore() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let frontier = Frontier::new("/tmp/tuer-test-scenario4.json");
    let fetcher = Fetcher::new(fast_fetch_config(), 4).unwrap();
    let admission = AdmissionFilter::new(vec![], vec!["en".into()], vec!["tübingen".into()]);

    frontier.add_seeds(&[format!("{}/a", server.uri())]).await;
    drain(&frontier, &fetcher, &admission).await;

    assert_eq!(frontier.visited_len().await, 0);
    assert!(frontier.is_quiescent().await);
}

/// Scenario 6 (frontier half): a crash mid-crawl leaves a snapshot with some
/// URLs visited and some still pending; resuming from it must not re-offer
/// the already-visited URLs.
#[tokio::test]
async fn resume_from_snapshot_skips_already_visited() {
    let path = "/tmp/tuer-test-scenario6.json";
    let _ = std::fs::remove_file(path);

    let frontier = Frontier::new(path);
    frontier
        .add_seeds(&[
            "http://ex.test/a".into(),
            "http://ex.test/b".into(),
            "http://ex.test/c".into(),
        ])
        .await;
    let admitted = frontier.pop().await.unwrap();
    frontier.complete(&admitted.url, CrawlOutcome::Admitted).await;
    frontier.snapshot().await.unwrap();

    let resumed = Frontier::new(path);
    assert!(resumed.restore().await.unwrap());
    assert_eq!(resumed.visited_len().await, 1);
    assert_eq!(resumed.pending_len().await, 2);

    // The previously admitted URL must not be re-enqueued on resume.
    assert!(!resumed.push(CrawlJob {
        url: admitted.url,
        depth: 0,
        source_url: None,
        retry_count: 0,
    }).await);

    let _ = std::fs::remove_file(path);
}
