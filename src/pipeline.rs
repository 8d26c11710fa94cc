//! Stage wiring for the crawl pipeline: Frontier -> Fetcher -> Content Filter
//! -> (Persister + Indexer + Tokenizer), with a statistics job run once the
//! pipeline is quiescent. Stages communicate by message passing: fetch
//! workers own the frontier and the content filter inline (both need the
//! fetched body synchronously); admitted pages are handed to a single
//! downstream indexer task over an inbox, mirroring the teacher's
//! single-consumer storage task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use url::Url;

use tuer_content::{parse_html, AdmissionFilter};
use tuer_core::{AppConfig, CrawlJob, CrawlOutcome, ParsedDocument};
use tuer_fetcher::{FetchOutcome, Fetcher};
use tuer_frontier::Frontier;
use tuer_index::{Index, Tokenizer};
use tuer_persister::{Persister, RawBlob};

/// A page that passed admission, handed from a fetch worker to the indexer
/// stage. The indexer stage owns resolving the frontier's terminal state for
/// `url` once it has actually been persisted and indexed.
struct AdmittedPage {
    url: Url,
    parsed: ParsedDocument,
}

/// Process exit reason, used to pick the exit code the spec requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Drained,
    MaxPages,
    Signal,
    StorageFailure,
}

pub async fn run_crawl(
    config: AppConfig,
    seeds_arg: Option<String>,
    seed_arg: Option<String>,
    max_depth_override: Option<u32>,
) -> Result<i32> {
    let max_depth = max_depth_override.unwrap_or(config.general.max_depth);
    let max_pages = config.general.max_pages;

    let frontier = Arc::new(Frontier::new(config.frontier.snapshot_path.clone()));
    if !frontier.restore().await? {
        let mut seeds: Vec<String> = config.general.seeds.clone();
        if let Some(single) = seed_arg {
            seeds.push(single);
        }
        if let Some(list) = seeds_arg {
            if std::path::Path::new(&list).exists() {
                let content = std::fs::read_to_string(&list)?;
                seeds.extend(content.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from));
            } else {
                seeds.extend(list.split(',').map(|s| s.trim().to_string()));
            }
        }
        if seeds.is_empty() {
            seeds.extend(crate::seeds::DEFAULT_SEEDS.iter().map(|s| s.to_string()));
            info!("no seeds configured, falling back to built-in seed list");
        }
        frontier.add_seeds(&seeds).await;
    }

    let fetch_config = tuer_core::FetchConfig {
        connect_timeout: Duration::from_secs(config.fetcher.connect_timeout_seconds),
        read_timeout: Duration::from_secs(config.fetcher.read_timeout_seconds),
        total_timeout: Duration::from_secs(config.fetcher.total_timeout_seconds),
        max_body_size: config.fetcher.max_body_size_mb * 1024 * 1024,
        max_retries: config.fetcher.max_retries,
        retry_delay: Duration::from_secs(config.fetcher.retry_delay_seconds),
        politeness_delay: Duration::from_secs(config.fetcher.politeness_delay_seconds),
        user_agents: if config.fetcher.user_agents.is_empty() {
            tuer_core::FetchConfig::default().user_agents
        } else {
            config.fetcher.user_agents.clone()
        },
    };
    let fetcher = Arc::new(Fetcher::new(fetch_config, config.fetcher.max_concurrency)?);
    let admission = Arc::new(AdmissionFilter::new(
        config.content.domain_blocklist.clone(),
        config.content.allowed_languages.clone(),
        config.content.required_keywords.clone(),
    ));
    let extension_blocklist = Arc::new(config.content.extension_blocklist.clone());

    let pool_size = (config.fetcher.max_concurrency as u32 + 5).max(10);
    let persister = Persister::connect(&config.database.postgres_url, pool_size).await?;
    persister.run_migrations().await?;
    let index = Index::connect(&config.database.postgres_url, pool_size).await?;
    index.run_migrations().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (index_tx, index_rx) = mpsc::unbounded_channel::<AdmittedPage>();
    let admitted_count = Arc::new(AtomicU64::new(index.document_count().await?.max(0) as u64));
    let stop_reason: Arc<std::sync::Mutex<Option<StopReason>>> = Arc::new(std::sync::Mutex::new(None));

    // Statistics/indexer stage: the single writer for documents/postings, so
    // it also owns deciding when max_pages has been reached.
    let indexer_handle = {
        let frontier = Arc::clone(&frontier);
        let mut shutdown = shutdown_rx.clone();
        let shutdown_tx = shutdown_tx.clone();
        let admitted_count = Arc::clone(&admitted_count);
        let stop_reason = Arc::clone(&stop_reason);
        let persister = persister.clone();
        let index = index.clone();
        tokio::spawn(async move {
            let tokenizer = Tokenizer::new();
            let mut index_rx = index_rx;
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            // Best-effort drain with a short timeout, then stop.
                            let drain_deadline = tokio::time::sleep(Duration::from_secs(2));
                            tokio::pin!(drain_deadline);
                            loop {
                                tokio::select! {
                                    Some(page) = index_rx.recv() => {
                                        let _ = index_one(&persister, &index, &tokenizer, &frontier, page, &admitted_count).await;
                                    }
                                    _ = &mut drain_deadline => break,
                                    else => break,
                                }
                            }
                            break;
                        }
                    }
                    page = index_rx.recv() => {
                        let Some(page) = page else { break };
                        if index_one(&persister, &index, &tokenizer, &frontier, page, &admitted_count).await.is_err() {
                            // Storage failure is fatal for the current run: stop
                            // accepting work, snapshot, and exit non-zero.
                            *stop_reason.lock().unwrap() = Some(StopReason::StorageFailure);
                            let _ = shutdown_tx.send(true);
                            break;
                        }
                        if admitted_count.load(Ordering::SeqCst) >= max_pages {
                            info!(max_pages, "max_pages reached, shutting down");
                            *stop_reason.lock().unwrap() = Some(StopReason::MaxPages);
                            let _ = shutdown_tx.send(true);
                        }
                    }
                }
            }
        })
    };

    let worker_count = config.fetcher.max_concurrency.max(1);
    info!(worker_count, max_depth, max_pages, "spawning crawl workers");
    let mut worker_handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let frontier = Arc::clone(&frontier);
        let fetcher = Arc::clone(&fetcher);
        let admission = Arc::clone(&admission);
        let extension_blocklist = Arc::clone(&extension_blocklist);
        let index_tx = index_tx.clone();
        let mut shutdown = shutdown_rx.clone();
        let max_depth = max_depth;

        worker_handles.push(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let Some(job) = frontier.try_pop().await else {
                    if frontier.is_quiescent().await {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                };

                if let Err(e) = admission.pre_fetch_check(&job.url) {
                    info!(worker_id, url = %job.url, reason = %e, "pre-fetch admission rejected");
                    frontier.complete(&job.url, CrawlOutcome::Ignored).await;
                    continue;
                }

                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        // Cancelled mid-flight: leave the URL in_flight so
                        // the coordinator's requeue_in_flight() picks it up.
                        break;
                    }
                    outcome = fetcher.fetch(&job.url) => {
                        handle_fetch_outcome(
                            worker_id, job, outcome, &frontier, &admission, &extension_blocklist,
                            &index_tx, max_depth,
                        ).await;
                    }
                }
            }
        }));
    }

    // Periodic snapshot, independent of shutdown.
    let snapshot_handle = {
        let frontier = Arc::clone(&frontier);
        let mut shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(config.frontier.snapshot_interval_seconds.max(1));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = frontier.snapshot().await {
                            warn!(error = %e, "periodic snapshot failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    // Drain watcher: polls for quiescence independently of the workers so the
    // coordinator below can select on a single owned future per branch.
    let drain_handle = {
        let frontier = Arc::clone(&frontier);
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    return;
                }
                if frontier.is_quiescent().await {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = shutdown.changed() => return,
                }
            }
        })
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            *stop_reason.lock().unwrap() = Some(StopReason::Signal);
            let _ = shutdown_tx.send(true);
        }
        _ = drain_handle => {
            info!("frontier drained");
            stop_reason.lock().unwrap().get_or_insert(StopReason::Drained);
            let _ = shutdown_tx.send(true);
        }
    }

    for handle in worker_handles {
        let _ = handle.await;
    }
    drop(index_tx);
    let _ = indexer_handle.await;
    let _ = snapshot_handle.await;

    // Quiescence barrier: every stage has drained before statistics run.
    let requeued = frontier.requeue_in_flight().await;
    if requeued > 0 {
        info!(requeued, "requeued in-flight URLs on shutdown");
    }
    frontier.snapshot().await?;

    let reason = stop_reason.lock().unwrap().unwrap_or(StopReason::Drained);
    if reason == StopReason::StorageFailure {
        warn!("crawl stopped due to a fatal storage failure; skipping idf rebuild");
        return Ok(1);
    }
    if reason != StopReason::Signal {
        index.recompute_idf().await?;
        info!(
            documents = index.document_count().await?,
            "crawl complete, idf table rebuilt"
        );
    }

    Ok(if reason == StopReason::Signal { 130 } else { 0 })
}

async fn handle_fetch_outcome(
    worker_id: usize,
    job: CrawlJob,
    outcome: FetchOutcome,
    frontier: &Arc<Frontier>,
    admission: &Arc<AdmissionFilter>,
    extension_blocklist: &Arc<Vec<String>>,
    index_tx: &mpsc::UnboundedSender<AdmittedPage>,
    max_depth: u32,
) {
    let response = match outcome {
        FetchOutcome::Ok(response) => response,
        FetchOutcome::RobotsDisallowed => {
            info!(worker_id, url = %job.url, "disallowed by robots.txt");
            frontier.complete(&job.url, CrawlOutcome::Ignored).await;
            return;
        }
        FetchOutcome::TransientFail(e) | FetchOutcome::PermanentFail(e) => {
            warn!(worker_id, url = %job.url, error = %e, "fetch failed, ignoring for this run");
            frontier.complete(&job.url, CrawlOutcome::Ignored).await;
            return;
        }
    };

    let is_html = response
        .content_type
        .as_deref()
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(true);
    if !is_html {
        frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        return;
    }

    let body = String::from_utf8_lossy(&response.body);
    let Some(parsed) = parse_html(&body, &response.final_url, extension_blocklist) else {
        info!(worker_id, url = %job.url, "html parse failure");
        frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        return;
    };

    if let Err(e) = admission.post_fetch_check(&response.final_url, &parsed) {
        info!(worker_id, url = %job.url, reason = %e, "post-fetch admission rejected");
        frontier.complete(&job.url, CrawlOutcome::Ignored).await;
        return;
    }

    // Content filter's own job: enqueue newly discovered URLs before handing
    // off to the indexer stage.
    if job.depth < max_depth {
        let mut batch = Vec::with_capacity(parsed.outbound_links.len());
        for link in &parsed.outbound_links {
            if let Ok(url) = Url::parse(&link.url) {
                batch.push(CrawlJob {
                    url,
                    depth: job.depth + 1,
                    source_url: Some(response.final_url.to_string()),
                    retry_count: 0,
                });
            }
        }
        frontier.push_batch(batch).await;
    }

    let _ = index_tx.send(AdmittedPage {
        url: response.final_url,
        parsed,
    });
}

/// Persist and index one admitted page. `Err` means a storage failure the
/// spec classifies as fatal for the current run (§7): the caller stops the
/// pipeline rather than silently dropping the document.
async fn index_one(
    persister: &Persister,
    index: &Index,
    tokenizer: &Tokenizer,
    frontier: &Arc<Frontier>,
    page: AdmittedPage,
    admitted_count: &Arc<AtomicU64>,
) -> Result<(), ()> {
    let AdmittedPage { url, parsed } = page;
    let url_str = url.to_string();

    if let Err(e) = persister
        .store(&RawBlob {
            url: url_str.clone(),
            fetched_at: Utc::now(),
            parsed: parsed.clone(),
        })
        .await
    {
        warn!(url = %url, error = %e, "failed to persist raw blob, run is fatal");
        return Err(());
    }

    let doc_id = match index
        .upsert_document(
            &url_str,
            parsed.title.as_deref().unwrap_or(""),
            parsed.description.as_deref().unwrap_or(""),
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(url = %url, error = %e, "failed to upsert document, run is fatal");
            return Err(());
        }
    };

    let source_text = format!(
        "{} {} {} {}",
        parsed.main_text,
        parsed.alt_texts.join(" "),
        parsed.description.as_deref().unwrap_or(""),
        parsed.title.as_deref().unwrap_or(""),
    );
    let tokens = tokenizer.tokenize(&source_text);
    if let Err(e) = index.record_tokens(doc_id, &tokens).await {
        warn!(url = %url, error = %e, "failed to record postings, run is fatal");
        return Err(());
    }

    admitted_count.fetch_add(1, Ordering::SeqCst);
    frontier.complete(&url, CrawlOutcome::Admitted).await;
    Ok(())
}
