use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use tuer_core::{CrawlError, CrawlJob, CrawlOutcome};

/// On-disk shape of a frontier snapshot. Field names are load-bearing: prior
/// snapshots must resume under this exact shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    to_crawl: Vec<String>,
    ignore_links: Vec<String>,
    found_links: Vec<String>,
}

struct Inner {
    to_crawl: VecDeque<String>,
    to_crawl_set: HashSet<String>,
    in_flight: HashSet<String>,
    visited: HashSet<String>,
    ignored: HashSet<String>,
    jobs: HashMap<String, CrawlJob>,
}

impl Inner {
    fn new() -> Self {
        Self {
            to_crawl: VecDeque::new(),
            to_crawl_set: HashSet::new(),
            in_flight: HashSet::new(),
            visited: HashSet::new(),
            ignored: HashSet::new(),
            jobs: HashMap::new(),
        }
    }

    fn known(&self, normalized: &str) -> bool {
        self.to_crawl_set.contains(normalized)
            || self.in_flight.contains(normalized)
            || self.visited.contains(normalized)
            || self.ignored.contains(normalized)
    }
}

/// The single source of truth for crawl scheduling: a strict-FIFO queue of
/// pending URLs plus the disjoint sets that track where every URL has been.
pub struct Frontier {
    inner: Mutex<Inner>,
    snapshot_path: PathBuf,
}

impl Frontier {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            snapshot_path: snapshot_path.into(),
        }
    }

    /// Canonicalize a URL: lowercase host, strip the default port for its
    /// scheme, drop the fragment, and collapse a single trailing slash.
    /// Applied twice this is a no-op (`normalize(normalize(u)) == normalize(u)`).
    pub fn normalize_url(url: &Url) -> String {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        if let Some(host) = normalized.host_str() {
            let lower = host.to_lowercase();
            let _ = normalized.set_host(Some(&lower));
        }
        let default_port = match normalized.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        };
        if normalized.port() == default_port {
            let _ = normalized.set_port(None);
        }
        let path = normalized.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            normalized.set_path(&path[..path.len() - 1]);
        }
        normalized.to_string()
    }

    /// Insert a job if its normalized URL is not already known to the
    /// frontier in any state. No-op otherwise.
    pub async fn push(&self, job: CrawlJob) -> bool {
        let normalized = Self::normalize_url(&job.url);
        let mut inner = self.inner.lock().await;
        if inner.known(&normalized) {
            return false;
        }
        inner.to_crawl_set.insert(normalized.clone());
        inner.to_crawl.push_back(normalized.clone());
        inner.jobs.insert(normalized, job);
        true
    }

    /// Push a batch, returning how many were actually enqueued after dedup.
    pub async fn push_batch(&self, jobs: Vec<CrawlJob>) -> usize {
        if jobs.is_empty() {
            return 0;
        }
        let mut inner = self.inner.lock().await;
        let mut added = 0;
        for job in jobs {
            let normalized = Self::normalize_url(&job.url);
            if inner.known(&normalized) {
                continue;
            }
            inner.to_crawl_set.insert(normalized.clone());
            inner.to_crawl.push_back(normalized.clone());
            inner.jobs.insert(normalized, job);
            added += 1;
        }
        added
    }

    /// Seeds bypass no dedup rule other than the standard one; they are
    /// pushed the same way as discovered links but are never rejected for
    /// being seeds.
    pub async fn add_seeds(&self, urls: &[String]) -> usize {
        let mut added = 0;
        for url_str in urls {
            let url = match Url::parse(url_str) {
                Ok(u) => u,
                Err(e) => {
                    warn!(url = %url_str, error = %e, "skipping unparseable seed");
                    continue;
                }
            };
            let job = CrawlJob {
                url,
                depth: 0,
                source_url: None,
                retry_count: 0,
            };
            if self.push(job).await {
                added += 1;
            }
        }
        info!(added, total = urls.len(), "seeded frontier");
        added
    }

    /// Remove and return the front of `to_crawl`, moving it to `in_flight`.
    pub async fn pop(&self) -> Result<CrawlJob, CrawlError> {
        let mut inner = self.inner.lock().await;
        let normalized = inner
            .to_crawl
            .pop_front()
            .ok_or_else(|| CrawlError::Other(anyhow::anyhow!("frontier empty")))?;
        inner.to_crawl_set.remove(&normalized);
        inner.in_flight.insert(normalized.clone());
        inner
            .jobs
            .get(&normalized)
            .cloned()
            .ok_or_else(|| CrawlError::Other(anyhow::anyhow!("missing job for {normalized}")))
    }

    pub async fn try_pop(&self) -> Option<CrawlJob> {
        self.pop().await.ok()
    }

    /// Resolve an in-flight URL to its terminal state.
    pub async fn complete(&self, url: &Url, outcome: CrawlOutcome) {
        let normalized = Self::normalize_url(url);
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&normalized);
        inner.jobs.remove(&normalized);
        match outcome {
            CrawlOutcome::Admitted => {
                inner.visited.insert(normalized);
            }
            CrawlOutcome::Ignored => {
                inner.ignored.insert(normalized);
            }
        }
    }

    /// Return every URL currently in flight to the pending queue. Used on
    /// shutdown: an in-flight URL is requeued, never marked ignored.
    pub async fn requeue_in_flight(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let in_flight: Vec<String> = inner.in_flight.drain().collect();
        let mut requeued = 0;
        for normalized in in_flight {
            if inner.to_crawl_set.insert(normalized.clone()) {
                inner.to_crawl.push_front(normalized);
                requeued += 1;
            }
        }
        requeued
    }

    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.to_crawl.is_empty()
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.to_crawl.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// True once nothing is pending and nothing is in flight: no worker can
    /// still be holding a URL that might push new links. Required before the
    /// end-of-run statistics job may run (spec's quiescence barrier).
    pub async fn is_quiescent(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.to_crawl.is_empty() && inner.in_flight.is_empty()
    }

    pub async fn visited_len(&self) -> usize {
        self.inner.lock().await.visited.len()
    }

    pub async fn ignored_len(&self) -> usize {
        self.inner.lock().await.ignored.len()
    }

    /// Serialize the frontier's sets to `snapshot_path`. Called on shutdown
    /// and periodically; in-flight URLs must already be requeued by the
    /// caller before calling this (see `requeue_in_flight`).
    pub async fn snapshot(&self) -> Result<(), CrawlError> {
        let inner = self.inner.lock().await;
        let file = SnapshotFile {
            to_crawl: inner.to_crawl.iter().cloned().collect(),
            ignore_links: inner.ignored.iter().cloned().collect(),
            found_links: inner.visited.iter().cloned().collect(),
        };
        drop(inner);
        self.write_snapshot(&file).await
    }

    async fn write_snapshot(&self, file: &SnapshotFile) -> Result<(), CrawlError> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(file).map_err(|e| CrawlError::Storage(e.to_string()))?;
        fs::write(&self.snapshot_path, json)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        debug!(path = %self.snapshot_path.display(), "wrote frontier snapshot");
        Ok(())
    }

    /// Load the snapshot file if present. Returns `false` (and leaves the
    /// frontier empty) if no snapshot exists, so the caller can fall back to
    /// the static seed list.
    pub async fn restore(&self) -> Result<bool, CrawlError> {
        if !Path::new(&self.snapshot_path).exists() {
            return Ok(false);
        }
        let bytes = fs::read(&self.snapshot_path)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        let file: SnapshotFile =
            serde_json::from_slice(&bytes).map_err(|e| CrawlError::Storage(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        for normalized in file.found_links {
            inner.visited.insert(normalized);
        }
        for normalized in file.ignore_links {
            inner.ignored.insert(normalized);
        }
        for normalized in file.to_crawl {
            if inner.known(&normalized) {
                continue;
            }
            // Restored entries carry no original job metadata beyond the URL;
            // reconstruct a depth-0 job so the worker can still fetch it.
            if let Ok(url) = Url::parse(&normalized) {
                inner.to_crawl_set.insert(normalized.clone());
                inner.to_crawl.push_back(normalized.clone());
                inner.jobs.insert(
                    normalized,
                    CrawlJob {
                        url,
                        depth: 0,
                        source_url: None,
                        retry_count: 0,
                    },
                );
            }
        }
        info!(
            pending = inner.to_crawl.len(),
            visited = inner.visited.len(),
            ignored = inner.ignored.len(),
            "restored frontier from snapshot"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(url: &str) -> CrawlJob {
        CrawlJob {
            url: Url::parse(url).unwrap(),
            depth: 0,
            source_url: None,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn push_dedupes_across_states() {
        let frontier = Frontier::new("/tmp/tuer-test-frontier-dedupe.json");
        assert!(frontier.push(job("http://ex.test/a")).await);
        assert!(!frontier.push(job("http://ex.test/a")).await);

        let popped = frontier.pop().await.unwrap();
        assert_eq!(popped.url.as_str(), "http://ex.test/a");
        // in_flight now, still known
        assert!(!frontier.push(job("http://ex.test/a")).await);

        frontier
            .complete(&popped.url, CrawlOutcome::Admitted)
            .await;
        assert!(!frontier.push(job("http://ex.test/a")).await);
    }

    #[tokio::test]
    async fn pop_is_strict_fifo() {
        let frontier = Frontier::new("/tmp/tuer-test-frontier-fifo.json");
        frontier.push(job("http://ex.test/a")).await;
        frontier.push(job("http://ex.test/b")).await;
        frontier.push(job("http://ex.test/c")).await;

        assert_eq!(frontier.pop().await.unwrap().url.as_str(), "http://ex.test/a");
        assert_eq!(frontier.pop().await.unwrap().url.as_str(), "http://ex.test/b");
        assert_eq!(frontier.pop().await.unwrap().url.as_str(), "http://ex.test/c");
        assert!(frontier.pop().await.is_err());
    }

    #[tokio::test]
    async fn normalize_is_idempotent() {
        let u = Url::parse("HTTP://Example.test:80/foo/#frag").unwrap();
        let once = Frontier::normalize_url(&u);
        let twice = Frontier::normalize_url(&Url::parse(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn snapshot_restore_round_trips() {
        let path = "/tmp/tuer-test-frontier-snapshot.json";
        let _ = std::fs::remove_file(path);
        let frontier = Frontier::new(path);
        frontier.push(job("http://ex.test/a")).await;
        frontier.push(job("http://ex.test/b")).await;
        let popped = frontier.pop().await.unwrap();
        frontier
            .complete(&popped.url, CrawlOutcome::Admitted)
            .await;
        frontier.snapshot().await.unwrap();

        let restored = Frontier::new(path);
        assert!(restored.restore().await.unwrap());
        assert_eq!(restored.pending_len().await, 1);
        assert_eq!(restored.visited_len().await, 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn quiescent_only_once_in_flight_drains() {
        let frontier = Frontier::new("/tmp/tuer-test-frontier-quiescent.json");
        frontier.push(job("http://ex.test/a")).await;
        assert!(!frontier.is_quiescent().await);
        let popped = frontier.pop().await.unwrap();
        assert!(!frontier.is_quiescent().await);
        frontier.complete(&popped.url, CrawlOutcome::Admitted).await;
        assert!(frontier.is_quiescent().await);
    }

    #[tokio::test]
    async fn requeue_in_flight_returns_to_pending() {
        let frontier = Frontier::new("/tmp/tuer-test-frontier-requeue.json");
        frontier.push(job("http://ex.test/a")).await;
        let _ = frontier.pop().await.unwrap();
        assert_eq!(frontier.pending_len().await, 0);
        let requeued = frontier.requeue_in_flight().await;
        assert_eq!(requeued, 1);
        assert_eq!(frontier.pending_len().await, 1);
    }
}
