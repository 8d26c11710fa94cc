use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use tuer_core::{CrawlError, FetchConfig, FetchResponse};

/// Outcome of a fetch attempt, already classified per the fetcher's transient
/// vs permanent error taxonomy.
#[derive(Debug)]
pub enum FetchOutcome {
    Ok(FetchResponse),
    TransientFail(CrawlError),
    PermanentFail(CrawlError),
    RobotsDisallowed,
}

/// Bounded-concurrency HTTP client with retries, per-host robots.txt
/// compliance, per-host politeness delay, and user-agent rotation.
pub struct Fetcher {
    client: Client,
    semaphore: Arc<Semaphore>,
    config: FetchConfig,
    ua_counter: AtomicUsize,
    robots_cache: DashMap<String, Option<Arc<String>>>,
    last_request_at: DashMap<String, Instant>,
}

impl Fetcher {
    pub fn new(config: FetchConfig, max_concurrency: usize) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| CrawlError::Config(e.to_string()))?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            config,
            ua_counter: AtomicUsize::new(0),
            robots_cache: DashMap::new(),
            last_request_at: DashMap::new(),
        })
    }

    fn host_key(url: &Url) -> String {
        format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
    }

    /// Block until at least `politeness_delay` has elapsed since the last
    /// request to this host. A no-op the first time a host is seen.
    async fn wait_for_politeness(&self, url: &Url) {
        let key = Self::host_key(url);
        let wait = self
            .last_request_at
            .get(&key)
            .map(|last| self.config.politeness_delay.saturating_sub(last.elapsed()))
            .unwrap_or_default();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_request_at.insert(key, Instant::now());
    }

    fn next_user_agent(&self) -> &str {
        if self.config.user_agents.is_empty() {
            return "tuer/0.1";
        }
        let idx = self.ua_counter.fetch_add(1, Ordering::Relaxed) % self.config.user_agents.len();
        &self.config.user_agents[idx]
    }

    /// Fetch and cache `robots.txt` for the URL's origin. A fetch failure is
    /// treated as allow (fail-open) but logged, since this is the single
    /// most likely source of unintended crawling.
    async fn robots_body(&self, url: &Url) -> Option<Arc<String>> {
        let origin = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );
        if let Some(cached) = self.robots_cache.get(&origin) {
            return cached.clone();
        }
        let robots_url = format!("{origin}/robots.txt");
        let body = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok().map(Arc::new),
            Ok(resp) => {
                debug!(url = %robots_url, status = %resp.status(), "robots.txt not available, allowing");
                None
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt fetch failed, failing open");
                None
            }
        };
        self.robots_cache.insert(origin, body.clone());
        body
    }

    /// True if `user_agent` (the fetcher's own wildcard `*` policy) may
    /// fetch `url`. Absence of a robots.txt is allow.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        match self.robots_body(url).await {
            Some(body) => DefaultMatcher::default().one_agent_allowed_by_robots(&body, "*", url.as_str()),
            None => true,
        }
    }

    /// Fetch a single URL, retrying transient failures with exponential
    /// backoff up to `max_retries` attempts.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        if !self.is_allowed(url).await {
            return FetchOutcome::RobotsDisallowed;
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(response) => return FetchOutcome::Ok(response),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt);
                    warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "transient fetch failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => return FetchOutcome::TransientFail(err),
                Err(err) => return FetchOutcome::PermanentFail(err),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchResponse, CrawlError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CrawlError::Other(anyhow::anyhow!(e)))?;

        self.wait_for_politeness(url).await;

        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", self.next_user_agent())
            .header("Accept-Language", "en-US,en;q=0.9,de;q=0.8")
            .header("Connection", "keep-alive")
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let final_url = response.url().clone();
        let mut headers = std::collections::HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        if status.is_server_error() {
            return Err(CrawlError::Network(format!("server error: {status}")));
        }
        if status.is_client_error() {
            return Err(CrawlError::PermanentNetwork(format!("client error: {status}")));
        }

        let body = response.bytes().await.map_err(classify_reqwest_error)?;
        if body.len() > self.config.max_body_size {
            return Err(CrawlError::BodyTooLarge {
                size: body.len(),
                max: self.config.max_body_size,
            });
        }

        Ok(FetchResponse {
            requested_url: url.clone(),
            final_url,
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> CrawlError {
    if error.is_timeout() || error.is_connect() {
        CrawlError::Network(error.to_string())
    } else if error.is_status() {
        CrawlError::InvalidUrl(error.to_string())
    } else {
        CrawlError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_rotates_round_robin() {
        let config = FetchConfig {
            user_agents: vec!["a".into(), "b".into(), "c".into()],
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config, 4).unwrap();
        let seen: Vec<_> = (0..6).map(|_| fetcher.next_user_agent().to_string()).collect();
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn politeness_delay_is_per_host() {
        let config = FetchConfig {
            politeness_delay: Duration::from_millis(50),
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config, 4).unwrap();
        let a = Url::parse("http://ex.test/a").unwrap();
        let b = Url::parse("http://other.test/b").unwrap();

        let start = Instant::now();
        fetcher.wait_for_politeness(&a).await;
        fetcher.wait_for_politeness(&a).await;
        assert!(start.elapsed() >= Duration::from_millis(50));

        // A different host is not throttled by `a`'s last-request time.
        let start = Instant::now();
        fetcher.wait_for_politeness(&b).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
