use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Per-request fetch tuning, shared between the fetcher and the pipeline that
/// configures it.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub total_timeout: Duration,
    pub max_body_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Minimum spacing between two requests to the same host.
    pub politeness_delay: Duration,
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(10),
            max_body_size: 10 * 1024 * 1024,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            politeness_delay: Duration::from_secs(1),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15".to_string(),
            ],
        }
    }
}

/// Outcome of a single fetch attempt, independent of the crawl job it served.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub requested_url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

/// A unit of pending crawl work.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub url: Url,
    pub depth: u32,
    pub source_url: Option<String>,
    pub retry_count: u32,
}

/// How a URL was resolved by the content filter's admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    Admitted,
    Ignored,
}

/// Narrow view over a parsed HTML document, kept independent of whichever
/// parser tree type produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub title: Option<String>,
    pub description: Option<String>,
    pub html_lang: Option<String>,
    pub xml_lang: Option<String>,
    pub main_text: String,
    pub alt_texts: Vec<String>,
    pub outbound_links: Vec<ExtractedLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub url: String,
    pub anchor_text: Option<String>,
}
