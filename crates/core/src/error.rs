use thiserror::Error;

/// Errors grouped by how a caller should react: transient network failures
/// are worth a retry, everything else is not.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("permanent failure: {0}")]
    PermanentNetwork(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("disallowed by robots.txt")]
    RobotsDisallowed,

    #[error("rejected by admission filter: {0}")]
    Admission(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// True for errors the fetcher should retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::Network(_) | CrawlError::Timeout(_))
    }
}
