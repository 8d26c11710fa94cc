use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub fetcher: FetcherConfig,
    pub content: ContentConfig,
    pub database: DatabaseConfig,
    pub frontier: FrontierConfig,
    pub ranker: RankerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    pub data_dir: String,
    pub max_depth: u32,
    pub max_pages: u64,
    pub seeds: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_total_timeout_seconds")]
    pub total_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_politeness_delay_seconds")]
    pub politeness_delay_seconds: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,
    #[serde(default)]
    pub user_agents: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default)]
    pub domain_blocklist: Vec<String>,
    #[serde(default = "default_extension_blocklist")]
    pub extension_blocklist: Vec<String>,
    #[serde(default = "default_allowed_languages")]
    pub allowed_languages: Vec<String>,
    pub required_keywords: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_snapshot_interval_seconds")]
    pub snapshot_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankerConfig {
    #[serde(default = "default_expansion_n")]
    pub expansion_n: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_embeddings_path")]
    pub embeddings_path: String,
}

fn default_connect_timeout_seconds() -> u64 {
    5
}
fn default_read_timeout_seconds() -> u64 {
    5
}
fn default_total_timeout_seconds() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_seconds() -> u64 {
    1
}
fn default_politeness_delay_seconds() -> u64 {
    1
}
fn default_max_concurrency() -> usize {
    10
}
fn default_max_body_size_mb() -> usize {
    10
}
fn default_extension_blocklist() -> Vec<String> {
    [
        "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "csv", "zip", "tar", "gz", "rar",
        "7z", "mp3", "wav", "mp4", "avi", "mkv", "mov", "jpg", "jpeg", "png", "gif", "svg",
        "webp", "bmp", "ico",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_allowed_languages() -> Vec<String> {
    ["en", "en-gb", "en-us", "english"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_snapshot_path() -> String {
    "crawler_states/global.json".to_string()
}
fn default_snapshot_interval_seconds() -> u64 {
    30
}
fn default_expansion_n() -> f64 {
    7.0
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_embeddings_path() -> String {
    "data/embeddings.tsv".to_string()
}
