use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use tuer_core::{CrawlError, ParsedDocument};

const XZ_PRESET: u32 = 6;

/// What the persister actually stores per URL: the parsed tree plus enough
/// metadata to replay it into the indexer without refetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlob {
    pub url: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub parsed: ParsedDocument,
}

/// Stores and replays compressed raw parse trees, keyed by canonical URL, so
/// tokenization/indexing/ranking can be rebuilt offline without recrawling.
#[derive(Clone)]
pub struct Persister {
    pool: PgPool,
}

impl Persister {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CrawlError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        info!("persister migrations complete");
        Ok(())
    }

    pub async fn store(&self, blob: &RawBlob) -> Result<(), CrawlError> {
        let compressed = compress(blob)?;
        sqlx::query(
            "INSERT INTO crawled (link, content) VALUES ($1, $2)
             ON CONFLICT (link) DO UPDATE SET content = EXCLUDED.content, stored_at = now()",
        )
        .bind(&blob.url)
        .bind(compressed)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Replay every stored blob. Used by the loader to rebuild the index
    /// from raw pages without recrawling.
    pub async fn load_all(&self) -> Result<Vec<RawBlob>, CrawlError> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as("SELECT content FROM crawled")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|(content,)| decompress(&content))
            .collect()
    }
}

fn compress(blob: &RawBlob) -> Result<Vec<u8>, CrawlError> {
    let serialized = bincode::serialize(blob).map_err(|e| CrawlError::Storage(e.to_string()))?;
    let mut encoder = XzEncoder::new(Vec::new(), XZ_PRESET);
    encoder
        .write_all(&serialized)
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
    encoder.finish().map_err(|e| CrawlError::Storage(e.to_string()))
}

fn decompress(compressed: &[u8]) -> Result<RawBlob, CrawlError> {
    let mut decoder = XzDecoder::new(compressed);
    let mut serialized = Vec::new();
    decoder
        .read_to_end(&mut serialized)
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
    bincode::deserialize(&serialized).map_err(|e| CrawlError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_compression() {
        let blob = RawBlob {
            url: "http://ex.test/a".to_string(),
            fetched_at: chrono::Utc::now(),
            parsed: ParsedDocument {
                title: Some("Title".to_string()),
                main_text: "hello tübingen world".to_string(),
                ..Default::default()
            },
        };
        let compressed = compress(&blob).unwrap();
        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored.url, blob.url);
        assert_eq!(restored.parsed.main_text, blob.parsed.main_text);
    }
}
