pub mod tokenizer;

use std::collections::HashMap;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use tuer_core::CrawlError;

pub use tokenizer::Tokenizer;

/// Owns the document/term/posting/IDF tables and the tokenizer that feeds
/// them. The indexer assigns document ids; the tokenizer turns parsed text
/// into the token stream that updates postings.
#[derive(Clone)]
pub struct Index {
    pool: PgPool,
}

impl Index {
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
        info!("index migrations complete");
        Ok(())
    }

    /// Assign a document id (or reuse the existing one for this URL) and
    /// persist `(id, url, title, description)` atomically.
    pub async fn upsert_document(
        &self,
        url: &str,
        title: &str,
        description: &str,
    ) -> Result<i64, CrawlError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO documents (link, title, description)
             VALUES ($1, $2, $3)
             ON CONFLICT (link) DO UPDATE SET link = EXCLUDED.link
             RETURNING id",
        )
        .bind(url)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row.0)
    }

    /// Record a document's token stream: bump `PostingCount[(doc, word)]`
    /// for each occurrence, grow `words` as new terms are seen, and set the
    /// document's `token_count`.
    pub async fn record_tokens(&self, doc_id: i64, tokens: &[String]) -> Result<(), CrawlError> {
        let counts = count_tokens(tokens);
        let words: Vec<&str> = counts.keys().copied().collect();

        let word_ids = self.upsert_words(&words).await?;

        let mut doc_ids = Vec::with_capacity(counts.len());
        let mut posting_word_ids = Vec::with_capacity(counts.len());
        let mut amounts = Vec::with_capacity(counts.len());
        for (word, amount) in &counts {
            let word_id = word_ids[*word];
            doc_ids.push(doc_id);
            posting_word_ids.push(word_id);
            amounts.push(*amount);
        }

        if !doc_ids.is_empty() {
            sqlx::query(
                "INSERT INTO tfs (doc, word, amount)
                 SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[])
                 ON CONFLICT (doc, word) DO UPDATE SET amount = EXCLUDED.amount",
            )
            .bind(&doc_ids)
            .bind(&posting_word_ids)
            .bind(&amounts)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        }

        sqlx::query("UPDATE documents SET token_count = $2 WHERE id = $1")
            .bind(doc_id)
            .bind(tokens.len() as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn upsert_words<'a>(&self, words: &[&'a str]) -> Result<HashMap<&'a str, i64>, CrawlError> {
        if words.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "INSERT INTO words (word)
             SELECT * FROM UNNEST($1::text[])
             ON CONFLICT (word) DO UPDATE SET word = EXCLUDED.word
             RETURNING id, word",
        )
        .bind(words)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;

        let by_text: HashMap<String, i64> = rows.into_iter().map(|(id, w)| (w, id)).collect();
        Ok(words
            .iter()
            .filter_map(|w| by_text.get(*w).map(|id| (*w, *id)))
            .collect())
    }

    /// Rebuild the whole IDF table from scratch: `idf(t) = log(N / df(t))`.
    /// Terms with `df = 0` never appear in `tfs` and are therefore absent
    /// here too, which is the guard against the undefined `log(N/0)` case.
    /// Must run only once the crawl has fully drained (quiescent state).
    pub async fn recompute_idf(&self) -> Result<(), CrawlError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;

        sqlx::query("TRUNCATE idfs")
            .execute(&mut *tx)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO idfs (word, idf)
             SELECT tfs.word, LOG(docs.n::double precision / COUNT(DISTINCT tfs.doc))
             FROM tfs, (SELECT COUNT(*)::bigint AS n FROM documents) AS docs
             GROUP BY tfs.word, docs.n",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| CrawlError::Storage(e.to_string()))?;
        info!("idf table rebuilt");
        Ok(())
    }

    pub async fn document_count(&self) -> Result<i64, CrawlError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row.0)
    }

    pub async fn average_token_count(&self) -> Result<f64, CrawlError> {
        let row: (Option<f64>,) = sqlx::query_as("SELECT AVG(token_count)::double precision FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row.0.unwrap_or(0.0))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Tally occurrences per token; the sum of the returned counts always equals
/// `tokens.len()`, which is the posting-sum invariant `record_tokens` writes
/// into `tfs`.
fn count_tokens(tokens: &[String]) -> HashMap<&str, i64> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_counts_sum_to_token_count() {
        let tokens: Vec<String> = ["a", "b", "a", "c", "a", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let counts = count_tokens(&tokens);
        assert_eq!(counts.values().sum::<i64>(), tokens.len() as i64);
        assert_eq!(counts["a"], 3);
        assert_eq!(counts["b"], 2);
        assert_eq!(counts["c"], 1);
    }

    #[test]
    fn posting_counts_cover_every_distinct_word_once() {
        let tokens: Vec<String> = ["x", "y", "x"].iter().map(|s| s.to_string()).collect();
        let counts = count_tokens(&tokens);
        assert_eq!(counts.len(), 2);
    }

    /// Mirrors `recompute_idf`'s `LOG(n / df)` column exactly; a higher
    /// document frequency must yield a lower idf for a fixed corpus size.
    #[test]
    fn idf_decreases_as_document_frequency_rises() {
        let idf = |n: f64, df: f64| (n / df).ln();
        let n = 1000.0;
        assert!(idf(n, 1.0) > idf(n, 10.0));
        assert!(idf(n, 10.0) > idf(n, 500.0));
    }
}
