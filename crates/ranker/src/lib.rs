pub mod embeddings;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use tuer_core::CrawlError;
use tuer_index::{Index, Tokenizer};

pub use embeddings::{NearestNeighborSource, StaticEmbeddingTable};

const K1: f64 = 1.5;
const B: f64 = 0.75;
/// Expansion term weight divisor: an expansion term's BM25 contribution is
/// scaled by `similarity / EXPANSION_WEIGHT_DIVISOR`.
const EXPANSION_WEIGHT_DIVISOR: f64 = 3.0;
/// Original query term weight when the term produced no expansions at all.
const UNEXPANDED_TERM_WEIGHT: f64 = 4.0;
/// Original query term weight when at least one expansion was found for it
/// (rare terms that still expanded earn a smaller bonus).
const EXPANDED_TERM_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Serialize)]
pub struct RankedDocument {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub summary: String,
    pub score: f64,
}

pub struct Ranker {
    index: Index,
    tokenizer: Tokenizer,
    embeddings: Arc<dyn NearestNeighborSource>,
    expansion_n_base: f64,
    similarity_threshold: f32,
}

impl Ranker {
    pub fn new(
        index: Index,
        embeddings: Arc<dyn NearestNeighborSource>,
        expansion_n_base: f64,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            index,
            tokenizer: Tokenizer::new(),
            embeddings,
            expansion_n_base,
            similarity_threshold,
        }
    }

    /// Preprocess the query, expand it with nearest-neighbor terms, score
    /// every candidate document with BM25 over the expanded bag, and return
    /// documents sorted by descending score. Empty query -> empty results,
    /// never an error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedDocument>, CrawlError> {
        let q_tokens = self.tokenizer.tokenize(query);
        if q_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let q_set: HashSet<String> = q_tokens.iter().cloned().collect();
        let n = expansion_count(self.expansion_n_base, q_tokens.len() as f64);

        // expansion_of[term] = true once `term` has produced a kept expansion.
        let mut expansion_of: HashMap<String, bool> = q_set.iter().cloned().map(|t| (t, false)).collect();
        let mut expansions: HashMap<String, f32> = HashMap::new();
        for term in &q_set {
            for (candidate, similarity) in self.embeddings.nearest(term, n) {
                if similarity <= self.similarity_threshold || q_set.contains(&candidate) {
                    continue;
                }
                expansion_of.insert(term.clone(), true);
                expansions
                    .entry(candidate)
                    .and_modify(|s| {
                        if similarity > *s {
                            *s = similarity;
                        }
                    })
                    .or_insert(similarity);
            }
        }

        let all_terms: Vec<String> = q_set.iter().cloned().chain(expansions.keys().cloned()).collect();
        let idf = self.load_idf(&all_terms).await?;
        let postings = self.load_postings(&all_terms).await?;

        if postings.is_empty() {
            return Ok(Vec::new());
        }

        let doc_ids: Vec<i64> = postings.keys().copied().collect();
        let doc_rows = self.load_documents(&doc_ids).await?;
        let avg_len = self.index.average_token_count().await?.max(1.0);

        let mut scored: Vec<RankedDocument> = Vec::new();
        for (doc_id, term_tf) in &postings {
            let Some(doc) = doc_rows.get(doc_id) else {
                continue;
            };
            let l_d = doc.token_count.max(0) as f64;
            let norm = K1 * (1.0 - B + B * l_d / avg_len);

            let mut score = 0.0;
            for term in &q_set {
                let Some(&tf) = term_tf.get(term) else { continue };
                let Some(&term_idf) = idf.get(term) else { continue };
                let weight = if *expansion_of.get(term).unwrap_or(&false) {
                    EXPANDED_TERM_WEIGHT
                } else {
                    UNEXPANDED_TERM_WEIGHT
                };
                score += weight * term_idf * bm25_tf_component(tf as f64, norm);
            }
            for (term, similarity) in &expansions {
                let Some(&tf) = term_tf.get(term) else { continue };
                let Some(&term_idf) = idf.get(term) else { continue };
                score += (*similarity as f64 / EXPANSION_WEIGHT_DIVISOR)
                    * term_idf
                    * bm25_tf_component(tf as f64, norm);
            }

            if score > 0.0 {
                scored.push(RankedDocument {
                    id: doc.id,
                    title: doc.title.clone(),
                    url: doc.url.clone(),
                    description: doc.description.clone(),
                    summary: doc.summary.clone(),
                    score,
                });
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn load_idf(&self, terms: &[String]) -> Result<HashMap<String, f64>, CrawlError> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT w.word, i.idf FROM idfs i JOIN words w ON w.id = i.word WHERE w.word = ANY($1)",
        )
        .bind(terms)
        .fetch_all(self.index.pool())
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(rows.into_iter().collect())
    }

    /// doc_id -> (term -> raw tf) for every document containing at least one
    /// of `terms` (union candidate selection).
    async fn load_postings(
        &self,
        terms: &[String],
    ) -> Result<HashMap<i64, HashMap<String, i64>>, CrawlError> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT t.doc, w.word, t.amount
             FROM tfs t JOIN words w ON w.id = t.word
             WHERE w.word = ANY($1)",
        )
        .bind(terms)
        .fetch_all(self.index.pool())
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;

        let mut postings: HashMap<i64, HashMap<String, i64>> = HashMap::new();
        for (doc, word, amount) in rows {
            postings.entry(doc).or_default().insert(word, amount);
        }
        Ok(postings)
    }

    async fn load_documents(&self, ids: &[i64]) -> Result<HashMap<i64, DocumentRow>, CrawlError> {
        let rows: Vec<(i64, String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, link, title, description, summary, token_count
             FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(self.index.pool())
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, url, title, description, summary, token_count)| {
                (
                    id,
                    DocumentRow {
                        id,
                        url,
                        title,
                        description,
                        summary,
                        token_count,
                    },
                )
            })
            .collect())
    }
}

struct DocumentRow {
    id: i64,
    url: String,
    title: String,
    description: String,
    summary: String,
    token_count: i64,
}

fn bm25_tf_component(tf: f64, norm: f64) -> f64 {
    (tf * (K1 + 1.0)) / (tf + norm)
}

/// Number of nearest-neighbor candidates to pull per query term. Long
/// queries (`k > 7` tokens) decay the per-term expansion count so the
/// candidate set doesn't blow up; short queries use `base` unchanged.
fn expansion_count(base: f64, k: f64) -> usize {
    let n = if k > 7.0 {
        (base * (-0.08 * k).exp()).max(1.0)
    } else {
        base
    };
    n.round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bm25_component_is_monotonic_in_tf() {
        let norm = K1 * (1.0 - B + B * 1.0);
        let low = bm25_tf_component(1.0, norm);
        let high = bm25_tf_component(5.0, norm);
        assert!(high > low);
    }

    #[test]
    fn bm25_component_saturates() {
        let norm = K1 * (1.0 - B + B * 1.0);
        let a = bm25_tf_component(100.0, norm);
        let b = bm25_tf_component(1000.0, norm);
        assert!(b - a < 0.1);
    }

    #[test]
    fn expansion_count_is_unchanged_at_or_below_seven_terms() {
        assert_eq!(expansion_count(7.0, 3.0), 7);
        assert_eq!(expansion_count(7.0, 7.0), 7);
    }

    #[test]
    fn expansion_count_decays_past_seven_terms_but_never_below_one() {
        let at_eight = expansion_count(7.0, 8.0);
        let at_twenty = expansion_count(7.0, 20.0);
        assert!(at_eight < 7);
        assert!(at_twenty < at_eight);
        assert!(at_twenty >= 1);
    }
}
