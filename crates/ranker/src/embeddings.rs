use std::collections::HashMap;
use std::path::Path;

use tuer_core::CrawlError;

/// A loadable table mapping word -> unit vector with a top-k nearest
/// neighbor lookup. The embedding model is read-only after load and safely
/// shared across ranker queries.
pub trait NearestNeighborSource: Send + Sync {
    /// Up to `n` nearest terms to `term`, by descending cosine similarity.
    /// Excludes `term` itself. Empty if `term` is out of vocabulary.
    fn nearest(&self, term: &str, n: usize) -> Vec<(String, f32)>;
}

/// Brute-force nearest-neighbor table loaded from a whitespace-separated
/// `word v1 v2 ... vd` text file (the common GloVe/word2vec plain-text
/// format). Fine at the vocabulary sizes a focused vertical search engine
/// needs; does not attempt an ANN index.
pub struct StaticEmbeddingTable {
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddingTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CrawlError::ModelLoad(format!("{}: {e}", path.display())))?;

        let mut vectors = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let word = parts
                .next()
                .ok_or_else(|| CrawlError::ModelLoad(format!("empty line {lineno} in embeddings file")))?;
            let vector: Vec<f32> = parts
                .map(|v| v.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|e| CrawlError::ModelLoad(format!("line {lineno}: {e}")))?;
            if vector.is_empty() {
                return Err(CrawlError::ModelLoad(format!(
                    "line {lineno} has no vector components"
                )));
            }
            vectors.insert(word.to_string(), vector);
        }
        if vectors.is_empty() {
            return Err(CrawlError::ModelLoad("embeddings file has no entries".to_string()));
        }
        Ok(Self { vectors })
    }

    #[cfg(test)]
    fn from_map(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self { vectors }
    }
}

impl NearestNeighborSource for StaticEmbeddingTable {
    fn nearest(&self, term: &str, n: usize) -> Vec<(String, f32)> {
        let Some(query_vec) = self.vectors.get(term) else {
            return Vec::new();
        };
        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .filter(|(word, _)| word.as_str() != term)
            .map(|(word, vec)| (word.clone(), cosine_similarity(query_vec, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let dot: f32 = a[..len].iter().zip(&b[..len]).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_closest_by_cosine_similarity() {
        let mut vectors = HashMap::new();
        vectors.insert("coffee".to_string(), vec![1.0, 0.0]);
        vectors.insert("espresso".to_string(), vec![0.9, 0.1]);
        vectors.insert("bicycle".to_string(), vec![0.0, 1.0]);
        let table = StaticEmbeddingTable::from_map(vectors);

        let nearest = table.nearest("coffee", 2);
        assert_eq!(nearest[0].0, "espresso");
        assert!(nearest[0].1 > nearest[1].1);
    }

    #[test]
    fn out_of_vocabulary_term_returns_empty() {
        let table = StaticEmbeddingTable::from_map(HashMap::new());
        assert!(table.nearest("anything", 5).is_empty());
    }
}
