use std::sync::Arc;

use anyhow::Result;

use tuer_core::AppConfig;
use tuer_index::Index;
use tuer_ranker::{NearestNeighborSource, Ranker, StaticEmbeddingTable};

pub async fn run(config: AppConfig, query: String, limit: usize) -> Result<()> {
    let index = Index::connect(&config.database.postgres_url, 4).await?;
    index.run_migrations().await?;

    // Model load failure is fatal at startup: the ranker refuses to start
    // without its embedding table.
    let embeddings: Arc<dyn NearestNeighborSource> =
        Arc::new(StaticEmbeddingTable::load(&config.ranker.embeddings_path)?);

    let ranker = Ranker::new(
        index,
        embeddings,
        config.ranker.expansion_n,
        config.ranker.similarity_threshold,
    );

    let results = ranker.search(&query, limit).await?;
    if results.is_empty() {
        println!("No results for \"{query}\"");
        return Ok(());
    }

    println!("{} result(s) for \"{query}\":\n", results.len());
    for r in &results {
        println!("  [{:.3}] {} — {}", r.score, r.title, r.url);
        if !r.description.is_empty() {
            println!("          {}", r.description);
        }
    }
    Ok(())
}
