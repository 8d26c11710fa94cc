//! Loader: replays every stored raw blob back through the indexer and
//! tokenizer without refetching, then rebuilds the IDF table. This is what
//! lets tokenizer or ranking changes take effect over an existing crawl.
use anyhow::Result;
use tracing::info;

use tuer_core::AppConfig;
use tuer_index::{Index, Tokenizer};
use tuer_persister::Persister;

pub async fn run(config: AppConfig) -> Result<()> {
    let persister = Persister::connect(&config.database.postgres_url, 4).await?;
    let index = Index::connect(&config.database.postgres_url, 4).await?;
    index.run_migrations().await?;

    let tokenizer = Tokenizer::new();
    let blobs = persister.load_all().await?;
    info!(count = blobs.len(), "replaying raw blobs");

    for blob in blobs {
        let doc_id = index
            .upsert_document(
                &blob.url,
                blob.parsed.title.as_deref().unwrap_or(""),
                blob.parsed.description.as_deref().unwrap_or(""),
            )
            .await?;

        let source_text = format!(
            "{} {} {} {}",
            blob.parsed.main_text,
            blob.parsed.alt_texts.join(" "),
            blob.parsed.description.as_deref().unwrap_or(""),
            blob.parsed.title.as_deref().unwrap_or(""),
        );
        let tokens = tokenizer.tokenize(&source_text);
        index.record_tokens(doc_id, &tokens).await?;
    }

    index.recompute_idf().await?;
    info!(
        documents = index.document_count().await?,
        "reindex complete, idf table rebuilt"
    );
    Ok(())
}
