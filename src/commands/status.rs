use anyhow::Result;

use tuer_core::AppConfig;
use tuer_frontier::Frontier;
use tuer_index::Index;

pub async fn run(config: AppConfig) -> Result<()> {
    let index = Index::connect(&config.database.postgres_url, 4).await?;
    index.run_migrations().await?;

    let documents = index.document_count().await?;
    let avg_tokens = index.average_token_count().await?;

    let frontier = Frontier::new(&config.frontier.snapshot_path);
    let has_snapshot = frontier.restore().await?;
    let (pending, visited) = (frontier.pending_len().await, frontier.visited_len().await);

    println!("documents indexed:     {documents}");
    println!("avg tokens/doc:        {avg_tokens:.1}");
    println!("frontier snapshot:     {}", if has_snapshot { "present" } else { "none (will seed on crawl)" });
    println!("pending URLs:          {pending}");
    println!("visited URLs:          {visited}");

    Ok(())
}
