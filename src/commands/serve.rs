//! The thin HTTP query endpoint named as an external collaborator in the
//! spec (`GET /search?query=...`). Everything behind it is the Ranker
//! crate; this module is wiring, not a service.
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use tuer_core::AppConfig;
use tuer_index::Index;
use tuer_ranker::{NearestNeighborSource, RankedDocument, Ranker, StaticEmbeddingTable};

#[derive(Clone)]
struct AppState {
    ranker: Arc<Ranker>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn run(config: AppConfig, addr: String) -> Result<()> {
    let index = Index::connect(&config.database.postgres_url, 8).await?;
    index.run_migrations().await?;
    let embeddings: Arc<dyn NearestNeighborSource> =
        Arc::new(StaticEmbeddingTable::load(&config.ranker.embeddings_path)?);
    let ranker = Arc::new(Ranker::new(
        index,
        embeddings,
        config.ranker.expansion_n,
        config.ranker.similarity_threshold,
    ));

    let app = Router::new()
        .route("/search", get(search))
        .with_state(AppState { ranker });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "query endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Internal failures surface as 5xx; an empty result set is not an error.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RankedDocument>>, axum::http::StatusCode> {
    state
        .ranker
        .search(&params.query, params.limit)
        .await
        .map(Json)
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}
