use tracing::info;

use nd_core::{EmbeddingTask, EntryStore, GenerationClient, NewsEntry, Result};

fn embedding_text(entry: &NewsEntry) -> String {
    [
        entry.title.as_deref().unwrap_or(""),
        entry.description.as_deref().unwrap_or(""),
        entry.content.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .trim()
    .to_string()
}

/// Populate both embedding vectors for entries still missing them. Entries
/// are embedded twice, once per task type, since the two vector spaces serve
/// different similarity queries.
pub async fn backfill_embeddings(
    entries: &dyn EntryStore,
    client: &dyn GenerationClient,
    batch: usize,
) -> Result<usize> {
    let missing = entries.entries_missing_embeddings(batch).await?;
    if missing.is_empty() {
        return Ok(0);
    }
    let texts: Vec<String> = missing.iter().map(embedding_text).collect();
    let clustering = client.embed(&texts, EmbeddingTask::Clustering).await?;
    let retrieval = client.embed(&texts, EmbeddingTask::Retrieval).await?;

    for ((entry, clustering_vec), retrieval_vec) in
        missing.iter().zip(clustering).zip(retrieval)
    {
        entries
            .set_embeddings(entry.id, clustering_vec, retrieval_vec)
            .await?;
    }
    info!(count = missing.len(), "back-filled entry embeddings");
    Ok(missing.len())
}
