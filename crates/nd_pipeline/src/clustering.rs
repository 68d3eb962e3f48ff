use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::task::JoinSet;
use tracing::{info, warn};

use nd_core::{ChunkingExperiment, Error, Period, Result, SummaryEntry};

use crate::invoker::{self, FormattedEntry, OutputKind, SummaryItem};
use crate::staleness::{self, CacheState};
use crate::{day_start, expand, persist, ChunkingStrategy, RunContext};

const KMEANS_ITERATIONS: usize = 10;

/// Embedding-clustering chunking: partition the period's entries by
/// clustering-embedding similarity, summarize each cluster concurrently, then
/// collapse the per-cluster results into one ranked set.
pub(crate) struct ClusteringStrategy;

#[async_trait]
impl ChunkingStrategy for ClusteringStrategy {
    async fn produce(
        &self,
        ctx: &RunContext,
        start_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SummaryEntry>> {
        ctx.check_budget().await?;
        let key = ctx.key(start_date, period, ChunkingExperiment::EmbeddingClustering);
        if let CacheState::Fresh(rows) = staleness::resolve(
            ctx.summaries.as_ref(),
            ctx.entries.as_ref(),
            &key,
            &ctx.feed_ids,
            true,
        )
        .await?
        {
            info!(%start_date, period = %period, "using existing summaries");
            return Ok(rows);
        }

        let end_instant = period.exclusive_end_instant(start_date);
        let pairs = ctx
            .entries
            .clustering_embeddings_in_window(&ctx.feed_ids, day_start(start_date), end_instant)
            .await?;
        if pairs.is_empty() {
            info!(%start_date, "no news entries found, skipping");
            return Ok(Vec::new());
        }

        let usable: Vec<(i64, Vec<f32>)> = pairs
            .into_iter()
            .filter_map(|(id, embedding)| match embedding {
                Some(v) if !v.is_empty() && v.iter().any(|x| *x != 0.0) => Some((id, v)),
                _ => None,
            })
            .collect();
        // Known limitation: clustering needs at least two populated vectors.
        if usable.len() < 2 {
            info!(
                %start_date,
                usable = usable.len(),
                "not enough usable embeddings for clustering, skipping"
            );
            return Ok(Vec::new());
        }

        let k = ctx.config.cluster_count.min(usable.len());
        let vectors: Vec<&[f32]> = usable.iter().map(|(_, v)| v.as_slice()).collect();
        let labels = kmeans(&vectors, k, KMEANS_ITERATIONS);

        let mut clusters: HashMap<usize, Vec<i64>> = HashMap::new();
        for ((id, _), label) in usable.iter().zip(&labels) {
            clusters.entry(*label).or_default().push(*id);
        }
        info!(
            %start_date,
            clusters = clusters.len(),
            embeddings = usable.len(),
            "clustered entries"
        );

        let mut tasks = JoinSet::new();
        for entry_ids in clusters.into_values() {
            let ctx = ctx.clone();
            tasks.spawn(async move { summarize_cluster(&ctx, entry_ids).await });
        }
        let mut merged: Vec<SummaryItem> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(items)) => merged.extend(items),
                Ok(Err(e)) => warn!(%start_date, error = %e, "cluster summarization failed, continuing"),
                Err(e) => warn!(%start_date, error = %e, "cluster task aborted"),
            }
        }
        if merged.is_empty() {
            info!(%start_date, "no cluster produced summaries");
            return Ok(Vec::new());
        }
        info!(%start_date, count = merged.len(), "merging cluster summaries");

        let formatted: Vec<FormattedEntry> = merged.iter().map(FormattedEntry::from_item).collect();
        let final_items = invoker::summarize_entries(
            ctx.client.as_ref(),
            &ctx.tracker,
            &formatted,
            ctx.preference.as_deref(),
            OutputKind::Aggregate,
            &ctx.config,
        )
        .await?;

        Ok(persist::persist_items(ctx.summaries.as_ref(), &key, final_items).await)
    }
}

async fn summarize_cluster(ctx: &RunContext, entry_ids: Vec<i64>) -> Result<Vec<SummaryItem>> {
    let entries = ctx.entries.entries_by_ids(&entry_ids).await?;
    let formatted: Vec<FormattedEntry> = entries.iter().map(FormattedEntry::from_entry).collect();
    info!(count = formatted.len(), "summarizing cluster");
    let mut items = invoker::summarize_entries(
        ctx.client.as_ref(),
        &ctx.tracker,
        &formatted,
        ctx.preference.as_deref(),
        OutputKind::Detailed,
        &ctx.config,
    )
    .await?;
    if items.is_empty() {
        return Err(Error::Generation(
            "no summaries generated for cluster".to_string(),
        ));
    }
    expand::expand_batch(
        ctx.client.as_ref(),
        ctx.fetcher.as_ref(),
        &ctx.tracker,
        &mut items,
        &ctx.config,
    )
    .await;
    Ok(items)
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::MAX;
    for (j, c) in centroids.iter().enumerate() {
        let d = squared_distance(v, c);
        if d < best_distance {
            best_distance = d;
            best = j;
        }
    }
    best
}

/// Small in-memory k-means over the embedding vectors. Centroids are seeded
/// by greedy farthest-point selection, which keeps initial centers spread out
/// without pulling in an RNG.
fn kmeans(vectors: &[&[f32]], k: usize, iterations: usize) -> Vec<usize> {
    if vectors.is_empty() || k == 0 {
        return Vec::new();
    }
    let dim = vectors[0].len();

    let mut centroids: Vec<Vec<f32>> = vec![vectors[0].to_vec()];
    while centroids.len() < k {
        let farthest = vectors
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let da = centroids
                    .iter()
                    .map(|c| squared_distance(a, c))
                    .fold(f32::MAX, f32::min);
                let db = centroids
                    .iter()
                    .map(|c| squared_distance(b, c))
                    .fold(f32::MAX, f32::min);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        centroids.push(vectors[farthest].to_vec());
    }

    let mut assignments = vec![0usize; vectors.len()];
    for _ in 0..iterations {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let label = nearest(&centroids, v);
            if assignments[i] != label {
                assignments[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, v) in vectors.iter().enumerate() {
            counts[assignments[i]] += 1;
            for (s, x) in sums[assignments[i]].iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        for j in 0..k {
            // An emptied cluster keeps its previous centroid.
            if counts[j] > 0 {
                centroids[j] = sums[j].iter().map(|s| s / counts[j] as f32).collect();
            }
        }
    }
    assignments
}
