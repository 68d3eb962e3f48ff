use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::task::JoinSet;
use tracing::{info, warn};

use nd_core::{ChunkingExperiment, Period, Result, SummaryEntry};

use crate::invoker::{self, FormattedEntry, OutputKind};
use crate::staleness::{self, CacheState};
use crate::{day_start, expand, persist, ChunkingStrategy, RunContext, BASE_CHUNK_PERIOD};

/// Aggregate-of-aggregates chunking: summarize every base (daily) sub-period
/// first, then re-summarize the daily summaries into the requested period.
pub(crate) struct AggregateStrategy;

#[async_trait]
impl ChunkingStrategy for AggregateStrategy {
    async fn produce(
        &self,
        ctx: &RunContext,
        start_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SummaryEntry>> {
        if period != BASE_CHUNK_PERIOD {
            let end = period.exclusive_end(start_date);
            let mut days = JoinSet::new();
            let mut day = start_date;
            while day < end {
                let ctx = ctx.clone();
                days.spawn(async move {
                    (day, summarize_period(&ctx, day, BASE_CHUNK_PERIOD).await)
                });
                day = day + chrono::Duration::days(1);
            }
            // Best effort: a failed day contributes nothing and does not
            // abort its siblings.
            while let Some(joined) = days.join_next().await {
                match joined {
                    Ok((_, Ok(_))) => {}
                    Ok((day, Err(e))) => {
                        warn!(%day, error = %e, "daily summarization failed, continuing")
                    }
                    Err(e) => warn!(error = %e, "daily summarization task aborted"),
                }
            }
        }
        summarize_period(ctx, start_date, period).await
    }
}

/// Summarize one chunk: raw entries for a base period, prior daily summaries
/// for anything larger. Reuses the cached set when it is still fresh.
pub(crate) async fn summarize_period(
    ctx: &RunContext,
    start_date: NaiveDate,
    target_period: Period,
) -> Result<Vec<SummaryEntry>> {
    ctx.check_budget().await?;
    let key = ctx.key(start_date, target_period, ChunkingExperiment::AggregateDaily);
    if let CacheState::Fresh(rows) = staleness::resolve(
        ctx.summaries.as_ref(),
        ctx.entries.as_ref(),
        &key,
        &ctx.feed_ids,
        true,
    )
    .await?
    {
        info!(%start_date, period = %target_period, "using existing summaries");
        return Ok(rows);
    }

    let for_base_period = target_period == BASE_CHUNK_PERIOD;
    let end_date = target_period.exclusive_end(start_date);

    let formatted: Vec<FormattedEntry> = if for_base_period {
        let entries = ctx
            .entries
            .entries_in_window(&ctx.feed_ids, day_start(start_date), day_start(end_date))
            .await?;
        if entries.is_empty() {
            info!(%start_date, "no news entries found, skipping");
            return Ok(Vec::new());
        }
        info!(%start_date, count = entries.len(), "found news entries");
        entries.iter().map(FormattedEntry::from_entry).collect()
    } else {
        let dailies = ctx
            .summaries
            .daily_summaries_in_range(
                ctx.user_id,
                start_date,
                end_date,
                ChunkingExperiment::AggregateDaily,
                ctx.preference_exp,
            )
            .await?;
        if dailies.is_empty() {
            info!(%start_date, "no daily summaries found, skipping");
            return Ok(Vec::new());
        }
        info!(%start_date, count = dailies.len(), "aggregating daily summaries");
        dailies.iter().map(FormattedEntry::from_summary).collect()
    };

    let kind = if for_base_period {
        OutputKind::Detailed
    } else {
        OutputKind::Aggregate
    };
    let mut items = invoker::summarize_entries(
        ctx.client.as_ref(),
        &ctx.tracker,
        &formatted,
        ctx.preference.as_deref(),
        kind,
        &ctx.config,
    )
    .await?;

    // Expansion only happens at base granularity to bound crawl volume.
    if for_base_period {
        expand::expand_batch(
            ctx.client.as_ref(),
            ctx.fetcher.as_ref(),
            &ctx.tracker,
            &mut items,
            &ctx.config,
        )
        .await;
    }

    Ok(persist::persist_items(ctx.summaries.as_ref(), &key, items).await)
}
