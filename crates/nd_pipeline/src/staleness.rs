use tracing::info;

use nd_core::{EntryStore, Result, SummaryEntry, SummaryKey, SummaryStore};

/// Outcome of a cache check for one logical key.
#[derive(Debug)]
pub enum CacheState {
    /// Reusable rows, ordered by display order.
    Fresh(Vec<SummaryEntry>),
    /// Nothing cached (or the stale set was just discarded); generate.
    Absent,
}

/// Decide whether the cached summary set for `key` is still valid.
///
/// Rows are fresh when they were created after the period fully elapsed, or
/// when no subscribed feed has been crawled since they were created. With
/// `delete_if_stale`, a stale set is deleted before reporting `Absent`, so
/// callers never observe rows mid-regeneration.
pub async fn resolve(
    summaries: &dyn SummaryStore,
    entries: &dyn EntryStore,
    key: &SummaryKey,
    feed_ids: &[i64],
    delete_if_stale: bool,
) -> Result<CacheState> {
    let existing = summaries.summaries_for_key(key).await?;
    if existing.is_empty() {
        return Ok(CacheState::Absent);
    }
    // Rows of one key are inserted in one batch and share a creation time.
    let creation_time = existing[0].creation_time;
    let end_instant = key.period.exclusive_end_instant(key.start_date);
    if creation_time >= end_instant {
        info!(
            start_date = %key.start_date,
            period = %key.period,
            "summaries already exist for fully elapsed period, reusing"
        );
        return Ok(CacheState::Fresh(existing));
    }

    let max_crawl_time = entries.max_last_crawl_time(feed_ids).await?;
    if max_crawl_time.map_or(true, |t| creation_time >= t) {
        info!(
            start_date = %key.start_date,
            period = %key.period,
            "no new content since last summarization, reusing"
        );
        return Ok(CacheState::Fresh(existing));
    }

    if delete_if_stale {
        let deleted = summaries.delete_summaries(key).await?;
        info!(
            start_date = %key.start_date,
            period = %key.period,
            deleted,
            "deleted stale summaries before regenerating"
        );
    }
    Ok(CacheState::Absent)
}
