use chrono::Utc;
use tracing::{error, info};

use nd_core::{SummaryEntry, SummaryKey, SummaryStore};

use crate::invoker::SummaryItem;

/// Persist one chunk's results under its logical key and return the
/// authoritative stored set. Ranks are assigned from importance order
/// (0 = most important). Any failure leaves the key untouched and returns an
/// empty list; a period is never left half-written.
pub async fn persist_items(
    summaries: &dyn SummaryStore,
    key: &SummaryKey,
    mut items: Vec<SummaryItem>,
) -> Vec<SummaryEntry> {
    if items.is_empty() {
        return Vec::new();
    }
    items.sort_by(|a, b| b.importance.cmp(&a.importance));
    let creation_time = Utc::now();
    let rows: Vec<SummaryEntry> = items
        .into_iter()
        .enumerate()
        .map(|(order, item)| SummaryEntry {
            id: 0,
            key: *key,
            category: item.category,
            title: item.title,
            content: item.content,
            expanded_content: item.expanded_content,
            reference_urls: item.reference_urls,
            clicked: false,
            clicked_at: None,
            display_order: order as i32,
            creation_time,
        })
        .collect();

    let count = rows.len();
    if let Err(e) = summaries.insert_summaries(rows).await {
        error!(
            start_date = %key.start_date,
            period = %key.period,
            error = %e,
            "failed to persist summaries"
        );
        return Vec::new();
    }
    info!(
        start_date = %key.start_date,
        period = %key.period,
        count,
        "saved summaries"
    );

    // Re-read through the existence query so callers get exactly what the
    // store now holds.
    match summaries.summaries_for_key(key).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(
                start_date = %key.start_date,
                error = %e,
                "failed to read back persisted summaries"
            );
            Vec::new()
        }
    }
}
