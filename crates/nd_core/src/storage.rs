use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    ChunkingExperiment, ExperimentStats, NewsEntry, PreferenceExperiment, SummaryEntry, SummaryKey,
    UsageRecord, UserProfile,
};
use crate::Result;

/// Read access to crawled news entries and their source feeds.
///
/// The time-window predicate is shared by both chunking strategies: an entry
/// belongs to a window when its publish time falls inside it, or, lacking a
/// publish time, when its crawl time does.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Entries for the given feeds inside [start, end).
    async fn entries_in_window(
        &self,
        feed_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEntry>>;

    /// (entry id, clustering embedding) pairs under the same predicate.
    /// Entries without a populated embedding report `None`.
    async fn clustering_embeddings_in_window(
        &self,
        feed_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(i64, Option<Vec<f32>>)>>;

    async fn entries_by_ids(&self, ids: &[i64]) -> Result<Vec<NewsEntry>>;

    /// Latest `last_crawl_time` across the given feeds, if any exist.
    async fn max_last_crawl_time(&self, feed_ids: &[i64]) -> Result<Option<DateTime<Utc>>>;

    /// Entries still missing at least one embedding vector, oldest first.
    async fn entries_missing_embeddings(&self, limit: usize) -> Result<Vec<NewsEntry>>;

    async fn set_embeddings(
        &self,
        entry_id: i64,
        clustering: Vec<f32>,
        retrieval: Vec<f32>,
    ) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_profile(&self, user_id: i64) -> Result<UserProfile>;
}

/// Persistence for generated summaries and their experiment stats.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// All rows for one logical key, ordered by display order.
    async fn summaries_for_key(&self, key: &SummaryKey) -> Result<Vec<SummaryEntry>>;

    async fn summary_by_id(&self, id: i64) -> Result<SummaryEntry>;

    /// Daily rows for one user/experiment pair with start dates in
    /// [start, end). Input to the aggregate-of-aggregates pass.
    async fn daily_summaries_in_range(
        &self,
        user_id: i64,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
        chunking: ChunkingExperiment,
        preference: PreferenceExperiment,
    ) -> Result<Vec<SummaryEntry>>;

    async fn delete_summaries(&self, key: &SummaryKey) -> Result<usize>;

    /// Insert a batch atomically. The (key, display_order) tuple is unique;
    /// a violation rejects the whole batch with no rows written.
    async fn insert_summaries(&self, rows: Vec<SummaryEntry>) -> Result<()>;

    async fn set_clicked(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn set_expanded_content(&self, id: i64, content: String) -> Result<()>;

    /// Lazily create the stats row for a key and mark it shown.
    async fn mark_shown(&self, key: &SummaryKey) -> Result<ExperimentStats>;

    async fn record_feedback(&self, key: &SummaryKey, liked: bool) -> Result<()>;
}

/// Token-usage ledger, aggregated per user per calendar month.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<()>;

    /// (input, output) token sums for rows at or after `since`.
    async fn totals_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<(i64, i64)>;
}
