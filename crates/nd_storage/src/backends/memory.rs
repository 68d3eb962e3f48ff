use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use nd_core::{
    ChunkingExperiment, EntryStore, Error, ExperimentStats, NewsEntry, PreferenceExperiment,
    Result, RssFeed, SummaryEntry, SummaryKey, SummaryStore, UsageRecord, UsageStore, UserProfile,
    UserStore,
};

/// In-memory reference backend implementing every store seam. Batch inserts
/// and key-scoped deletes run under a single write lock, which gives them the
/// same all-or-nothing behavior a database transaction would.
#[derive(Default)]
struct MemoryState {
    feeds: Vec<RssFeed>,
    entries: Vec<NewsEntry>,
    users: Vec<UserProfile>,
    summaries: Vec<SummaryEntry>,
    stats: Vec<ExperimentStats>,
    usage: Vec<UsageRecord>,
    next_entry_id: i64,
    next_summary_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

fn in_window(entry: &NewsEntry, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    match entry.pub_time {
        Some(pub_time) => pub_time >= start && pub_time < end,
        None => entry.crawl_time >= start && entry.crawl_time < end,
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_feed(&self, feed: RssFeed) {
        self.state.write().await.feeds.push(feed);
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.state.write().await.users.push(user);
    }

    /// Insert an entry, assigning an id when none is set. Returns the id.
    pub async fn add_entry(&self, mut entry: NewsEntry) -> i64 {
        let mut state = self.state.write().await;
        if entry.id == 0 {
            state.next_entry_id += 1;
            entry.id = state.next_entry_id;
        } else {
            state.next_entry_id = state.next_entry_id.max(entry.id);
        }
        let id = entry.id;
        state.entries.push(entry);
        id
    }

    pub async fn set_feed_crawl_time(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let feed = state
            .feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or_else(|| Error::NotFound(format!("feed {feed_id}")))?;
        feed.last_crawl_time = at;
        Ok(())
    }

    pub async fn usage_rows(&self, user_id: i64) -> Vec<UsageRecord> {
        self.state
            .read()
            .await
            .usage
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn stats_for_key(&self, key: &SummaryKey) -> Option<ExperimentStats> {
        self.state
            .read()
            .await
            .stats
            .iter()
            .find(|s| &s.key == key)
            .cloned()
    }
}

#[async_trait]
impl EntryStore for MemoryBackend {
    async fn entries_in_window(
        &self,
        feed_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| feed_ids.contains(&e.feed_id) && in_window(e, start, end))
            .cloned()
            .collect())
    }

    async fn clustering_embeddings_in_window(
        &self,
        feed_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(i64, Option<Vec<f32>>)>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| feed_ids.contains(&e.feed_id) && in_window(e, start, end))
            .map(|e| (e.id, e.clustering_embedding.clone()))
            .collect())
    }

    async fn entries_by_ids(&self, ids: &[i64]) -> Result<Vec<NewsEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn max_last_crawl_time(&self, feed_ids: &[i64]) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .feeds
            .iter()
            .filter(|f| feed_ids.contains(&f.id))
            .map(|f| f.last_crawl_time)
            .max())
    }

    async fn entries_missing_embeddings(&self, limit: usize) -> Result<Vec<NewsEntry>> {
        let state = self.state.read().await;
        let mut missing: Vec<NewsEntry> = state
            .entries
            .iter()
            .filter(|e| e.clustering_embedding.is_none() || e.retrieval_embedding.is_none())
            .cloned()
            .collect();
        missing.sort_by_key(|e| e.crawl_time);
        missing.truncate(limit);
        Ok(missing)
    }

    async fn set_embeddings(
        &self,
        entry_id: i64,
        clustering: Vec<f32>,
        retrieval: Vec<f32>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| Error::NotFound(format!("entry {entry_id}")))?;
        entry.clustering_embedding = Some(clustering);
        entry.retrieval_embedding = Some(retrieval);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryBackend {
    async fn user_profile(&self, user_id: i64) -> Result<UserProfile> {
        let state = self.state.read().await;
        state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl SummaryStore for MemoryBackend {
    async fn summaries_for_key(&self, key: &SummaryKey) -> Result<Vec<SummaryEntry>> {
        let state = self.state.read().await;
        let mut rows: Vec<SummaryEntry> = state
            .summaries
            .iter()
            .filter(|s| &s.key == key)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.display_order);
        Ok(rows)
    }

    async fn summary_by_id(&self, id: i64) -> Result<SummaryEntry> {
        let state = self.state.read().await;
        state
            .summaries
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("summary {id}")))
    }

    async fn daily_summaries_in_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        chunking: ChunkingExperiment,
        preference: PreferenceExperiment,
    ) -> Result<Vec<SummaryEntry>> {
        let state = self.state.read().await;
        let mut rows: Vec<SummaryEntry> = state
            .summaries
            .iter()
            .filter(|s| {
                s.key.user_id == user_id
                    && s.key.period == nd_core::Period::Daily
                    && s.key.chunking == chunking
                    && s.key.preference == preference
                    && s.key.start_date >= start
                    && s.key.start_date < end
            })
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.key.start_date, s.display_order));
        Ok(rows)
    }

    async fn delete_summaries(&self, key: &SummaryKey) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.summaries.len();
        state.summaries.retain(|s| &s.key != key);
        Ok(before - state.summaries.len())
    }

    async fn insert_summaries(&self, mut rows: Vec<SummaryEntry>) -> Result<()> {
        let mut state = self.state.write().await;
        // Unique (key, display_order): reject the whole batch on any clash,
        // against existing rows or within the batch itself.
        for (i, row) in rows.iter().enumerate() {
            let clash_existing = state
                .summaries
                .iter()
                .any(|s| s.key == row.key && s.display_order == row.display_order);
            let clash_batch = rows[..i]
                .iter()
                .any(|s| s.key == row.key && s.display_order == row.display_order);
            if clash_existing || clash_batch {
                return Err(Error::Storage(format!(
                    "duplicate summary for key {:?} display_order {}",
                    row.key, row.display_order
                )));
            }
        }
        for row in rows.iter_mut() {
            state.next_summary_id += 1;
            row.id = state.next_summary_id;
        }
        state.summaries.extend(rows);
        Ok(())
    }

    async fn set_clicked(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .summaries
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("summary {id}")))?;
        row.clicked = true;
        row.clicked_at = Some(at);
        Ok(())
    }

    async fn set_expanded_content(&self, id: i64, content: String) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .summaries
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("summary {id}")))?;
        row.expanded_content = Some(content);
        Ok(())
    }

    async fn mark_shown(&self, key: &SummaryKey) -> Result<ExperimentStats> {
        let mut state = self.state.write().await;
        if let Some(stats) = state.stats.iter_mut().find(|s| &s.key == key) {
            stats.shown = true;
            return Ok(stats.clone());
        }
        let stats = ExperimentStats {
            key: *key,
            shown: true,
            liked: false,
            disliked: false,
        };
        state.stats.push(stats.clone());
        Ok(stats)
    }

    async fn record_feedback(&self, key: &SummaryKey, liked: bool) -> Result<()> {
        let mut state = self.state.write().await;
        match state.stats.iter_mut().find(|s| &s.key == key) {
            Some(stats) => {
                stats.liked = liked;
                stats.disliked = !liked;
            }
            None => state.stats.push(ExperimentStats {
                key: *key,
                shown: true,
                liked,
                disliked: !liked,
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryBackend {
    async fn append(&self, record: UsageRecord) -> Result<()> {
        self.state.write().await.usage.push(record);
        Ok(())
    }

    async fn totals_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<(i64, i64)> {
        let state = self.state.read().await;
        let mut totals = (0, 0);
        for record in state
            .usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
        {
            totals.0 += record.input_tokens;
            totals.1 += record.output_tokens;
        }
        Ok(totals)
    }
}
