use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// One crawled news article. Immutable once its embeddings are populated;
/// embeddings are back-filled asynchronously and may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsEntry {
    pub id: i64,
    pub feed_id: i64,
    pub entry_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub pub_time: Option<DateTime<Utc>>,
    /// Fallback ordering key when `pub_time` is absent.
    pub crawl_time: DateTime<Utc>,
    /// Embedding tuned for clustering similarity.
    pub clustering_embedding: Option<Vec<f32>>,
    /// Embedding tuned for retrieval / question answering.
    pub retrieval_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssFeed {
    pub id: i64,
    pub feed_url: String,
    pub title: Option<String>,
    pub last_crawl_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub news_preference: Option<String>,
    pub subscribed_feed_ids: Vec<i64>,
    /// Unmetered users bypass the monthly token budget.
    pub unmetered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingExperiment {
    AggregateDaily,
    EmbeddingClustering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceExperiment {
    ApplyPreference,
    NoPreference,
}

/// Logical identity of one summary set, excluding display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub user_id: i64,
    pub start_date: NaiveDate,
    pub period: Period,
    pub chunking: ChunkingExperiment,
    pub preference: PreferenceExperiment,
}

/// One generated summary unit. (key, display_order) is unique and is the
/// identity used for idempotent regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub id: i64,
    pub key: SummaryKey,
    pub category: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub expanded_content: Option<String>,
    pub reference_urls: Vec<String>,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    /// Rank within the period, 0 = most important.
    pub display_order: i32,
    pub creation_time: DateTime<Utc>,
}

/// Per (user, period, experiment tuple) display/feedback aggregate,
/// created lazily the first time a result set is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStats {
    pub key: SummaryKey,
    pub shown: bool,
    pub liked: bool,
    pub disliked: bool,
}

/// One ledger row per completed summarization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for ChunkingExperiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AggregateDaily => write!(f, "aggregate_daily"),
            Self::EmbeddingClustering => write!(f, "embedding_clustering"),
        }
    }
}

impl std::fmt::Display for PreferenceExperiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApplyPreference => write!(f, "apply_preference"),
            Self::NoPreference => write!(f, "no_preference"),
        }
    }
}
