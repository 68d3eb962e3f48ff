pub mod aggregate;
pub mod backfill;
pub mod clustering;
pub mod expand;
pub mod invoker;
pub mod persist;
pub mod staleness;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use nd_core::{
    ChunkingExperiment, EntryStore, Error, Fetcher, GenerationClient, Period,
    PreferenceExperiment, Result, SummaryEntry, SummaryKey, SummaryStore, UsageStore, UserStore,
};
use nd_llm::{BudgetGate, LlmLimits, UsageTracker};

pub use invoker::{FormattedEntry, OutputKind, SummaryItem};
pub use staleness::CacheState;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Output cap per LLM invocation.
    pub max_summaries_per_turn: usize,
    /// Requested k for the clustering strategy, clamped per run to the
    /// number of usable embeddings.
    pub cluster_count: usize,
    /// Expansion cap per summarization batch.
    pub max_expansions: usize,
    /// Attempts per structured-output invocation.
    pub retry_budget: usize,
    pub fetch_timeout: Duration,
    pub limits: LlmLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_summaries_per_turn: 25,
            cluster_count: 10,
            max_expansions: 10,
            retry_budget: 5,
            fetch_timeout: Duration::from_secs(10),
            limits: LlmLimits::default(),
        }
    }
}

/// The base granularity both strategies chunk down to.
pub const BASE_CHUNK_PERIOD: Period = Period::Daily;

pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Everything one summarization run carries into its chunk tasks. Cheap to
/// clone; concurrent chunks share the stores, the budget gate and the run's
/// usage tracker.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub entries: Arc<dyn EntryStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub client: Arc<dyn GenerationClient>,
    pub fetcher: Arc<dyn Fetcher>,
    pub gate: Arc<BudgetGate>,
    pub tracker: Arc<UsageTracker>,
    pub config: Config,
    pub user_id: i64,
    pub feed_ids: Vec<i64>,
    pub preference: Option<String>,
    pub preference_exp: PreferenceExperiment,
}

impl RunContext {
    pub fn key(&self, start_date: NaiveDate, period: Period, chunking: ChunkingExperiment) -> SummaryKey {
        SummaryKey {
            user_id: self.user_id,
            start_date,
            period,
            chunking,
            preference: self.preference_exp,
        }
    }

    pub async fn check_budget(&self) -> Result<()> {
        if self.gate.exceeds_budget(self.user_id).await? {
            return Err(Error::BudgetExceeded(self.user_id));
        }
        Ok(())
    }
}

/// One chunking experiment arm. Implementations produce the full summary set
/// for a period, reusing cached chunks where they are still fresh.
#[async_trait]
pub(crate) trait ChunkingStrategy: Send + Sync {
    async fn produce(
        &self,
        ctx: &RunContext,
        start_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SummaryEntry>>;
}

fn strategy_for(chunking: ChunkingExperiment) -> &'static dyn ChunkingStrategy {
    match chunking {
        ChunkingExperiment::AggregateDaily => &aggregate::AggregateStrategy,
        ChunkingExperiment::EmbeddingClustering => &clustering::ClusteringStrategy,
    }
}

/// The news summarization pipeline. All collaborators are injected; nothing
/// here reaches for globals.
pub struct Summarizer {
    entries: Arc<dyn EntryStore>,
    users: Arc<dyn UserStore>,
    summaries: Arc<dyn SummaryStore>,
    usage: Arc<dyn UsageStore>,
    client: Arc<dyn GenerationClient>,
    fetcher: Arc<dyn Fetcher>,
    gate: Arc<BudgetGate>,
    config: Config,
}

impl Summarizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entries: Arc<dyn EntryStore>,
        users: Arc<dyn UserStore>,
        summaries: Arc<dyn SummaryStore>,
        usage: Arc<dyn UsageStore>,
        client: Arc<dyn GenerationClient>,
        fetcher: Arc<dyn Fetcher>,
        config: Config,
    ) -> Self {
        let gate = Arc::new(BudgetGate::new(users.clone(), usage.clone(), config.limits));
        Self {
            entries,
            users,
            summaries,
            usage,
            client,
            fetcher,
            gate,
            config,
        }
    }

    /// Produce the ranked, deduplicated summary set for one period.
    ///
    /// Rejects over-budget users, monthly periods and invalid start dates
    /// with distinguishable errors. Any other failure is logged and returned
    /// as an empty list for the affected chunk only; usage spent before the
    /// failure is still recorded.
    pub async fn summarize(
        &self,
        preference_exp: PreferenceExperiment,
        chunking_exp: ChunkingExperiment,
        user_id: i64,
        start_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SummaryEntry>> {
        if self.gate.exceeds_budget(user_id).await? {
            return Err(Error::BudgetExceeded(user_id));
        }
        if period == Period::Monthly {
            return Err(Error::UnsupportedPeriod(period));
        }
        if !period.is_valid_start(start_date) {
            return Err(Error::InvalidStartDate {
                date: start_date,
                period,
            });
        }

        let profile = self.users.user_profile(user_id).await?;
        let preference = match preference_exp {
            PreferenceExperiment::ApplyPreference => profile.news_preference.clone(),
            PreferenceExperiment::NoPreference => None,
        };

        let tracker = Arc::new(UsageTracker::new(user_id));
        let ctx = RunContext {
            entries: self.entries.clone(),
            summaries: self.summaries.clone(),
            client: self.client.clone(),
            fetcher: self.fetcher.clone(),
            gate: self.gate.clone(),
            tracker: tracker.clone(),
            config: self.config.clone(),
            user_id,
            feed_ids: profile.subscribed_feed_ids.clone(),
            preference,
            preference_exp,
        };

        let result = strategy_for(chunking_exp)
            .produce(&ctx, start_date, period)
            .await;

        // One ledger row per run, failure paths included.
        if let Err(e) = tracker.flush(self.usage.as_ref()).await {
            error!(user_id, error = %e, "failed to record run usage");
        }

        match result {
            Ok(rows) => Ok(rows),
            Err(e @ Error::BudgetExceeded(_)) => Err(e),
            Err(e) => {
                error!(
                    user_id,
                    %start_date,
                    %period,
                    error = %e,
                    "summarization run failed"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Expand one already persisted summary row on demand. Budget-gated and
    /// tracked as its own run.
    pub async fn expand_existing(&self, summary_id: i64) -> Result<SummaryEntry> {
        let row = self.summaries.summary_by_id(summary_id).await?;
        if self.gate.exceeds_budget(row.key.user_id).await? {
            return Err(Error::BudgetExceeded(row.key.user_id));
        }
        let tracker = UsageTracker::new(row.key.user_id);
        let expanded = expand::expand_content(
            self.client.as_ref(),
            self.fetcher.as_ref(),
            &tracker,
            &row.title,
            &row.reference_urls,
            &self.config,
        )
        .await;
        if let Err(e) = tracker.flush(self.usage.as_ref()).await {
            error!(user_id = row.key.user_id, error = %e, "failed to record expansion usage");
        }
        if let Some(content) = expanded {
            self.summaries
                .set_expanded_content(summary_id, content)
                .await?;
        }
        self.summaries.summary_by_id(summary_id).await
    }

    /// Record that the user opened one summary.
    pub async fn record_click(&self, summary_id: i64) -> Result<()> {
        self.summaries.set_clicked(summary_id, Utc::now()).await
    }

    /// Lazily create the stats row for a shown result set.
    pub async fn record_display(&self, key: &SummaryKey) -> Result<()> {
        self.summaries.mark_shown(key).await.map(|_| ())
    }

    pub async fn record_feedback(&self, key: &SummaryKey, liked: bool) -> Result<()> {
        self.summaries.record_feedback(key, liked).await
    }

    /// Back-fill both embedding vectors for entries still missing them.
    /// Returns the number of entries updated.
    pub async fn backfill_embeddings(&self, batch: usize) -> Result<usize> {
        backfill::backfill_embeddings(self.entries.as_ref(), self.client.as_ref(), batch).await
    }
}
