use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use nd_core::{
    ChunkingExperiment, NewsEntry, Period, PreferenceExperiment, Result, RssFeed, UserProfile,
};
use nd_llm::{DummyClient, GeminiClient, HttpFetcher};
use nd_pipeline::{Config, Summarizer};
use nd_storage::MemoryBackend;

#[derive(Parser)]
#[command(name = "nd", about = "Personalized news summarization pipeline")]
struct Cli {
    /// JSON seed file with feeds, users and news entries.
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Use the offline echo client instead of the Gemini API.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or reuse) the summary set for one user and period.
    Summarize {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long, value_enum, default_value_t = PeriodArg::Daily)]
        period: PeriodArg,
        #[arg(long, value_enum, default_value_t = ChunkingArg::AggregateDaily)]
        chunking: ChunkingArg,
        #[arg(long, value_enum, default_value_t = PreferenceArg::ApplyPreference)]
        preference: PreferenceArg,
    },
    /// Back-fill embedding vectors for entries missing them.
    Backfill {
        #[arg(long, default_value_t = 100)]
        batch: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChunkingArg {
    AggregateDaily,
    EmbeddingClustering,
}

#[derive(Clone, Copy, ValueEnum)]
enum PreferenceArg {
    ApplyPreference,
    NoPreference,
}

impl From<PeriodArg> for Period {
    fn from(value: PeriodArg) -> Self {
        match value {
            PeriodArg::Daily => Period::Daily,
            PeriodArg::Weekly => Period::Weekly,
            PeriodArg::Monthly => Period::Monthly,
        }
    }
}

impl From<ChunkingArg> for ChunkingExperiment {
    fn from(value: ChunkingArg) -> Self {
        match value {
            ChunkingArg::AggregateDaily => ChunkingExperiment::AggregateDaily,
            ChunkingArg::EmbeddingClustering => ChunkingExperiment::EmbeddingClustering,
        }
    }
}

impl From<PreferenceArg> for PreferenceExperiment {
    fn from(value: PreferenceArg) -> Self {
        match value {
            PreferenceArg::ApplyPreference => PreferenceExperiment::ApplyPreference,
            PreferenceArg::NoPreference => PreferenceExperiment::NoPreference,
        }
    }
}

#[derive(Deserialize, Default)]
struct Seed {
    #[serde(default)]
    feeds: Vec<RssFeed>,
    #[serde(default)]
    users: Vec<UserProfile>,
    #[serde(default)]
    entries: Vec<NewsEntry>,
}

async fn load_backend(path: Option<&PathBuf>) -> Result<MemoryBackend> {
    let backend = MemoryBackend::new();
    let Some(path) = path else {
        return Ok(backend);
    };
    let seed: Seed = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    info!(
        feeds = seed.feeds.len(),
        users = seed.users.len(),
        entries = seed.entries.len(),
        "loaded seed data"
    );
    for feed in seed.feeds {
        backend.add_feed(feed).await;
    }
    for user in seed.users {
        backend.add_user(user).await;
    }
    for entry in seed.entries {
        backend.add_entry(entry).await;
    }
    Ok(backend)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let backend = Arc::new(load_backend(cli.seed.as_ref()).await?);

    let client: Arc<dyn nd_core::GenerationClient> = if cli.offline {
        Arc::new(DummyClient::echo())
    } else {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        Arc::new(GeminiClient::new(api_key)?)
    };

    let pipeline = Summarizer::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        client,
        Arc::new(HttpFetcher::new()),
        Config::default(),
    );

    match cli.command {
        Commands::Summarize {
            user,
            start_date,
            period,
            chunking,
            preference,
        } => {
            let rows = pipeline
                .summarize(
                    preference.into(),
                    chunking.into(),
                    user,
                    start_date,
                    period.into(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Backfill { batch } => {
            let updated = pipeline.backfill_embeddings(batch).await?;
            println!("updated {updated} entries");
        }
    }
    Ok(())
}
