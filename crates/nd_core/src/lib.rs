pub mod error;
pub mod fetch;
pub mod generation;
pub mod period;
pub mod storage;
pub mod types;

pub use error::Error;
pub use fetch::Fetcher;
pub use generation::{EmbeddingTask, GenerationClient, GenerationOutput, GenerationRequest, TokenUsage};
pub use period::Period;
pub use storage::{EntryStore, SummaryStore, UsageStore, UserStore};
pub use types::{
    ChunkingExperiment, ExperimentStats, NewsEntry, PreferenceExperiment, RssFeed, SummaryEntry,
    SummaryKey, UsageRecord, UserProfile,
};

pub type Result<T> = std::result::Result<T, Error>;
