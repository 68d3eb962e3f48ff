pub mod fetch;
pub mod models;
pub mod tracker;

pub use fetch::HttpFetcher;
pub use models::dummy::DummyClient;
pub use models::gemini::GeminiClient;
pub use tracker::{BudgetGate, LlmLimits, UsageTracker};
