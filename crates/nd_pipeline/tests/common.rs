#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nd_core::{
    EmbeddingTask, Error, Fetcher, GenerationClient, GenerationOutput, GenerationRequest,
    NewsEntry, Result, RssFeed, TokenUsage, UserProfile,
};
use nd_pipeline::{Config, Summarizer};
use nd_storage::MemoryBackend;

pub const USER_ID: i64 = 1;
pub const FEED_ID: i64 = 10;

type Handler = dyn Fn(usize, &GenerationRequest) -> Result<GenerationOutput> + Send + Sync;

/// Generation client scripted per test: the handler sees the zero-based call
/// index and the request, and the client counts every generate call.
pub struct ScriptedClient {
    calls: AtomicUsize,
    handler: Box<Handler>,
}

impl ScriptedClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(usize, &GenerationRequest) -> Result<GenerationOutput> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            handler: Box::new(handler),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(n, &request)
    }

    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let offset = match task {
            EmbeddingTask::Clustering => 0.0f32,
            EmbeddingTask::Retrieval => 1.0,
        };
        Ok(texts
            .iter()
            .map(|t| vec![offset + t.len() as f32, 1.0, 0.0, 0.0])
            .collect())
    }
}

/// Fetcher returning a fixed body (or failing when none is set), counting
/// every fetch.
pub struct StaticFetcher {
    calls: AtomicUsize,
    body: Option<String>,
}

impl StaticFetcher {
    pub fn ok(body: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            body: Some(body.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            body: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .ok_or_else(|| Error::Fetch("connection refused".to_string()))
    }
}

pub fn usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 100,
        output_tokens: 20,
    }
}

/// One structured summary item as the model would emit it.
pub fn item(title: &str, importance: i64, should_expand: bool, urls: &[&str]) -> serde_json::Value {
    json!({
        "title": title,
        "category": "general",
        "content": format!("content for {title}"),
        "reference_urls": urls,
        "importance": importance,
        "should_expand": should_expand,
    })
}

pub fn structured_output(items: Vec<serde_json::Value>) -> GenerationOutput {
    GenerationOutput {
        text: None,
        structured: Some(json!({ "summaries": items })),
        usage: usage(),
    }
}

pub fn text_output(text: &str) -> GenerationOutput {
    GenerationOutput {
        text: Some(text.to_string()),
        structured: None,
        usage: usage(),
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()))
}

pub fn entry_on(date: NaiveDate, n: u32) -> NewsEntry {
    NewsEntry {
        id: 0,
        feed_id: FEED_ID,
        entry_url: format!("https://news.example.com/{date}/{n}"),
        title: Some(format!("headline {date} #{n}")),
        description: Some("short description".to_string()),
        content: Some("full article body".to_string()),
        pub_time: Some(noon(date) + chrono::Duration::minutes(n as i64)),
        crawl_time: noon(date),
        clustering_embedding: None,
        retrieval_embedding: None,
    }
}

pub async fn seeded_backend(unmetered: bool) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend
        .add_feed(RssFeed {
            id: FEED_ID,
            feed_url: "https://news.example.com/rss".to_string(),
            title: Some("Example News".to_string()),
            last_crawl_time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        })
        .await;
    backend
        .add_user(UserProfile {
            id: USER_ID,
            news_preference: Some("technology and science".to_string()),
            subscribed_feed_ids: vec![FEED_ID],
            unmetered,
        })
        .await;
    backend
}

pub fn summarizer(
    backend: &Arc<MemoryBackend>,
    client: Arc<ScriptedClient>,
    fetcher: Arc<StaticFetcher>,
    config: Config,
) -> Summarizer {
    Summarizer::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        client,
        fetcher,
        config,
    )
}
