use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use nd_core::{
    Error, GenerationClient, GenerationRequest, NewsEntry, Result, SummaryEntry,
};
use nd_llm::UsageTracker;

use crate::Config;

/// One summary unit as produced by the model, before persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryItem {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub expanded_content: Option<String>,
    #[serde(default)]
    pub reference_urls: Vec<String>,
    #[serde(default)]
    pub importance: i64,
    #[serde(default)]
    pub should_expand: bool,
}

#[derive(Debug, Deserialize, Default)]
struct SummaryListOutput {
    #[serde(default)]
    summaries: Vec<SummaryItem>,
}

/// A news entry or prior summary serialized for the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct FormattedEntry {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub reference_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_time: Option<String>,
}

impl FormattedEntry {
    pub fn from_entry(entry: &NewsEntry) -> Self {
        let content = [
            entry.description.clone().unwrap_or_default(),
            entry.content.clone().unwrap_or_default(),
        ]
        .join(";");
        Self {
            title: entry.title.clone().unwrap_or_default(),
            content,
            expanded_content: None,
            reference_urls: vec![entry.entry_url.clone()],
            pub_time: entry.pub_time.map(|t| t.to_rfc3339()),
        }
    }

    pub fn from_summary(summary: &SummaryEntry) -> Self {
        Self {
            title: summary.title.clone(),
            content: summary.content.clone().unwrap_or_default(),
            expanded_content: summary.expanded_content.clone(),
            reference_urls: summary.reference_urls.clone(),
            pub_time: None,
        }
    }

    pub fn from_item(item: &SummaryItem) -> Self {
        Self {
            title: item.title.clone(),
            content: item.content.clone().unwrap_or_default(),
            expanded_content: item.expanded_content.clone(),
            reference_urls: item.reference_urls.clone(),
            pub_time: None,
        }
    }
}

/// Which structured-output contract to request. `Detailed` additionally
/// carries the per-item expand flag and is only used at base granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Detailed,
    Aggregate,
}

fn output_schema(kind: OutputKind, max_items: usize) -> serde_json::Value {
    let mut properties = json!({
        "title": {
            "type": "string",
            "description": "Summarized from the news entries' titles."
        },
        "category": {
            "type": "string",
            "description": "Short topic/category label for this summary."
        },
        "content": {
            "type": "string",
            "description": "Summarized from the news entries' content."
        },
        "reference_urls": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Reference URLs of the summarized entries. Only keep the 3 most important URLs."
        },
        "importance": {
            "type": "integer",
            "description": "Importance of this summary from 0 (lowest) to 100 (highest)."
        },
    });
    if kind == OutputKind::Detailed {
        properties["should_expand"] = json!({
            "type": "boolean",
            "description": "True if the summary should be expanded based on user preference or its importance."
        });
    }
    let required = match kind {
        OutputKind::Detailed => json!(["title", "reference_urls", "importance", "should_expand"]),
        OutputKind::Aggregate => json!(["title", "reference_urls", "importance"]),
    };
    json!({
        "type": "object",
        "properties": {
            "summaries": {
                "type": "array",
                "maxItems": max_items,
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        },
        "required": ["summaries"],
    })
}

const EXPANSION_INSTRUCTION: &str = "Among the returned news summary entries, you should pick \
the most important and preferred news summary entries and mark them for expansion.";

pub fn build_prompt(
    preference: Option<&str>,
    entries: &[FormattedEntry],
    kind: OutputKind,
    max_items: usize,
) -> String {
    let user_preferences = preference.unwrap_or("No specific preferences");
    let expansion_instruction = match kind {
        OutputKind::Detailed => EXPANSION_INSTRUCTION,
        OutputKind::Aggregate => "",
    };
    let news_entries = serde_json::to_string_pretty(entries).unwrap_or_default();
    format!(
        "You are an AI assistant that summarizes and merges news entries into a list of summary entries.\n\
         You should summarize based on the following user preferences:\n\
         User preferences:\n\
         {user_preferences}\n\
         \n\
         Group the summaries into categories/topics and assess the importance of each news summary \
         based on the user preferences, ordering from high importance to low importance.\n\
         Write each summary in accordance with the user preferences.\n\
         If some news entries are similar, summarize and merge them into one news summary entry \
         while keeping their reference urls.\n\
         Do NOT exceed {max_items} news summary entries in the output. \
         Only keep the most important news summary entries.\n\
         \n\
         {expansion_instruction}\n\
         \n\
         News entries:\n\
         {news_entries}\n"
    )
}

/// Invoke the generation capability with a structured-output contract,
/// retrying the identical request on malformed or empty output. Token usage
/// of every attempt is recorded against the run tracker.
pub async fn summarize_entries(
    client: &dyn GenerationClient,
    tracker: &UsageTracker,
    entries: &[FormattedEntry],
    preference: Option<&str>,
    kind: OutputKind,
    config: &Config,
) -> Result<Vec<SummaryItem>> {
    let prompt = build_prompt(preference, entries, kind, config.max_summaries_per_turn);
    let schema = output_schema(kind, config.max_summaries_per_turn);

    let mut last_failure = String::new();
    for attempt in 1..=config.retry_budget {
        let request = GenerationRequest::structured(prompt.clone(), schema.clone());
        match client.generate(request).await {
            Ok(output) => {
                tracker.record(output.usage);
                let parsed = output
                    .structured
                    .and_then(|value| serde_json::from_value::<SummaryListOutput>(value).ok());
                match parsed {
                    Some(list) if !list.summaries.is_empty() => {
                        debug!(count = list.summaries.len(), "structured summaries parsed");
                        let mut items = list.summaries;
                        // Stable: model output order breaks importance ties.
                        items.sort_by(|a, b| b.importance.cmp(&a.importance));
                        items.truncate(config.max_summaries_per_turn);
                        return Ok(items);
                    }
                    _ => {
                        last_failure = "malformed or empty structured output".to_string();
                        warn!(attempt, "summarization output unusable, retrying");
                    }
                }
            }
            Err(e) => {
                last_failure = e.to_string();
                warn!(attempt, error = %e, "generation attempt failed, retrying");
            }
        }
    }
    Err(Error::Generation(format!(
        "no usable summaries after {} attempts: {last_failure}",
        config.retry_budget
    )))
}
