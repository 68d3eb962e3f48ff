use tracing::{info, warn};

use nd_core::{Fetcher, GenerationClient, GenerationRequest};
use nd_llm::UsageTracker;

use crate::invoker::SummaryItem;
use crate::Config;

fn condense_prompt(content: &str) -> String {
    format!(
        "Summarize the following news into less than 100 words. \
         The news is crawled from the web. {content}"
    )
}

fn search_prompt(title: &str, urls: &[String]) -> String {
    format!(
        "Summarize the content in the urls into less than 100 words.\n{}\n\
         If you can't fetch content from the above urls, then search the news \
         content on the web based on the given title {title}",
        urls.join("\n")
    )
}

/// Produce deep-dive content for one summary: fetch each reference URL in
/// order and condense the first page that loads; if every fetch fails (or
/// there are no URLs), fall back to a search-style prompt carrying the title.
/// Returns `None` when nothing could be expanded. Never retried.
pub async fn expand_content(
    client: &dyn GenerationClient,
    fetcher: &dyn Fetcher,
    tracker: &UsageTracker,
    title: &str,
    urls: &[String],
    config: &Config,
) -> Option<String> {
    for url in urls {
        let page = match fetcher.fetch(url, config.fetch_timeout).await {
            Ok(page) => page,
            Err(e) => {
                warn!(%url, error = %e, "failed to fetch reference url");
                continue;
            }
        };
        match client
            .generate(GenerationRequest::text(condense_prompt(&page)))
            .await
        {
            Ok(output) => {
                tracker.record(output.usage);
                if let Some(text) = output.text.filter(|t| !t.is_empty()) {
                    return Some(text);
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "failed to condense fetched page");
            }
        }
    }

    match client
        .generate(GenerationRequest::text(search_prompt(title, urls)))
        .await
    {
        Ok(output) => {
            tracker.record(output.usage);
            output.text.filter(|t| !t.is_empty())
        }
        Err(e) => {
            warn!(title, error = %e, "search fallback failed");
            None
        }
    }
}

/// Expand flagged items in place, up to `Config::max_expansions` per batch.
/// Flagged items count against the cap whether or not expansion succeeds;
/// items beyond it stay unexpanded. Failures are never fatal to the batch.
pub async fn expand_batch(
    client: &dyn GenerationClient,
    fetcher: &dyn Fetcher,
    tracker: &UsageTracker,
    items: &mut [SummaryItem],
    config: &Config,
) {
    let flagged = items.iter().filter(|i| i.should_expand).count();
    info!(flagged, cap = config.max_expansions, "expanding flagged summaries");
    let mut attempted = 0usize;
    for item in items.iter_mut() {
        if attempted >= config.max_expansions {
            break;
        }
        if !item.should_expand {
            continue;
        }
        attempted += 1;
        if item.expanded_content.is_some() {
            continue;
        }
        item.expanded_content = expand_content(
            client,
            fetcher,
            tracker,
            &item.title,
            &item.reference_urls,
            config,
        )
        .await;
    }
}
