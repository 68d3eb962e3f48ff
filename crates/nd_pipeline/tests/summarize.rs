mod common;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use nd_core::{
    ChunkingExperiment, Error, Period, PreferenceExperiment, SummaryKey, SummaryStore, UsageStore,
};
use nd_pipeline::Config;

fn daily_key(start: chrono::NaiveDate) -> SummaryKey {
    SummaryKey {
        user_id: USER_ID,
        start_date: start,
        period: Period::Daily,
        chunking: ChunkingExperiment::AggregateDaily,
        preference: PreferenceExperiment::ApplyPreference,
    }
}

/// Handler answering every structured request with two fixed items and every
/// text request with a canned expansion.
fn two_item_handler(
    _n: usize,
    request: &nd_core::GenerationRequest,
) -> nd_core::Result<nd_core::GenerationOutput> {
    if request.output_schema.is_some() {
        Ok(structured_output(vec![
            item("top story", 90, false, &["https://news.example.com/a"]),
            item("second story", 40, false, &[]),
        ]))
    } else {
        Ok(text_output("expanded"))
    }
}

#[tokio::test]
async fn summarize_twice_is_idempotent() {
    let backend = Arc::new(seeded_backend(true).await);
    let start = day(2025, 5, 19);
    backend.add_entry(entry_on(start, 1)).await;
    backend.add_entry(entry_on(start, 2)).await;

    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let pipeline = summarizer(
        &backend,
        client.clone(),
        Arc::new(StaticFetcher::failing()),
        Config::default(),
    );

    let first = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            start,
            Period::Daily,
        )
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].title, "top story");
    assert_eq!(first[0].display_order, 0);
    assert_eq!(client.calls(), 1);

    let second = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            start,
            Period::Daily,
        )
        .await
        .unwrap();
    // Same rows, same order, no extra generation calls, no duplicates.
    assert_eq!(client.calls(), 1);
    let first_ids: Vec<i64> = first.iter().map(|r| r.id).collect();
    let second_ids: Vec<i64> = second.iter().map(|r| r.id).collect();
    assert_eq!(first_ids, second_ids);
    let rows = backend.summaries_for_key(&daily_key(start)).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn new_crawl_invalidates_fresh_summaries() {
    let backend = Arc::new(seeded_backend(true).await);
    // A period that has not yet elapsed, so freshness rests on crawl times.
    let today = Utc::now().date_naive();
    let mut entry = entry_on(today, 1);
    entry.pub_time = None;
    entry.crawl_time = Utc::now();
    backend.add_entry(entry).await;

    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let pipeline = summarizer(
        &backend,
        client.clone(),
        Arc::new(StaticFetcher::failing()),
        Config::default(),
    );

    let first = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            today,
            Period::Daily,
        )
        .await
        .unwrap();
    assert_eq!(client.calls(), 1);

    // Nothing crawled since generation: reused.
    pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            today,
            Period::Daily,
        )
        .await
        .unwrap();
    assert_eq!(client.calls(), 1);

    // A subscribed feed advances past the summaries' creation time: the old
    // rows are deleted and the set regenerated.
    backend
        .set_feed_crawl_time(FEED_ID, Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    let regenerated = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            today,
            Period::Daily,
        )
        .await
        .unwrap();
    assert_eq!(client.calls(), 2);
    let old_ids: HashSet<i64> = first.iter().map(|r| r.id).collect();
    assert!(regenerated.iter().all(|r| !old_ids.contains(&r.id)));
    let rows = backend.summaries_for_key(&daily_key(today)).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn weekly_failure_in_one_day_spares_siblings() {
    let backend = Arc::new(seeded_backend(true).await);
    let monday = day(2025, 5, 19);
    for offset in 0..7 {
        let date = monday + chrono::Duration::days(offset);
        backend.add_entry(entry_on(date, 1)).await;
    }

    // The base pass for 2025-05-21 always fails; everything else succeeds.
    let client = Arc::new(ScriptedClient::new(|_n, request| {
        if request.prompt.contains("2025-05-21") {
            return Err(Error::Generation("model unavailable".to_string()));
        }
        Ok(structured_output(vec![item("story", 50, false, &[])]))
    }));
    let config = Config {
        retry_budget: 2,
        ..Config::default()
    };
    let pipeline = summarizer(
        &backend,
        client.clone(),
        Arc::new(StaticFetcher::failing()),
        config,
    );

    let weekly = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            monday,
            Period::Weekly,
        )
        .await
        .unwrap();
    assert!(!weekly.is_empty());
    assert_eq!(weekly[0].key.period, Period::Weekly);

    let mut daily_row_sets = 0;
    for offset in 0..7 {
        let date = monday + chrono::Duration::days(offset);
        let rows = backend.summaries_for_key(&daily_key(date)).await.unwrap();
        if date == day(2025, 5, 21) {
            assert!(rows.is_empty());
        } else {
            assert_eq!(rows.len(), 1);
            daily_row_sets += 1;
        }
    }
    assert_eq!(daily_row_sets, 6);
}

#[tokio::test]
async fn display_orders_are_unique_per_logical_key() {
    let backend = Arc::new(seeded_backend(true).await);
    let monday = day(2025, 5, 19);
    for offset in 0..3 {
        backend
            .add_entry(entry_on(monday + chrono::Duration::days(offset), 1))
            .await;
    }
    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let pipeline = summarizer(
        &backend,
        client,
        Arc::new(StaticFetcher::failing()),
        Config::default(),
    );
    pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            monday,
            Period::Weekly,
        )
        .await
        .unwrap();

    let mut keys: Vec<SummaryKey> = (0..7)
        .map(|offset| daily_key(monday + chrono::Duration::days(offset)))
        .collect();
    keys.push(SummaryKey {
        period: Period::Weekly,
        ..daily_key(monday)
    });
    for key in keys {
        let rows = backend.summaries_for_key(&key).await.unwrap();
        let orders: HashSet<i32> = rows.iter().map(|r| r.display_order).collect();
        assert_eq!(orders.len(), rows.len());
    }
}

#[tokio::test]
async fn metered_user_over_budget_is_rejected_without_spend() {
    let backend = Arc::new(seeded_backend(false).await);
    backend.add_entry(entry_on(day(2025, 5, 19), 1)).await;
    backend
        .append(nd_core::UsageRecord {
            user_id: USER_ID,
            input_tokens: 1_000,
            output_tokens: 50,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let config = Config {
        limits: nd_llm::LlmLimits {
            max_input_tokens_per_month: 1_000,
            max_output_tokens_per_month: 1_000_000,
        },
        ..Config::default()
    };
    let pipeline = summarizer(
        &backend,
        client.clone(),
        Arc::new(StaticFetcher::failing()),
        config,
    );

    let result = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            day(2025, 5, 19),
            Period::Daily,
        )
        .await;
    assert!(matches!(result, Err(Error::BudgetExceeded(_))));
    // No generation call and no ledger row for the blocked attempt.
    assert_eq!(client.calls(), 0);
    assert_eq!(backend.usage_rows(USER_ID).await.len(), 1);
}

#[tokio::test]
async fn caller_errors_are_rejected_immediately() {
    let backend = Arc::new(seeded_backend(true).await);
    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let pipeline = summarizer(
        &backend,
        client.clone(),
        Arc::new(StaticFetcher::failing()),
        Config::default(),
    );

    // Tuesday is not a valid weekly start.
    let result = pipeline
        .summarize(
            PreferenceExperiment::NoPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            day(2025, 5, 20),
            Period::Weekly,
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidStartDate { .. })));

    let result = pipeline
        .summarize(
            PreferenceExperiment::NoPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            day(2025, 5, 1),
            Period::Monthly,
        )
        .await;
    assert!(matches!(result, Err(Error::UnsupportedPeriod(_))));

    assert_eq!(client.calls(), 0);
    assert!(backend.usage_rows(USER_ID).await.is_empty());
}

#[tokio::test]
async fn expansion_attempts_are_capped_per_batch() {
    let backend = Arc::new(seeded_backend(true).await);
    let start = day(2025, 5, 19);
    backend.add_entry(entry_on(start, 1)).await;

    // 15 items flagged for expansion, all with a reachable reference URL.
    let client = Arc::new(ScriptedClient::new(|_n, request| {
        if request.output_schema.is_some() {
            let items = (0..15)
                .map(|i| item(&format!("story {i}"), 50, true, &["https://news.example.com/x"]))
                .collect();
            Ok(structured_output(items))
        } else {
            Ok(text_output("deep dive"))
        }
    }));
    let fetcher = Arc::new(StaticFetcher::ok("<html>article</html>"));
    let pipeline = summarizer(&backend, client.clone(), fetcher.clone(), Config::default());

    let rows = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            start,
            Period::Daily,
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 15);
    let expanded = rows.iter().filter(|r| r.expanded_content.is_some()).count();
    assert_eq!(expanded, 10);
    assert_eq!(fetcher.calls(), 10);
}

#[tokio::test]
async fn expand_existing_populates_deep_dive() {
    let backend = Arc::new(seeded_backend(true).await);
    let start = day(2025, 5, 19);
    backend.add_entry(entry_on(start, 1)).await;

    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let fetcher = Arc::new(StaticFetcher::ok("<html>article</html>"));
    let pipeline = summarizer(&backend, client, fetcher, Config::default());

    let rows = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            start,
            Period::Daily,
        )
        .await
        .unwrap();
    assert!(rows[0].expanded_content.is_none());

    let updated = pipeline.expand_existing(rows[0].id).await.unwrap();
    assert_eq!(updated.expanded_content.as_deref(), Some("expanded"));
}

#[tokio::test]
async fn click_and_feedback_are_recorded() {
    let backend = Arc::new(seeded_backend(true).await);
    let start = day(2025, 5, 19);
    backend.add_entry(entry_on(start, 1)).await;

    let client = Arc::new(ScriptedClient::new(two_item_handler));
    let pipeline = summarizer(
        &backend,
        client,
        Arc::new(StaticFetcher::failing()),
        Config::default(),
    );
    let rows = pipeline
        .summarize(
            PreferenceExperiment::ApplyPreference,
            ChunkingExperiment::AggregateDaily,
            USER_ID,
            start,
            Period::Daily,
        )
        .await
        .unwrap();

    pipeline.record_click(rows[0].id).await.unwrap();
    let row = backend.summary_by_id(rows[0].id).await.unwrap();
    assert!(row.clicked && row.clicked_at.is_some());

    let key = daily_key(start);
    pipeline.record_display(&key).await.unwrap();
    pipeline.record_feedback(&key, false).await.unwrap();
    let stats = backend.stats_for_key(&key).await.unwrap();
    assert!(stats.shown && stats.disliked && !stats.liked);
}
