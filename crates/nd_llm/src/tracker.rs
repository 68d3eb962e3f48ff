use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

use nd_core::{Result, TokenUsage, UsageRecord, UsageStore, UserStore};

/// Monthly per-user token ceilings.
#[derive(Debug, Clone, Copy)]
pub struct LlmLimits {
    pub max_input_tokens_per_month: i64,
    pub max_output_tokens_per_month: i64,
}

impl Default for LlmLimits {
    fn default() -> Self {
        Self {
            max_input_tokens_per_month: 1_000_000,
            max_output_tokens_per_month: 200_000,
        }
    }
}

/// Accumulates token spend across every generation attempt of one
/// summarization run. Concurrent chunk tasks share one tracker; exactly one
/// ledger row is written when the run ends, success or not.
pub struct UsageTracker {
    user_id: i64,
    input_tokens: AtomicI64,
    output_tokens: AtomicI64,
}

impl UsageTracker {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            input_tokens: AtomicI64::new(0),
            output_tokens: AtomicI64::new(0),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn record(&self, usage: TokenUsage) {
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    pub fn totals(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }

    /// Persist the run's accumulated spend as a single ledger row.
    pub async fn flush(&self, ledger: &dyn UsageStore) -> Result<()> {
        let totals = self.totals();
        info!(
            user_id = self.user_id,
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            "recording LLM usage for run"
        );
        ledger
            .append(UsageRecord {
                user_id: self.user_id,
                input_tokens: totals.input_tokens,
                output_tokens: totals.output_tokens,
                created_at: Utc::now(),
            })
            .await
    }
}

/// First instant of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Advisory monthly budget check, evaluated against the ledger on demand.
pub struct BudgetGate {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn UsageStore>,
    limits: LlmLimits,
}

impl BudgetGate {
    pub fn new(users: Arc<dyn UserStore>, ledger: Arc<dyn UsageStore>, limits: LlmLimits) -> Self {
        Self {
            users,
            ledger,
            limits,
        }
    }

    pub async fn exceeds_budget(&self, user_id: i64) -> Result<bool> {
        self.exceeds_budget_at(user_id, Utc::now()).await
    }

    pub async fn exceeds_budget_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let profile = self.users.user_profile(user_id).await?;
        if profile.unmetered {
            return Ok(false);
        }
        let (input, output) = self.ledger.totals_since(user_id, month_start(now)).await?;
        Ok(input >= self.limits.max_input_tokens_per_month
            || output >= self.limits.max_output_tokens_per_month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::UserProfile;
    use nd_storage::MemoryBackend;

    fn user(id: i64, unmetered: bool) -> UserProfile {
        UserProfile {
            id,
            news_preference: None,
            subscribed_feed_ids: vec![],
            unmetered,
        }
    }

    #[tokio::test]
    async fn tracker_accumulates_and_writes_one_row() {
        let backend = MemoryBackend::new();
        let tracker = UsageTracker::new(1);
        tracker.record(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        });
        tracker.record(TokenUsage {
            input_tokens: 50,
            output_tokens: 5,
        });
        tracker.flush(&backend).await.unwrap();

        let rows = backend.usage_rows(1).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].input_tokens, 150);
        assert_eq!(rows[0].output_tokens, 25);
    }

    #[tokio::test]
    async fn unmetered_user_is_never_blocked() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_user(user(1, true)).await;
        let tracker = UsageTracker::new(1);
        tracker.record(TokenUsage {
            input_tokens: 10_000_000,
            output_tokens: 10_000_000,
        });
        tracker.flush(backend.as_ref()).await.unwrap();

        let gate = BudgetGate::new(backend.clone(), backend.clone(), LlmLimits::default());
        assert!(!gate.exceeds_budget(1).await.unwrap());
    }

    #[tokio::test]
    async fn metered_user_blocked_at_either_ceiling() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_user(user(2, false)).await;
        let gate = BudgetGate::new(
            backend.clone(),
            backend.clone(),
            LlmLimits {
                max_input_tokens_per_month: 1_000,
                max_output_tokens_per_month: 100,
            },
        );
        assert!(!gate.exceeds_budget(2).await.unwrap());

        let tracker = UsageTracker::new(2);
        tracker.record(TokenUsage {
            input_tokens: 0,
            output_tokens: 100,
        });
        tracker.flush(backend.as_ref()).await.unwrap();
        assert!(gate.exceeds_budget(2).await.unwrap());
    }

    #[test]
    fn month_start_truncates() {
        let now = Utc.with_ymd_and_hms(2025, 5, 19, 13, 45, 12).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
        );
    }
}
