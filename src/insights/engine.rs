use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;

use crate::config::DEFAULT_RULE_TIMEOUT;
use crate::models::SiteId;

use super::benchmarks::InsightBenchmarks;
use super::rules::{InsightRule, RuleContext, RuleRegistry};
use super::source::ClinicalDataSource;
use super::types::{InsightFeed, OutcomeKind, RuleError, RuleOutcome, RuleReport};

/// Runtime knobs for the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// A rule still running after this long counts as errored.
    pub rule_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            rule_timeout: DEFAULT_RULE_TIMEOUT,
        }
    }
}

/// Insight aggregator.
/// Fans every registered rule out concurrently against the shared read-only
/// source, then merges and ranks the cards. Never fails as a whole.
pub struct InsightEngine {
    source: Arc<dyn ClinicalDataSource>,
    registry: RuleRegistry,
    benchmarks: Arc<InsightBenchmarks>,
    options: EngineOptions,
}

impl InsightEngine {
    /// Standard rule table with the published benchmarks.
    pub fn new(source: Arc<dyn ClinicalDataSource>) -> Self {
        Self {
            source,
            registry: RuleRegistry::standard(),
            benchmarks: Arc::new(InsightBenchmarks::default()),
            options: EngineOptions::default(),
        }
    }

    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_benchmarks(mut self, benchmarks: InsightBenchmarks) -> Self {
        self.benchmarks = Arc::new(benchmarks);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn benchmarks(&self) -> &InsightBenchmarks {
        &self.benchmarks
    }

    /// Evaluate as of today's UTC date.
    pub async fn run(&self, site_id: SiteId) -> InsightFeed {
        self.run_as_of(site_id, Utc::now().date_naive()).await
    }

    /// Evaluate with a fixed "today". Identical snapshots give identical
    /// cards, ids and ordering (timestamps aside).
    pub async fn run_as_of(&self, site_id: SiteId, today: NaiveDate) -> InsightFeed {
        let start = Instant::now();
        let ctx = Arc::new(RuleContext::new(site_id, today, Arc::clone(&self.benchmarks)));

        let tasks = self.registry.rules().iter().map(|rule| {
            evaluate_bounded(
                Arc::clone(rule),
                Arc::clone(&self.source),
                Arc::clone(&ctx),
                self.options.rule_timeout,
            )
        });
        let results = join_all(tasks).await;

        let mut cards = Vec::new();
        let mut reports = Vec::with_capacity(results.len());
        let mut has_sufficient_data = false;

        for (name, outcome, elapsed) in results {
            has_sufficient_data |= outcome.had_sufficient_data();
            let detail = match &outcome {
                RuleOutcome::Triggered(card) => {
                    tracing::debug!(rule = name, card_id = %card.id, "Insight rule triggered");
                    None
                }
                RuleOutcome::NotTriggered => None,
                RuleOutcome::Suppressed(e) => {
                    tracing::debug!(rule = name, cohort_size = e.cohort_size, "Insight suppressed");
                    Some(e.to_string())
                }
                RuleOutcome::InsufficientData(reason) => Some(reason.clone()),
                RuleOutcome::Errored(e) => {
                    tracing::warn!(rule = name, site_id, error = %e, "Insight rule failed");
                    Some(e.clone())
                }
            };
            reports.push(RuleReport {
                rule: name.to_string(),
                outcome: outcome.kind(),
                detail,
                elapsed_ms: elapsed.as_millis() as u64,
            });
            if let Some(card) = outcome.into_card() {
                cards.push(card);
            }
        }

        // Stable: equal severities keep registration order.
        cards.sort_by_key(|c| c.severity.rank());

        let processing_time_ms = start.elapsed().as_millis() as u64;
        let errored = reports
            .iter()
            .filter(|r| r.outcome == OutcomeKind::Errored)
            .count();

        tracing::info!(
            site_id,
            rules = reports.len(),
            cards = cards.len(),
            errored,
            has_sufficient_data,
            processing_ms = processing_time_ms,
            "Insight evaluation complete"
        );

        InsightFeed {
            cards,
            reports,
            has_sufficient_data,
            processing_time_ms,
        }
    }
}

/// Run one rule on the blocking pool under a deadline. A timed-out rule keeps
/// running on its thread but its result is discarded.
async fn evaluate_bounded(
    rule: Arc<dyn InsightRule>,
    source: Arc<dyn ClinicalDataSource>,
    ctx: Arc<RuleContext>,
    timeout: Duration,
) -> (&'static str, RuleOutcome, Duration) {
    let started = Instant::now();
    let name = rule.name();
    let handle = tokio::task::spawn_blocking(move || rule.evaluate(source.as_ref(), &ctx));

    let result = match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RuleError::TaskFailed(join_error.to_string())),
        Err(_) => Err(RuleError::TimedOut(timeout)),
    };

    (name, RuleOutcome::from(result), started.elapsed())
}
