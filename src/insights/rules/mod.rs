//! Insight rule library and its registration table.
//!
//! Each rule is independent: it reads from the data source, computes one
//! statistic, compares it with a benchmark and produces at most one card.
//! Registration order is the tie-break when cards share a severity.

mod baseline_severity;
mod benchmark_outperformance;
mod documentation_decay;
mod follow_up_loss;
mod integration_dropout;
mod non_responder_cluster;
mod safety_spike;
mod substance_mismatch;

pub use baseline_severity::BaselineSeverityMismatchRule;
pub use benchmark_outperformance::BenchmarkOutperformanceRule;
pub use documentation_decay::DocumentationDecayRule;
pub use follow_up_loss::FollowUpLossRule;
pub use integration_dropout::IntegrationDropoutRule;
pub use non_responder_cluster::NonResponderClusterRule;
pub use safety_spike::SafetySpikeRule;
pub use substance_mismatch::SubstanceMismatchRule;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::enums::InsightSeverity;
use crate::models::SiteId;

use super::benchmarks::InsightBenchmarks;
use super::messages::CardText;
use super::privacy::{meets_k_anonymity, require_k_anonymity_with_floor};
use super::source::ClinicalDataSource;
use super::types::{DisclosureError, InsightCard, RuleError, SuggestedAction};

// ─── Context ─────────────────────────────────────────────────────────────────

/// Everything a rule needs besides the data source. `today` is injected so
/// evaluation against a fixed snapshot is reproducible.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub site_id: SiteId,
    pub today: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub benchmarks: Arc<InsightBenchmarks>,
}

impl RuleContext {
    pub fn new(site_id: SiteId, today: NaiveDate, benchmarks: Arc<InsightBenchmarks>) -> Self {
        Self {
            site_id,
            today,
            generated_at: Utc::now(),
            benchmarks,
        }
    }

    /// k-anonymity guard with the configured floor.
    pub fn require_k_anonymity(
        &self,
        cohort_size: usize,
        rule_name: &str,
    ) -> Result<(), DisclosureError> {
        require_k_anonymity_with_floor(
            cohort_size,
            rule_name,
            self.benchmarks.k_anonymity_floor.value,
        )
    }

    pub fn meets_k_anonymity(&self, cohort_size: usize) -> bool {
        meets_k_anonymity(cohort_size, self.benchmarks.k_anonymity_floor.value)
    }

    pub fn card(
        &self,
        id: String,
        severity: InsightSeverity,
        category: &str,
        text: CardText,
        action: SuggestedAction,
    ) -> InsightCard {
        InsightCard {
            id,
            severity,
            category: category.to_string(),
            headline: text.headline,
            body: text.body,
            action,
            source_note: text.source_note,
            generated_at: self.generated_at,
        }
    }
}

pub(crate) fn action(label: &str, route: &str) -> SuggestedAction {
    SuggestedAction {
        label: label.to_string(),
        route: route.to_string(),
    }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// One analytical rule. Implementations hold no mutable state.
pub trait InsightRule: Send + Sync {
    /// Stable rule name; also the card id prefix.
    fn name(&self) -> &'static str;

    /// Severity of the card this rule emits.
    fn severity(&self) -> InsightSeverity;

    /// `Ok(None)` when the trigger condition does not hold.
    fn evaluate(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
    ) -> Result<Option<InsightCard>, RuleError>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Ordered registration table. Position in the table is the tie-break for
/// cards of equal severity, so new rules go at the end.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn InsightRule>>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The eight standard rules in their fixed order.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(FollowUpLossRule)
            .register(SafetySpikeRule)
            .register(IntegrationDropoutRule)
            .register(BenchmarkOutperformanceRule)
            .register(NonResponderClusterRule)
            .register(SubstanceMismatchRule)
            .register(DocumentationDecayRule)
            .register(BaselineSeverityMismatchRule);
        registry
    }

    pub fn register(&mut self, rule: impl InsightRule + 'static) -> &mut Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn rules(&self) -> &[Arc<dyn InsightRule>] {
        &self.rules
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
