use std::collections::HashSet;

use crate::models::enums::InsightSeverity;

use super::super::helpers::mean_and_sd;
use super::super::messages::CardTemplates;
use super::super::source::ClinicalDataSource;
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Clinic mean baseline PHQ-9 well above the published benchmark population.
/// Uses each patient's earliest scored baseline.
pub struct BaselineSeverityMismatchRule;

impl InsightRule for BaselineSeverityMismatchRule {
    fn name(&self) -> &'static str {
        "baseline-severity-mismatch"
    }

    fn severity(&self) -> InsightSeverity {
        InsightSeverity::Signal
    }

    fn evaluate(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
    ) -> Result<Option<InsightCard>, RuleError> {
        let b = &ctx.benchmarks;
        let baselines = source.baseline_assessments(ctx.site_id)?;

        let mut seen = HashSet::new();
        let scores: Vec<f64> = baselines
            .iter()
            .filter_map(|a| a.phq9_score.map(|score| (a.patient_id.as_str(), score)))
            .filter(|(patient_id, _)| seen.insert(*patient_id))
            .map(|(_, score)| f64::from(score))
            .collect();
        ctx.require_k_anonymity(scores.len(), self.name())?;

        let Some((mean, sd)) = mean_and_sd(&scores) else {
            return Ok(None);
        };
        let benchmark = b.benchmark_phq9_baseline.value;
        let diff = mean - benchmark;

        // A zero spread with a positive difference still counts.
        if diff <= 0.0 || diff < b.baseline_sd_multiple.value * sd {
            return Ok(None);
        }

        let text = CardTemplates::baseline_severity_mismatch(mean, sd, benchmark, scores.len());
        Ok(Some(ctx.card(
            self.name().to_string(),
            self.severity(),
            "Benchmark Context",
            text,
            action("View Benchmark Intelligence", "/analytics"),
        )))
    }
}
