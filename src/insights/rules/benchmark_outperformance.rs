use crate::models::enums::InsightSeverity;

use super::super::helpers::{complete_trajectories, percent};
use super::super::messages::CardTemplates;
use super::super::source::ClinicalDataSource;
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Clinic responder rate beating the naturalistic benchmark by the
/// configured margin.
pub struct BenchmarkOutperformanceRule;

impl InsightRule for BenchmarkOutperformanceRule {
    fn name(&self) -> &'static str {
        "benchmark-outperformance"
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
        let assessments = source.longitudinal_assessments(ctx.site_id, None)?;
        let trajectories = complete_trajectories(&assessments, b);
        let cohort = trajectories.len();
        ctx.require_k_anonymity(cohort, self.name())?;

        let responders = trajectories
            .iter()
            .filter(|t| t.is_responder(b.responder_reduction_pct.value))
            .count();
        let clinic_rate = percent(responders, cohort);
        let benchmark_rate = b.naturalistic_response_rate.value;
        let delta = clinic_rate - benchmark_rate;

        if delta < b.outperformance_margin_points.value {
            return Ok(None);
        }

        let text = CardTemplates::benchmark_outperformance(
            clinic_rate,
            benchmark_rate,
            delta,
            cohort,
            &b.naturalistic_response_rate.source,
        );
        Ok(Some(ctx.card(
            self.name().to_string(),
            self.severity(),
            "Outcome Performance",
            text,
            action("Export Clinic Summary", "/analytics"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::insights::source::SnapshotSource;

    fn cohort(responders: usize, non_responders: usize) -> SnapshotSource {
        let mut source = SnapshotSource::default();
        for i in 0..responders + non_responders {
            let id = patient(i);
            let endpoint = if i < responders { 6 } else { 16 };
            source.longitudinal.push(assessment(&id, 0, 20, days_ago(90)));
            source.longitudinal.push(assessment(&id, 45, endpoint, days_ago(45)));
        }
        source
    }

    #[test]
    fn outperforming_clinic_triggers() {
        let card = BenchmarkOutperformanceRule
            .evaluate(&cohort(5, 0), &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(card.id, "benchmark-outperformance");
        assert!(card.headline.contains("(100%)"));
        assert!(card.headline.contains("(68%)"));
        assert!(card.headline.contains("by 32 percentage points"));
    }

    #[test]
    fn k_anonymity_floor() {
        assert!(matches!(
            BenchmarkOutperformanceRule.evaluate(&cohort(4, 0), &ctx()),
            Err(RuleError::Disclosure(_))
        ));
        assert!(BenchmarkOutperformanceRule
            .evaluate(&cohort(5, 0), &ctx())
            .unwrap()
            .is_some());
    }

    #[test]
    fn requires_ten_point_margin() {
        // 4 of 5 = 80%, 12 points over the benchmark.
        assert!(BenchmarkOutperformanceRule
            .evaluate(&cohort(4, 1), &ctx())
            .unwrap()
            .is_some());
        // 5 of 7 = 71%, 3 points over.
        assert!(BenchmarkOutperformanceRule
            .evaluate(&cohort(5, 2), &ctx())
            .unwrap()
            .is_none());
    }
}
