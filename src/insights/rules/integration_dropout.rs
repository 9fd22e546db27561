use std::collections::HashMap;

use crate::models::enums::InsightSeverity;

use super::super::helpers::{complete_trajectories, percent};
use super::super::messages::{CardTemplates, DropoutStats};
use super::super::source::ClinicalDataSource;
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Non-responders (by percentage PHQ-9 reduction) who averaged fewer
/// integration sessions than the published target.
pub struct IntegrationDropoutRule;

impl InsightRule for IntegrationDropoutRule {
    fn name(&self) -> &'static str {
        "integration-dropout-correlation"
    }

    fn severity(&self) -> InsightSeverity {
        InsightSeverity::Opportunity
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

        let non_responders: Vec<String> = trajectories
            .iter()
            .filter(|t| !t.is_responder(b.responder_reduction_pct.value))
            .map(|t| t.patient_id.clone())
            .collect();
        if non_responders.is_empty() {
            return Ok(None);
        }

        let mut per_patient: HashMap<&str, usize> = HashMap::new();
        let integration = source.integration_sessions(&non_responders)?;
        for row in &integration {
            *per_patient.entry(row.patient_id.as_str()).or_default() += 1;
        }
        let total: usize = non_responders
            .iter()
            .map(|id| per_patient.get(id.as_str()).copied().unwrap_or(0))
            .sum();
        let avg_sessions = total as f64 / non_responders.len() as f64;

        if avg_sessions >= b.integration_sessions_target.value {
            return Ok(None);
        }

        let response_rate = percent(cohort - non_responders.len(), cohort);
        let stats = DropoutStats {
            response_rate,
            non_responders: non_responders.len(),
            cohort,
            avg_sessions,
        };
        let text = CardTemplates::integration_dropout(&stats, b);
        Ok(Some(ctx.card(
            self.name().to_string(),
            self.severity(),
            "Integration Protocol",
            text,
            action("Review Integration Sessions", "/wellness-journey"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::db;
    use crate::insights::source::{SnapshotSource, SqliteSource};

    /// `n` patients from PHQ-9 `baseline` to `endpoint`, each with
    /// `integration_count` support sessions.
    fn cohort(n: usize, baseline: u8, endpoint: u8, integration_count: usize) -> SnapshotSource {
        let mut source = SnapshotSource::default();
        for i in 0..n {
            let id = patient(i);
            source.longitudinal.push(assessment(&id, 0, baseline, days_ago(80)));
            source.longitudinal.push(assessment(&id, 30, endpoint, days_ago(50)));
            for k in 0..integration_count {
                source.integration.push(integration(&id, k, None));
            }
        }
        source
    }

    #[test]
    fn six_non_responders_with_two_sessions_each() {
        let card = IntegrationDropoutRule
            .evaluate(&cohort(6, 20, 11, 2), &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(card.id, "integration-dropout-correlation");
        assert_eq!(card.severity, InsightSeverity::Opportunity);
        assert!(card.headline.contains("6 of 6"));
        assert!(card.headline.contains("2.0"));
        assert!(card.headline.starts_with("Response rate is 0%"));
    }

    #[test]
    fn k_anonymity_floor() {
        assert!(matches!(
            IntegrationDropoutRule.evaluate(&cohort(4, 20, 11, 2), &ctx()),
            Err(RuleError::Disclosure(_))
        ));
        assert!(IntegrationDropoutRule
            .evaluate(&cohort(5, 20, 11, 2), &ctx())
            .unwrap()
            .is_some());
    }

    #[test]
    fn all_responders_do_not_trigger() {
        assert!(IntegrationDropoutRule
            .evaluate(&cohort(6, 20, 10, 0), &ctx())
            .unwrap()
            .is_none());
    }

    #[test]
    fn enough_integration_sessions_do_not_trigger() {
        assert!(IntegrationDropoutRule
            .evaluate(&cohort(6, 20, 15, 4), &ctx())
            .unwrap()
            .is_none());
    }

    #[test]
    fn incomplete_trajectories_are_not_counted() {
        let mut source = cohort(4, 20, 11, 1);
        // Baseline only; no endpoint inside the window.
        source.longitudinal.push(assessment("PT-LATE", 1, 20, days_ago(80)));
        source.longitudinal.push(assessment("PT-LATE", 120, 9, days_ago(10)));
        assert!(matches!(
            IntegrationDropoutRule.evaluate(&source, &ctx()),
            Err(RuleError::Disclosure(e)) if e.cohort_size == 4
        ));
    }

    #[test]
    fn sqlite_source_matches_snapshot() {
        let snapshot = cohort(6, 20, 11, 2);
        let sqlite = SqliteSource::open_in_memory().unwrap();
        {
            let conn = sqlite.connection().unwrap();
            for a in &snapshot.longitudinal {
                db::insert_longitudinal_assessment(&conn, a).unwrap();
            }
            for row in &snapshot.integration {
                db::insert_integration_session(&conn, row).unwrap();
            }
        }

        let from_db = IntegrationDropoutRule
            .evaluate(&sqlite, &ctx())
            .unwrap()
            .unwrap();
        let from_memory = IntegrationDropoutRule
            .evaluate(&snapshot, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(from_db.id, from_memory.id);
        assert_eq!(from_db.headline, from_memory.headline);
        assert_eq!(from_db.source_note, from_memory.source_note);
        assert!(from_db.headline.contains("6 of 6"));
        assert!(from_db.headline.contains("2.0"));
    }

    #[test]
    fn sqlite_source_enforces_k_anonymity() {
        let snapshot = cohort(4, 20, 11, 2);
        let sqlite = SqliteSource::open_in_memory().unwrap();
        {
            let conn = sqlite.connection().unwrap();
            for a in &snapshot.longitudinal {
                db::insert_longitudinal_assessment(&conn, a).unwrap();
            }
        }
        assert!(matches!(
            IntegrationDropoutRule.evaluate(&sqlite, &ctx()),
            Err(RuleError::Disclosure(e)) if e.cohort_size == 4
        ));
    }
}
