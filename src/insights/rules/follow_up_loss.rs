use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::enums::InsightSeverity;

use super::super::messages::CardTemplates;
use super::super::source::{ClinicalDataSource, DateRange};
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Most recent dosing session, older than the overdue threshold, whose patient
/// has no assessment dated on or after the session.
///
/// Single-patient rule: the card names one flagged patient to the clinician
/// who already holds that patient's record. It is exempt from k-anonymity and
/// never calls the guard.
pub struct FollowUpLossRule;

impl InsightRule for FollowUpLossRule {
    fn name(&self) -> &'static str {
        "follow-up-loss"
    }

    fn severity(&self) -> InsightSeverity {
        InsightSeverity::Safety
    }

    fn evaluate(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
    ) -> Result<Option<InsightCard>, RuleError> {
        let cutoff = ctx.today - Duration::days(ctx.benchmarks.follow_up_overdue_days.value);
        let sessions = source.sessions(ctx.site_id, DateRange::before(cutoff))?;
        if sessions.is_empty() {
            return Err(RuleError::InsufficientData("no sessions past the follow-up threshold"));
        }

        let mut patient_ids: Vec<String> = sessions.iter().map(|s| s.patient_id.clone()).collect();
        patient_ids.sort();
        patient_ids.dedup();

        // Latest assessment date per patient is enough to answer "any on or after".
        let assessments = source.longitudinal_assessments(ctx.site_id, Some(&patient_ids))?;
        let mut latest: HashMap<&str, NaiveDate> = HashMap::new();
        for a in &assessments {
            latest
                .entry(a.patient_id.as_str())
                .and_modify(|d| *d = (*d).max(a.assessment_date))
                .or_insert(a.assessment_date);
        }

        // Sessions arrive newest first; the first gap found is reported.
        let Some(session) = sessions.iter().find(|s| {
            latest
                .get(s.patient_id.as_str())
                .map_or(true, |d| *d < s.session_date)
        }) else {
            return Ok(None);
        };

        let days_since = (ctx.today - session.session_date).num_days();
        tracing::debug!(rule = self.name(), days_since, "Follow-up gap found");

        let text = CardTemplates::follow_up_loss(
            &session.patient_id,
            days_since,
            &session.session_date.format("%Y-%m-%d").to_string(),
        );
        Ok(Some(ctx.card(
            format!("{}-{}", self.name(), session.patient_id),
            self.severity(),
            "Patient Follow-Up",
            text,
            action(
                "Open Patient Journey",
                &format!("/wellness-journey?patient={}", session.patient_id),
            ),
        )))
    }
}
