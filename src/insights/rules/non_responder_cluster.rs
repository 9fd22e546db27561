use std::collections::{BTreeSet, HashMap};

use crate::models::enums::InsightSeverity;

use super::super::helpers::{distinct_patients, slug};
use super::super::messages::CardTemplates;
use super::super::source::{ClinicalDataSource, DateRange};
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Patients from the most recent sessions whose latest follow-up PHQ-9 is
/// still above the residual-severity cutoff, grouped by substance.
///
/// Three nested slices of the newest sessions: the widest sets the
/// k-anonymity cohort, the middle one picks whose follow-ups are read and
/// the narrowest is counted.
///
/// This uses the residual-score responder definition, not the percentage
/// reduction used by the dropout and outperformance rules.
pub struct NonResponderClusterRule;

impl InsightRule for NonResponderClusterRule {
    fn name(&self) -> &'static str {
        "non-responder-cluster"
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
        let mut sessions = source.sessions(ctx.site_id, DateRange::before(ctx.today))?;
        sessions.truncate(b.cluster_recent_sessions.value);

        let cohort = distinct_patients(sessions.iter().map(|s| s.patient_id.as_str()));
        ctx.require_k_anonymity(cohort, self.name())?;

        let mut patient_ids: Vec<String> = sessions
            .iter()
            .take(b.cluster_follow_up_sessions.value)
            .map(|s| s.patient_id.clone())
            .collect();
        patient_ids.sort();
        patient_ids.dedup();

        // Offset-ascending order, so the last qualifying reading is the latest.
        let mut latest_follow_up: HashMap<String, u8> = HashMap::new();
        for a in source.longitudinal_assessments(ctx.site_id, Some(&patient_ids))? {
            if a.days_post_session >= b.cluster_min_follow_up_offset.value {
                latest_follow_up.insert(a.patient_id, a.phq9_score);
            }
        }

        // Substances in order of first appearance, newest session first.
        let cutoff = b.residual_severity_cutoff.value;
        let mut groups: Vec<(&str, BTreeSet<&str>)> = Vec::new();
        for s in sessions.iter().take(b.cluster_count_sessions.value) {
            let still_symptomatic = latest_follow_up
                .get(&s.patient_id)
                .is_some_and(|score| *score > cutoff);
            if !still_symptomatic {
                continue;
            }
            match groups.iter_mut().find(|(name, _)| *name == s.substance) {
                Some((_, patients)) => {
                    patients.insert(s.patient_id.as_str());
                }
                None => groups.push((s.substance.as_str(), BTreeSet::from([s.patient_id.as_str()]))),
            }
        }

        let Some((substance, non_responders)) = groups
            .into_iter()
            .find(|(_, patients)| patients.len() >= b.cluster_min_non_responders.value)
        else {
            return Ok(None);
        };

        let text =
            CardTemplates::non_responder_cluster(substance, non_responders.len(), cohort, cutoff);
        Ok(Some(ctx.card(
            format!("{}-{}", self.name(), slug(substance)),
            self.severity(),
            "Protocol Review",
            text,
            action("View Protocol Efficiency", "/analytics"),
        )))
    }
}
