use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::enums::InsightSeverity;

use super::super::helpers::{distinct_patients, percent};
use super::super::messages::CardTemplates;
use super::super::source::{ClinicalDataSource, DateRange};
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Artifacts expected for every dosing session.
const ARTIFACTS_PER_SESSION: usize = 4;

/// Patient-level documentation already on file, shared by both windows.
struct PatientRecords {
    with_baseline: HashSet<String>,
    latest_assessment: HashMap<String, NaiveDate>,
}

#[derive(Debug, Clone, Copy)]
struct WindowScore {
    score: i64,
    patients: usize,
}

/// Completeness of session documentation in the recent window against the
/// window before it. Population-level: both windows must meet k-anonymity.
///
/// A session is scored on four artifacts: vitals, a baseline assessment for
/// the patient, an integration log linked to the session and a follow-up
/// assessment dated on or after the session.
pub struct DocumentationDecayRule;

impl DocumentationDecayRule {
    fn score_window(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
        range: DateRange,
        records: &PatientRecords,
    ) -> Result<WindowScore, RuleError> {
        let sessions = source.sessions(ctx.site_id, range)?;
        let patients = distinct_patients(sessions.iter().map(|s| s.patient_id.as_str()));
        ctx.require_k_anonymity(patients, self.name())?;

        let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
        let with_vitals = source.sessions_with_vitals(&session_ids)?;

        let mut patient_ids: Vec<String> = sessions.iter().map(|s| s.patient_id.clone()).collect();
        patient_ids.sort();
        patient_ids.dedup();
        let with_integration: HashSet<Uuid> = source
            .integration_sessions(&patient_ids)?
            .into_iter()
            .filter_map(|i| i.dosing_session_id)
            .collect();

        let present: usize = sessions
            .iter()
            .map(|s| {
                let followed_up = records
                    .latest_assessment
                    .get(&s.patient_id)
                    .is_some_and(|d| *d >= s.session_date);
                [
                    with_vitals.contains(&s.id),
                    records.with_baseline.contains(&s.patient_id),
                    with_integration.contains(&s.id),
                    followed_up,
                ]
                .into_iter()
                .filter(|present| *present)
                .count()
            })
            .sum();

        Ok(WindowScore {
            score: percent(present, sessions.len() * ARTIFACTS_PER_SESSION),
            patients,
        })
    }
}

impl InsightRule for DocumentationDecayRule {
    fn name(&self) -> &'static str {
        "documentation-decay"
    }

    fn severity(&self) -> InsightSeverity {
        InsightSeverity::Review
    }

    fn evaluate(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
    ) -> Result<Option<InsightCard>, RuleError> {
        let b = &ctx.benchmarks;
        let window_days = b.documentation_window_days.value;
        let recent_range = DateRange::trailing(ctx.today, window_days);
        let prior_range = recent_range.preceding(window_days);

        let with_baseline = source
            .baseline_assessments(ctx.site_id)?
            .into_iter()
            .map(|a| a.patient_id)
            .collect();
        let mut latest_assessment: HashMap<String, NaiveDate> = HashMap::new();
        for a in source.longitudinal_assessments(ctx.site_id, None)? {
            let entry = latest_assessment.entry(a.patient_id).or_insert(a.assessment_date);
            *entry = (*entry).max(a.assessment_date);
        }
        let records = PatientRecords {
            with_baseline,
            latest_assessment,
        };

        let recent = self.score_window(source, ctx, recent_range, &records)?;
        let prior = self.score_window(source, ctx, prior_range, &records)?;

        if prior.score - recent.score < b.documentation_drop_points.value {
            return Ok(None);
        }

        let text = CardTemplates::documentation_decay(
            prior.score,
            recent.score,
            recent.patients,
            prior.patients,
            window_days,
        );
        Ok(Some(ctx.card(
            self.name().to_string(),
            self.severity(),
            "Documentation Quality",
            text,
            action("Review Documentation Quality", "/analytics"),
        )))
    }
}
