use crate::models::enums::InsightSeverity;
use crate::models::ClinicalSession;

use super::super::helpers::distinct_patients;
use super::super::messages::CardTemplates;
use super::super::source::{ClinicalDataSource, DateRange};
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Adverse-event counts for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowCounts {
    events: usize,
    sessions: usize,
    patients: usize,
}

/// Adverse-event rate per session in the recent window against the window
/// before it. Population-level: the recent window must meet k-anonymity.
pub struct SafetySpikeRule;

impl SafetySpikeRule {
    fn window_counts(
        source: &dyn ClinicalDataSource,
        sessions: &[ClinicalSession],
    ) -> Result<WindowCounts, RuleError> {
        let patients = distinct_patients(sessions.iter().map(|s| s.patient_id.as_str()));
        if sessions.is_empty() {
            return Ok(WindowCounts {
                events: 0,
                sessions: 0,
                patients,
            });
        }
        let ids: Vec<_> = sessions.iter().map(|s| s.id).collect();
        let events = source.safety_events(&ids)?.len();
        Ok(WindowCounts {
            events,
            sessions: sessions.len(),
            patients,
        })
    }
}

impl InsightRule for SafetySpikeRule {
    fn name(&self) -> &'static str {
        "safety-event-spike"
    }

    fn severity(&self) -> InsightSeverity {
        InsightSeverity::Safety
    }

    fn evaluate(
        &self,
        source: &dyn ClinicalDataSource,
        ctx: &RuleContext,
    ) -> Result<Option<InsightCard>, RuleError> {
        let b = &ctx.benchmarks;
        let window_days = b.safety_window_days.value;
        let recent_range = DateRange::trailing(ctx.today, window_days);
        let prior_range = recent_range.preceding(window_days);

        let recent_sessions = source.sessions(ctx.site_id, recent_range)?;
        ctx.require_k_anonymity(
            distinct_patients(recent_sessions.iter().map(|s| s.patient_id.as_str())),
            self.name(),
        )?;
        let prior_sessions = source.sessions(ctx.site_id, prior_range)?;

        let recent = Self::window_counts(source, &recent_sessions)?;
        let prior = Self::window_counts(source, &prior_sessions)?;

        if prior.events == 0 || recent.events < b.safety_spike_min_events.value {
            return Ok(None);
        }

        // recent/recent_sessions >= k * prior/prior_sessions, cross-multiplied.
        // Both session counts are non-zero: the recent window passed k-anonymity
        // and the prior window has events, which hang off sessions.
        let lhs = (recent.events * prior.sessions) as f64;
        let rhs = b.safety_spike_multiplier.value * (prior.events * recent.sessions) as f64;
        if lhs < rhs {
            return Ok(None);
        }

        tracing::debug!(
            rule = self.name(),
            recent_events = recent.events,
            prior_events = prior.events,
            "Adverse event spike detected"
        );

        let text = CardTemplates::safety_spike(
            recent.events,
            prior.events,
            recent.sessions,
            recent.patients,
            window_days,
        );
        Ok(Some(ctx.card(
            self.name().to_string(),
            self.severity(),
            "Safety Monitoring",
            text,
            action("View Safety Log", "/wellness-journey"),
        )))
    }
}
