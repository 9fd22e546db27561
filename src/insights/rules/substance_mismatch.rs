use std::collections::{BTreeMap, BTreeSet};

use crate::models::enums::InsightSeverity;

use super::super::helpers::slug;
use super::super::messages::CardTemplates;
use super::super::source::{ClinicalDataSource, DateRange};
use super::super::types::{InsightCard, RuleError};
use super::{action, InsightRule, RuleContext};

/// Case-volume imbalance between substances treating the same condition.
///
/// k-anonymity applies per (condition, substance) subgroup: a subgroup under
/// the floor is left out of every comparison.
pub struct SubstanceMismatchRule;

impl InsightRule for SubstanceMismatchRule {
    fn name(&self) -> &'static str {
        "substance-mismatch"
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
        let sessions = source.sessions(ctx.site_id, DateRange::all())?;
        if sessions.len() < b.min_sessions_for_volume_comparison.value {
            return Err(RuleError::InsufficientData("too few sessions for a volume comparison"));
        }

        // condition -> substance -> patients
        let mut groups: BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
        for s in &sessions {
            let Some(condition) = s.condition.as_deref().filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            if s.substance.trim().is_empty() {
                continue;
            }
            groups
                .entry(condition)
                .or_default()
                .entry(s.substance.as_str())
                .or_default()
                .insert(s.patient_id.as_str());
        }

        let largest = groups
            .values()
            .flat_map(|by_substance| by_substance.values().map(BTreeSet::len))
            .max()
            .unwrap_or(0);
        ctx.require_k_anonymity(largest, self.name())?;

        for (condition, by_substance) in &groups {
            let mut eligible: Vec<(&str, usize)> = by_substance
                .iter()
                .map(|(substance, patients)| (*substance, patients.len()))
                .filter(|(_, n)| ctx.meets_k_anonymity(*n))
                .collect();
            if eligible.len() < 2 {
                continue;
            }

            // Stable: equal sizes keep substance-name order.
            eligible.sort_by(|x, y| y.1.cmp(&x.1));
            let (top_substance, top_count) = eligible[0];
            let (bottom_substance, bottom_count) = eligible[eligible.len() - 1];
            let ratio = top_count as f64 / bottom_count as f64;
            if ratio < b.case_volume_ratio.value {
                continue;
            }

            let text = CardTemplates::substance_mismatch(
                condition,
                top_substance,
                top_count,
                bottom_substance,
                bottom_count,
                ratio,
            );
            return Ok(Some(ctx.card(
                format!("{}-{}", self.name(), slug(condition)),
                self.severity(),
                "Protocol Optimization",
                text,
                action("View Patient Galaxy", "/analytics"),
            )));
        }

        Ok(None)
    }
}
