use super::benchmarks::InsightBenchmarks;

/// Text for one card: the headline carries the computed numbers, the body the
/// rationale, the source note the cohort size and comparison reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CardText {
    pub headline: String,
    pub body: String,
    pub source_note: String,
}

/// Computed figures behind an integration-dropout card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutStats {
    pub response_rate: i64,
    pub non_responders: usize,
    pub cohort: usize,
    pub avg_sessions: f64,
}

/// Message template builder for insight cards.
/// Headlines state the number and the comparison; no patient detail beyond
/// the pseudonymous link code of a single flagged patient.
pub struct CardTemplates;

impl CardTemplates {
    pub fn integration_dropout(stats: &DropoutStats, b: &InsightBenchmarks) -> CardText {
        let DropoutStats {
            response_rate,
            non_responders,
            cohort,
            avg_sessions,
        } = *stats;
        let target = b.integration_sessions_target.value;
        let target_rate = b.integration_target_response_rate.value;
        let benchmark_rate = b.naturalistic_response_rate.value;
        let benchmark_source = &b.naturalistic_response_rate.source;
        CardText {
            headline: format!(
                "Response rate is {response_rate}%: {non_responders} of {cohort} patients \
                 averaged only {avg_sessions:.1} integration sessions."
            ),
            body: format!(
                "Clinics averaging at least {target:.0} post-session integration meetings show \
                 {target_rate}% response rates in published real-world data, against a \
                 {benchmark_rate}% naturalistic benchmark. Reviewing integration protocol \
                 completeness for non-responding patients is the highest-leverage improvement \
                 available."
            ),
            source_note: format!(
                "Based on n={cohort} patients with complete PHQ-9 data · Comparison: {benchmark_source}"
            ),
        }
    }

    pub fn follow_up_loss(patient_id: &str, days_since: i64, session_date: &str) -> CardText {
        CardText {
            headline: format!(
                "Patient {patient_id} has no documented follow-up in {days_since} days since their session."
            ),
            body: "Dosing sessions call for a 30-day reassessment. Extended time without a \
                   follow-up assessment leaves a gap in safety monitoring and prevents accurate \
                   outcome tracking. Schedule a check-in to maintain continuity of care."
                .to_string(),
            source_note: format!(
                "Session date: {session_date} · Single-patient flag, exempt from k-anonymity"
            ),
        }
    }

    pub fn substance_mismatch(
        condition: &str,
        top_substance: &str,
        top_count: usize,
        bottom_substance: &str,
        bottom_count: usize,
        ratio: f64,
    ) -> CardText {
        CardText {
            headline: format!(
                "Your {top_substance} patients with {condition} represent {top_count} cases vs. \
                 {bottom_count} for {bottom_substance}, a {ratio:.1}x difference in case volume."
            ),
            body: format!(
                "Large variation in case volume across substances for the same condition may \
                 indicate an emerging clinical pattern. Review outcome data for each group to see \
                 whether one protocol is yielding stronger results for {condition} in your practice."
            ),
            source_note: format!(
                "Based on n={} patients with complete substance and indication data · \
                 k-anonymity enforced per subgroup",
                top_count + bottom_count
            ),
        }
    }

    pub fn documentation_decay(
        prior_score: i64,
        recent_score: i64,
        recent_patients: usize,
        prior_patients: usize,
        window_days: i64,
    ) -> CardText {
        let weeks = window_days / 7;
        CardText {
            headline: format!(
                "Documentation completeness dropped from {prior_score}% to {recent_score}% over the past {weeks} weeks."
            ),
            body: "Incomplete session records prevent accurate outcome tracking and benchmark \
                   comparison. Missing elements most commonly include integration session logs \
                   and follow-up assessments."
                .to_string(),
            source_note: format!(
                "Based on n={recent_patients} patients in the past {weeks} weeks · \
                 Prior period: n={prior_patients} patients"
            ),
        }
    }

    pub fn benchmark_outperformance(
        clinic_rate: i64,
        benchmark_rate: i64,
        delta: i64,
        cohort: usize,
        benchmark_source: &str,
    ) -> CardText {
        CardText {
            headline: format!(
                "Your response rate ({clinic_rate}%) outperforms the real-world naturalistic \
                 benchmark ({benchmark_rate}%) by {delta} percentage points."
            ),
            body: "This result warrants documenting your current protocol. Formalizing your \
                   integration structure, dosing protocol and preparation methodology protects \
                   this advantage as your caseload grows."
                .to_string(),
            source_note: format!(
                "Based on n={cohort} patients with complete PHQ-9 data · Comparison: {benchmark_source}"
            ),
        }
    }

    pub fn safety_spike(
        recent_events: usize,
        prior_events: usize,
        recent_sessions: usize,
        recent_patients: usize,
        window_days: i64,
    ) -> CardText {
        CardText {
            headline: format!(
                "Adverse event rate doubled in the past {window_days} days: {recent_events} events \
                 vs. {prior_events} in the prior period."
            ),
            body: "A marked increase in adverse event frequency warrants immediate review of \
                   safety logs and any recent protocol or personnel changes. Check for new \
                   substances, dosing adjustments or changes in intake screening that correlate \
                   with the increase."
                .to_string(),
            source_note: format!(
                "Based on n={recent_patients} patients in the past {window_days} days · \
                 {recent_events} events across {recent_sessions} sessions"
            ),
        }
    }

    pub fn non_responder_cluster(
        substance: &str,
        non_responders: usize,
        cohort: usize,
        cutoff: u8,
    ) -> CardText {
        CardText {
            headline: format!(
                "{non_responders} recent {substance} patients have not yet achieved clinical \
                 response on PHQ-9 follow-up."
            ),
            body: "Clustering of non-responders within a single modality may reflect a protocol \
                   variable worth reviewing: preparation depth, dosing protocol, integration \
                   support or patient selection. Consider protocol review or peer consultation."
                .to_string(),
            source_note: format!(
                "Based on {non_responders} recent {substance} patients with follow-up PHQ-9 above \
                 {cutoff} · k-anonymity: n={cohort} total patients"
            ),
        }
    }

    pub fn baseline_severity_mismatch(
        mean: f64,
        sd: f64,
        benchmark: f64,
        cohort: usize,
    ) -> CardText {
        let diff = mean - benchmark;
        CardText {
            headline: format!(
                "Your patients' average PHQ-9 baseline ({mean:.1}) is higher than the published \
                 benchmark population ({benchmark}) by {diff:.1} points."
            ),
            body: "Your clinic is treating a more severely affected population than the \
                   benchmarks it is compared against, so response-rate comparisons may \
                   understate actual clinical performance. Interpret benchmark comparisons in \
                   light of this higher baseline severity."
                .to_string(),
            source_note: format!(
                "Based on n={cohort} patients with baseline PHQ-9 data (mean={mean:.1}, SD={sd:.1}) · \
                 Benchmark: naturalistic mean PHQ-9 of {benchmark}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_dropout_embeds_counts() {
        let stats = DropoutStats {
            response_rate: 0,
            non_responders: 6,
            cohort: 6,
            avg_sessions: 2.0,
        };
        let b = InsightBenchmarks::default();
        let text = CardTemplates::integration_dropout(&stats, &b);
        assert!(text.headline.contains("6 of 6"));
        assert!(text.headline.contains("2.0"));
        assert!(text.body.contains("at least 4 post-session"));
        assert!(text.body.contains("71%"));
        assert!(text.source_note.contains("n=6"));
        assert!(text
            .source_note
            .contains(b.naturalistic_response_rate.source.as_str()));
    }

    #[test]
    fn follow_up_loss_marks_exemption() {
        let text = CardTemplates::follow_up_loss("PT-0042", 45, "2026-01-01");
        assert!(text.headline.contains("PT-0042"));
        assert!(text.headline.contains("45 days"));
        assert!(text.source_note.contains("exempt"));
    }

    #[test]
    fn baseline_mismatch_formats_one_decimal() {
        let text = CardTemplates::baseline_severity_mismatch(20.0, 1.0, 14.2, 6);
        assert!(text.headline.contains("(20.0)"));
        assert!(text.headline.contains("5.8 points"));
    }
}
