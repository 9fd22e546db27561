use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::LongitudinalAssessment;

use super::benchmarks::InsightBenchmarks;

/// Baseline and endpoint PHQ-9 for one patient.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub patient_id: String,
    pub baseline: u8,
    pub endpoint: u8,
}

impl Trajectory {
    /// Percentage reduction from baseline. Positive means improvement.
    pub fn reduction_pct(&self) -> f64 {
        (f64::from(self.baseline) - f64::from(self.endpoint)) / f64::from(self.baseline) * 100.0
    }

    /// Responder by percentage reduction (not the residual-score definition).
    pub fn is_responder(&self, threshold_pct: f64) -> bool {
        self.reduction_pct() >= threshold_pct
    }
}

/// Build one trajectory per patient that has both a baseline
/// (offset <= baseline_max_offset_days) and an endpoint (offset within the
/// endpoint window). `assessments` must be in offset order; the last
/// qualifying reading wins. Sorted by patient id.
///
/// Patients with a zero baseline are dropped: a percentage change from zero
/// is undefined.
pub fn complete_trajectories(
    assessments: &[LongitudinalAssessment],
    benchmarks: &InsightBenchmarks,
) -> Vec<Trajectory> {
    let baseline_max = benchmarks.baseline_max_offset_days.value;
    let endpoint_window =
        benchmarks.endpoint_window_start_days.value..=benchmarks.endpoint_window_end_days.value;

    let mut by_patient: BTreeMap<&str, (Option<u8>, Option<u8>)> = BTreeMap::new();
    for row in assessments {
        let entry = by_patient.entry(row.patient_id.as_str()).or_default();
        if row.days_post_session <= baseline_max {
            entry.0 = Some(row.phq9_score);
        }
        if endpoint_window.contains(&row.days_post_session) {
            entry.1 = Some(row.phq9_score);
        }
    }

    by_patient
        .into_iter()
        .filter_map(|(patient_id, scores)| match scores {
            (Some(0), Some(_)) => {
                tracing::debug!("Skipping trajectory with zero baseline");
                None
            }
            (Some(baseline), Some(endpoint)) => Some(Trajectory {
                patient_id: patient_id.to_string(),
                baseline,
                endpoint,
            }),
            _ => None,
        })
        .collect()
}

/// Count of distinct patient references.
pub fn distinct_patients<'a>(ids: impl IntoIterator<Item = &'a str>) -> usize {
    ids.into_iter().collect::<HashSet<_>>().len()
}

/// Mean and population standard deviation. `None` for an empty slice.
pub fn mean_and_sd(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Whole-number percentage, rounded half away from zero.
pub fn percent(numerator: usize, denominator: usize) -> i64 {
    if denominator == 0 {
        return 0;
    }
    (numerator as f64 / denominator as f64 * 100.0).round() as i64
}

static RE_NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, hyphen-separated form of free text for use inside card ids.
pub fn slug(text: &str) -> String {
    RE_NON_SLUG
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;

    fn reading(patient: &str, offset: i32, score: u8) -> LongitudinalAssessment {
        LongitudinalAssessment {
            id: Uuid::new_v4(),
            patient_id: patient.into(),
            site_id: 1,
            assessment_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            days_post_session: offset,
            phq9_score: score,
        }
    }

    #[test]
    fn trajectory_needs_both_ends() {
        let rows = vec![
            reading("A", 0, 20),
            reading("B", 1, 18),
            reading("A", 30, 8),
            reading("C", 45, 5),
            reading("B", 120, 4),
        ];
        let t = complete_trajectories(&rows, &InsightBenchmarks::default());
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].patient_id, "A");
        assert_eq!(t[0].baseline, 20);
        assert_eq!(t[0].endpoint, 8);
    }

    #[test]
    fn last_reading_in_window_wins() {
        let rows = vec![
            reading("A", -2, 22),
            reading("A", 2, 20),
            reading("A", 21, 12),
            reading("A", 60, 9),
        ];
        let t = complete_trajectories(&rows, &InsightBenchmarks::default());
        assert_eq!(t[0].baseline, 20);
        assert_eq!(t[0].endpoint, 9);
    }

    #[test]
    fn zero_baseline_dropped() {
        let rows = vec![reading("A", 0, 0), reading("A", 30, 3)];
        assert!(complete_trajectories(&rows, &InsightBenchmarks::default()).is_empty());
    }

    #[test]
    fn responder_threshold_is_inclusive() {
        let half = Trajectory {
            patient_id: "A".into(),
            baseline: 20,
            endpoint: 10,
        };
        assert!(half.is_responder(50.0));
        let short = Trajectory {
            patient_id: "B".into(),
            baseline: 20,
            endpoint: 11,
        };
        assert!((short.reduction_pct() - 45.0).abs() < 1e-9);
        assert!(!short.is_responder(50.0));
    }

    #[test]
    fn mean_and_population_sd() {
        let (mean, sd) = mean_and_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((sd - 2.0).abs() < 1e-9);
        assert!(mean_and_sd(&[]).is_none());
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn slug_normalizes_free_text() {
        assert_eq!(slug("Major Depressive Disorder"), "major-depressive-disorder");
        assert_eq!(slug("  PTSD (chronic) "), "ptsd-chronic");
    }

    #[test]
    fn distinct_counts_unique_ids() {
        assert_eq!(distinct_patients(["a", "b", "a"]), 2);
    }
}
