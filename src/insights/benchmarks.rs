use std::fmt::Display;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::privacy::K_ANONYMITY_FLOOR;

/// A threshold value together with the reference it was taken from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Benchmark<T> {
    pub value: T,
    pub source: String,
}

fn cite<T>(value: T, source: &str) -> Benchmark<T> {
    Benchmark {
        value,
        source: source.to_string(),
    }
}

/// One row of the audit listing returned by [`InsightBenchmarks::provenance`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProvenanceEntry {
    pub name: &'static str,
    pub value: String,
    pub source: String,
}

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Benchmark file load failed ({0}): {1}")]
    Load(String, String),

    #[error("Benchmark file parse failed: {0}")]
    Parse(String),

    #[error("Invalid benchmark {0}: {1}")]
    Invalid(&'static str, String),
}

/// Every threshold and published comparison value the insight rules use.
///
/// Rule logic reads values only from here. Missing fields in an override file
/// fall back to the published defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightBenchmarks {
    /// Minimum distinct patients behind any aggregate.
    pub k_anonymity_floor: Benchmark<usize>,
    /// Percentage PHQ-9 reduction that makes a patient a responder.
    pub responder_reduction_pct: Benchmark<f64>,
    /// Follow-up PHQ-9 above this still counts as symptomatic. Deliberately
    /// separate from the percentage definition above.
    pub residual_severity_cutoff: Benchmark<u8>,
    pub integration_sessions_target: Benchmark<f64>,
    pub integration_target_response_rate: Benchmark<i64>,
    pub naturalistic_response_rate: Benchmark<i64>,
    pub outperformance_margin_points: Benchmark<i64>,
    pub benchmark_phq9_baseline: Benchmark<f64>,
    pub baseline_sd_multiple: Benchmark<f64>,
    pub case_volume_ratio: Benchmark<f64>,
    pub min_sessions_for_volume_comparison: Benchmark<usize>,
    pub documentation_drop_points: Benchmark<i64>,
    pub documentation_window_days: Benchmark<i64>,
    pub safety_window_days: Benchmark<i64>,
    pub safety_spike_multiplier: Benchmark<f64>,
    pub safety_spike_min_events: Benchmark<usize>,
    pub cluster_min_non_responders: Benchmark<usize>,
    /// Most recent sessions whose patients form the k-anonymity cohort.
    pub cluster_recent_sessions: Benchmark<usize>,
    /// Most recent sessions whose patients have follow-ups read.
    pub cluster_follow_up_sessions: Benchmark<usize>,
    /// Most recent sessions counted toward a cluster.
    pub cluster_count_sessions: Benchmark<usize>,
    pub cluster_min_follow_up_offset: Benchmark<i32>,
    pub follow_up_overdue_days: Benchmark<i64>,
    pub baseline_max_offset_days: Benchmark<i32>,
    pub endpoint_window_start_days: Benchmark<i32>,
    pub endpoint_window_end_days: Benchmark<i32>,
}

const NATURALISTIC: &str =
    "Unlimited Sciences naturalistic study, mixed conditions, n=8,000+ (Frontiers in Psychiatry, 2023)";
const PHQ9_VALIDATION: &str =
    "Kroenke, Spitzer & Williams, The PHQ-9: validity of a brief depression severity measure (2001)";
const CLINIC_PROTOCOL: &str = "Practice clinical intelligence protocol";

impl Default for InsightBenchmarks {
    fn default() -> Self {
        Self {
            k_anonymity_floor: cite(
                K_ANONYMITY_FLOOR,
                "Practice privacy policy: minimum cell size of 5 distinct patients",
            ),
            responder_reduction_pct: cite(50.0, PHQ9_VALIDATION),
            residual_severity_cutoff: cite(9, PHQ9_VALIDATION),
            integration_sessions_target: cite(
                4.0,
                "Real-world integration data: >=4 post-session integration meetings",
            ),
            integration_target_response_rate: cite(
                71,
                "Real-world integration data: response rate at >=4 integration meetings",
            ),
            naturalistic_response_rate: cite(68, NATURALISTIC),
            outperformance_margin_points: cite(10, CLINIC_PROTOCOL),
            benchmark_phq9_baseline: cite(
                14.2,
                "Naturalistic psychedelic cohorts, approximate mean baseline PHQ-9",
            ),
            baseline_sd_multiple: cite(1.5, CLINIC_PROTOCOL),
            case_volume_ratio: cite(1.5, CLINIC_PROTOCOL),
            min_sessions_for_volume_comparison: cite(10, CLINIC_PROTOCOL),
            documentation_drop_points: cite(15, CLINIC_PROTOCOL),
            documentation_window_days: cite(28, CLINIC_PROTOCOL),
            safety_window_days: cite(30, "CTCAE v5.0 monitoring period"),
            safety_spike_multiplier: cite(2.0, CLINIC_PROTOCOL),
            safety_spike_min_events: cite(2, CLINIC_PROTOCOL),
            cluster_min_non_responders: cite(3, CLINIC_PROTOCOL),
            cluster_recent_sessions: cite(20, CLINIC_PROTOCOL),
            cluster_follow_up_sessions: cite(10, CLINIC_PROTOCOL),
            cluster_count_sessions: cite(6, CLINIC_PROTOCOL),
            cluster_min_follow_up_offset: cite(14, CLINIC_PROTOCOL),
            follow_up_overdue_days: cite(30, "Clinical standard: 30-day reassessment after dosing"),
            baseline_max_offset_days: cite(3, CLINIC_PROTOCOL),
            endpoint_window_start_days: cite(21, CLINIC_PROTOCOL),
            endpoint_window_end_days: cite(90, CLINIC_PROTOCOL),
        }
    }
}

fn entry<T: Display>(name: &'static str, benchmark: &Benchmark<T>) -> ProvenanceEntry {
    ProvenanceEntry {
        name,
        value: benchmark.value.to_string(),
        source: benchmark.source.clone(),
    }
}

impl InsightBenchmarks {
    /// Load overrides from a JSON file and validate them.
    pub fn load(path: &Path) -> Result<Self, BenchmarkError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| BenchmarkError::Load(path.display().to_string(), e.to_string()))?;
        let benchmarks: Self =
            serde_json::from_str(&json).map_err(|e| BenchmarkError::Parse(e.to_string()))?;
        benchmarks.validate()?;
        tracing::info!(path = %path.display(), "Loaded insight benchmarks");
        Ok(benchmarks)
    }

    /// Published defaults, or the override file named by
    /// [`crate::config::BENCHMARKS_PATH_ENV`] when it is set.
    pub fn load_configured() -> Result<Self, BenchmarkError> {
        match crate::config::benchmarks_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.k_anonymity_floor.value < K_ANONYMITY_FLOOR {
            return Err(BenchmarkError::Invalid(
                "k_anonymity_floor",
                format!("must be at least {K_ANONYMITY_FLOOR}"),
            ));
        }
        if !(0.0..=100.0).contains(&self.responder_reduction_pct.value) {
            return Err(BenchmarkError::Invalid(
                "responder_reduction_pct",
                "must be a percentage".into(),
            ));
        }
        if self.endpoint_window_start_days.value > self.endpoint_window_end_days.value {
            return Err(BenchmarkError::Invalid(
                "endpoint_window_start_days",
                "window start is after window end".into(),
            ));
        }
        for (name, days) in [
            ("documentation_window_days", self.documentation_window_days.value),
            ("safety_window_days", self.safety_window_days.value),
            ("follow_up_overdue_days", self.follow_up_overdue_days.value),
        ] {
            if days <= 0 {
                return Err(BenchmarkError::Invalid(name, "must be positive".into()));
            }
        }
        if self.cluster_count_sessions.value > self.cluster_follow_up_sessions.value
            || self.cluster_follow_up_sessions.value > self.cluster_recent_sessions.value
        {
            return Err(BenchmarkError::Invalid(
                "cluster_count_sessions",
                "cluster slices must nest: count <= follow-up <= recent".into(),
            ));
        }
        if self.safety_spike_multiplier.value <= 0.0 || self.case_volume_ratio.value <= 0.0 {
            return Err(BenchmarkError::Invalid(
                "safety_spike_multiplier",
                "ratios must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Every value with its citation, in declaration order.
    pub fn provenance(&self) -> Vec<ProvenanceEntry> {
        vec![
            entry("k_anonymity_floor", &self.k_anonymity_floor),
            entry("responder_reduction_pct", &self.responder_reduction_pct),
            entry("residual_severity_cutoff", &self.residual_severity_cutoff),
            entry("integration_sessions_target", &self.integration_sessions_target),
            entry(
                "integration_target_response_rate",
                &self.integration_target_response_rate,
            ),
            entry("naturalistic_response_rate", &self.naturalistic_response_rate),
            entry("outperformance_margin_points", &self.outperformance_margin_points),
            entry("benchmark_phq9_baseline", &self.benchmark_phq9_baseline),
            entry("baseline_sd_multiple", &self.baseline_sd_multiple),
            entry("case_volume_ratio", &self.case_volume_ratio),
            entry(
                "min_sessions_for_volume_comparison",
                &self.min_sessions_for_volume_comparison,
            ),
            entry("documentation_drop_points", &self.documentation_drop_points),
            entry("documentation_window_days", &self.documentation_window_days),
            entry("safety_window_days", &self.safety_window_days),
            entry("safety_spike_multiplier", &self.safety_spike_multiplier),
            entry("safety_spike_min_events", &self.safety_spike_min_events),
            entry("cluster_min_non_responders", &self.cluster_min_non_responders),
            entry("cluster_recent_sessions", &self.cluster_recent_sessions),
            entry("cluster_follow_up_sessions", &self.cluster_follow_up_sessions),
            entry("cluster_count_sessions", &self.cluster_count_sessions),
            entry("cluster_min_follow_up_offset", &self.cluster_min_follow_up_offset),
            entry("follow_up_overdue_days", &self.follow_up_overdue_days),
            entry("baseline_max_offset_days", &self.baseline_max_offset_days),
            entry("endpoint_window_start_days", &self.endpoint_window_start_days),
            entry("endpoint_window_end_days", &self.endpoint_window_end_days),
        ]
    }
}
