use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::InsightSeverity;

// ---------------------------------------------------------------------------
// InsightCard
// ---------------------------------------------------------------------------

/// Where the presentation layer should send the clinician.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedAction {
    pub label: String,
    pub route: String,
}

/// One explanatory card produced by a rule.
///
/// `id` is a pure function of the rule and the subject it addresses, so the
/// same trigger on the same data always yields the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCard {
    pub id: String,
    pub severity: InsightSeverity,
    pub category: String,
    pub headline: String,
    pub body: String,
    pub action: SuggestedAction,
    pub source_note: String,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rule outcomes
// ---------------------------------------------------------------------------

/// Tagged result of a single rule evaluation.
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    Triggered(InsightCard),
    NotTriggered,
    /// Cohort below the k-anonymity floor; nothing was computed or disclosed.
    Suppressed(DisclosureError),
    /// Too few records for the statistic to be meaningful.
    InsufficientData(String),
    Errored(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Triggered,
    NotTriggered,
    Suppressed,
    InsufficientData,
    Errored,
}

impl RuleOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Triggered(_) => OutcomeKind::Triggered,
            Self::NotTriggered => OutcomeKind::NotTriggered,
            Self::Suppressed(_) => OutcomeKind::Suppressed,
            Self::InsufficientData(_) => OutcomeKind::InsufficientData,
            Self::Errored(_) => OutcomeKind::Errored,
        }
    }

    /// True when the rule got past its privacy and data preconditions.
    pub fn had_sufficient_data(&self) -> bool {
        matches!(self, Self::Triggered(_) | Self::NotTriggered)
    }

    pub fn into_card(self) -> Option<InsightCard> {
        match self {
            Self::Triggered(card) => Some(card),
            _ => None,
        }
    }
}

impl From<Result<Option<InsightCard>, RuleError>> for RuleOutcome {
    fn from(result: Result<Option<InsightCard>, RuleError>) -> Self {
        match result {
            Ok(Some(card)) => Self::Triggered(card),
            Ok(None) => Self::NotTriggered,
            Err(RuleError::Disclosure(e)) => Self::Suppressed(e),
            Err(RuleError::InsufficientData(reason)) => Self::InsufficientData(reason.to_string()),
            Err(e) => Self::Errored(e.to_string()),
        }
    }
}

/// Per-rule diagnostics carried alongside the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleReport {
    pub rule: String,
    pub outcome: OutcomeKind,
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// InsightFeed
// ---------------------------------------------------------------------------

/// Ranked output of one aggregator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightFeed {
    pub cards: Vec<InsightCard>,
    pub reports: Vec<RuleReport>,
    /// Distinguishes "no risk detected" (true) from "insufficient data" (false)
    /// when `cards` is empty.
    pub has_sufficient_data: bool,
    pub processing_time_ms: u64,
}

impl InsightFeed {
    pub fn errored_rules(&self) -> impl Iterator<Item = &RuleReport> {
        self.reports
            .iter()
            .filter(|r| r.outcome == OutcomeKind::Errored)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Raised by the k-anonymity guard. Distinct from every other rule failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("k-anonymity floor not met in {rule}: cohort of {cohort_size} is below {floor}")]
pub struct DisclosureError {
    pub rule: String,
    pub cohort_size: usize,
    pub floor: usize,
}

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Internal lock failed")]
    LockFailed,
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Disclosure(#[from] DisclosureError),

    #[error("Insufficient data: {0}")]
    InsufficientData(&'static str),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Rule timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Rule task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disclosure_maps_to_suppressed_not_errored() {
        let err = DisclosureError {
            rule: "safety-event-spike".into(),
            cohort_size: 4,
            floor: 5,
        };
        let outcome = RuleOutcome::from(Err(RuleError::Disclosure(err.clone())));
        assert_eq!(outcome.kind(), OutcomeKind::Suppressed);
        assert!(!outcome.had_sufficient_data());
        match outcome {
            RuleOutcome::Suppressed(e) => assert_eq!(e, err),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn data_source_failure_maps_to_errored() {
        let outcome = RuleOutcome::from(Err(RuleError::DataSource(DataSourceError::LockFailed)));
        assert_eq!(outcome.kind(), OutcomeKind::Errored);
        assert!(outcome.into_card().is_none());
    }

    #[test]
    fn insufficient_data_is_its_own_outcome() {
        let outcome = RuleOutcome::from(Err(RuleError::InsufficientData("no sessions")));
        assert_eq!(outcome.kind(), OutcomeKind::InsufficientData);
        assert!(!outcome.had_sufficient_data());
    }

    #[test]
    fn not_triggered_counts_as_sufficient_data() {
        let outcome = RuleOutcome::from(Ok(None));
        assert_eq!(outcome.kind(), OutcomeKind::NotTriggered);
        assert!(outcome.had_sufficient_data());
    }
}
