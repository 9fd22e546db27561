use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{ContraindicationCategory, FlagTier, Verdict};

/// Normalized intake data for one patient and one planned substance.
///
/// Free-text fields arrive as keyword lists; the engine lower-cases them
/// before matching. Scores are optional because intake is often partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntakeData {
    pub patient_id: String,
    pub substance: String,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub psychiatric_history: Vec<String>,
    #[serde(default)]
    pub family_history: Vec<String>,
    pub cssrs_score: Option<u8>,
    pub last_systolic_bp: Option<u16>,
    #[serde(default)]
    pub is_pregnant: bool,
    pub age_years: Option<u16>,
    pub phq9_score: Option<u8>,
    pub gad7_score: Option<u8>,
    pub pcl5_score: Option<u8>,
    pub bmi: Option<f64>,
}

/// One piece of evidence against administering the substance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContraindicationFlag {
    pub id: String,
    pub tier: FlagTier,
    pub category: ContraindicationCategory,
    pub headline: String,
    pub detail: String,
    pub source: String,
    pub regulatory_basis: String,
}

/// Clinician note recorded against a non-clear verdict. Audit only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverrideAnnotation {
    pub clinician: String,
    pub justification: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    pub patient_id: String,
    pub substance: String,
    pub absolute_flags: Vec<ContraindicationFlag>,
    pub relative_flags: Vec<ContraindicationFlag>,
    pub verdict: Verdict,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_annotation: Option<OverrideAnnotation>,
}

impl ScreeningResult {
    /// All flags, absolute first.
    pub fn flags(&self) -> impl Iterator<Item = &ContraindicationFlag> {
        self.absolute_flags.iter().chain(self.relative_flags.iter())
    }

    pub fn is_overridden(&self) -> bool {
        self.override_annotation.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("Invalid intake: {0}")]
    InvalidIntake(String),

    #[error("Invalid override: {0}")]
    InvalidOverride(String),
}

/// Verdict for a pair of flag lists. Any absolute flag blocks.
pub fn verdict_for(absolute: &[ContraindicationFlag], relative: &[ContraindicationFlag]) -> Verdict {
    if !absolute.is_empty() {
        Verdict::Blocked
    } else if !relative.is_empty() {
        Verdict::ProceedWithCaution
    } else {
        Verdict::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(tier: FlagTier) -> ContraindicationFlag {
        ContraindicationFlag {
            id: "X".into(),
            tier,
            category: ContraindicationCategory::Medication,
            headline: String::new(),
            detail: String::new(),
            source: String::new(),
            regulatory_basis: String::new(),
        }
    }

    #[test]
    fn verdict_follows_flag_tiers() {
        let abs = vec![flag(FlagTier::Absolute)];
        let rel = vec![flag(FlagTier::Relative)];
        assert_eq!(verdict_for(&[], &[]), Verdict::Clear);
        assert_eq!(verdict_for(&[], &rel), Verdict::ProceedWithCaution);
        assert_eq!(verdict_for(&abs, &[]), Verdict::Blocked);
        assert_eq!(verdict_for(&abs, &rel), Verdict::Blocked);
    }

    #[test]
    fn intake_deserializes_with_missing_lists() {
        let intake: IntakeData = serde_json::from_str(
            r#"{"patient_id":"PT-1","substance":"psilocybin","cssrs_score":null,
                "last_systolic_bp":120,"age_years":34,"phq9_score":null,
                "gad7_score":null,"pcl5_score":null,"bmi":22.5}"#,
        )
        .unwrap();
        assert!(intake.medications.is_empty());
        assert!(!intake.is_pregnant);
        assert_eq!(intake.last_systolic_bp, Some(120));
    }
}
