use chrono::{DateTime, Utc};

use crate::models::enums::Verdict;

use super::catalog::{evaluate_catalog, NormalizedIntake};
use super::types::{verdict_for, IntakeData, OverrideAnnotation, ScreeningError, ScreeningResult};

const CSSRS_MAX: u8 = 6;
const PHQ9_MAX: u8 = 27;
const GAD7_MAX: u8 = 21;
const PCL5_MAX: u8 = 80;
const SBP_MAX: u16 = 300;
const AGE_MAX: u16 = 130;

/// Screen one intake against the contraindication catalog.
///
/// Stateless and synchronous. A malformed intake is an error, never a
/// silent `Clear`.
pub fn screen(intake: &IntakeData) -> Result<ScreeningResult, ScreeningError> {
    screen_at(intake, Utc::now())
}

/// [`screen`] with an explicit generation timestamp.
pub fn screen_at(
    intake: &IntakeData,
    generated_at: DateTime<Utc>,
) -> Result<ScreeningResult, ScreeningError> {
    validate_intake(intake)?;

    let normalized = NormalizedIntake::new(intake);
    let (absolute_flags, relative_flags) = evaluate_catalog(&normalized);
    let verdict = verdict_for(&absolute_flags, &relative_flags);

    tracing::info!(
        substance = %normalized.substance,
        verdict = verdict.as_str(),
        absolute = absolute_flags.len(),
        relative = relative_flags.len(),
        "Contraindication screening complete"
    );

    Ok(ScreeningResult {
        patient_id: intake.patient_id.trim().to_string(),
        substance: intake.substance.trim().to_string(),
        absolute_flags,
        relative_flags,
        verdict,
        generated_at,
        override_annotation: None,
    })
}

fn validate_intake(intake: &IntakeData) -> Result<(), ScreeningError> {
    if intake.patient_id.trim().is_empty() {
        return Err(ScreeningError::InvalidIntake("patient_id is empty".into()));
    }
    if intake.substance.trim().is_empty() {
        return Err(ScreeningError::InvalidIntake("substance is empty".into()));
    }
    check_range("cssrs_score", intake.cssrs_score, CSSRS_MAX)?;
    check_range("phq9_score", intake.phq9_score, PHQ9_MAX)?;
    check_range("gad7_score", intake.gad7_score, GAD7_MAX)?;
    check_range("pcl5_score", intake.pcl5_score, PCL5_MAX)?;
    check_range("last_systolic_bp", intake.last_systolic_bp, SBP_MAX)?;
    check_range("age_years", intake.age_years, AGE_MAX)?;
    if intake.last_systolic_bp == Some(0) {
        return Err(ScreeningError::InvalidIntake("last_systolic_bp is zero".into()));
    }
    if let Some(bmi) = intake.bmi {
        if !bmi.is_finite() || bmi <= 0.0 {
            return Err(ScreeningError::InvalidIntake(format!("bmi {bmi} is not positive")));
        }
    }
    Ok(())
}

fn check_range<T>(field: &str, value: Option<T>, max: T) -> Result<(), ScreeningError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    match value {
        Some(v) if v > max => Err(ScreeningError::InvalidIntake(format!(
            "{field} {v} exceeds maximum {max}"
        ))),
        _ => Ok(()),
    }
}

impl ScreeningResult {
    /// Attach a clinician's justification for proceeding despite the flags.
    ///
    /// The verdict and flags are left untouched. A second call replaces the
    /// previous annotation.
    pub fn record_override(
        &mut self,
        clinician: &str,
        justification: &str,
        at: DateTime<Utc>,
    ) -> Result<&OverrideAnnotation, ScreeningError> {
        if self.verdict == Verdict::Clear {
            return Err(ScreeningError::InvalidOverride(
                "nothing to override on a CLEAR verdict".into(),
            ));
        }
        let clinician = clinician.trim();
        let justification = justification.trim();
        if clinician.is_empty() {
            return Err(ScreeningError::InvalidOverride("clinician is empty".into()));
        }
        if justification.is_empty() {
            return Err(ScreeningError::InvalidOverride("justification is empty".into()));
        }

        tracing::warn!(
            verdict = self.verdict.as_str(),
            absolute = self.absolute_flags.len(),
            relative = self.relative_flags.len(),
            "Screening verdict overridden by clinician"
        );

        Ok(self.override_annotation.insert(OverrideAnnotation {
            clinician: clinician.to_string(),
            justification: justification.to_string(),
            recorded_at: at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 9, 0, 0).unwrap()
    }

    fn intake() -> IntakeData {
        IntakeData {
            patient_id: "PT-0001".into(),
            substance: "psilocybin".into(),
            last_systolic_bp: Some(118),
            age_years: Some(42),
            bmi: Some(23.1),
            ..Default::default()
        }
    }

    #[test]
    fn one_absolute_two_relative_is_blocked() {
        let mut i = intake();
        i.medications = vec!["lithium 600mg".into()];
        i.psychiatric_history = vec!["Borderline personality disorder".into()];
        i.phq9_score = Some(25);

        let result = screen_at(&i, at()).unwrap();
        assert_eq!(result.verdict, Verdict::Blocked);
        assert_eq!(result.absolute_flags.len(), 1);
        assert_eq!(result.relative_flags.len(), 2);
        assert_eq!(result.absolute_flags[0].id, "ABS-MEDICATION-LITHIUM");
        assert_eq!(result.generated_at, at());
    }

    #[test]
    fn only_relative_flags_proceed_with_caution() {
        let mut i = intake();
        i.gad7_score = Some(20);
        let result = screen_at(&i, at()).unwrap();
        assert_eq!(result.verdict, Verdict::ProceedWithCaution);
        assert!(result.absolute_flags.is_empty());
        assert_eq!(result.relative_flags.len(), 1);
    }

    #[test]
    fn nothing_matching_is_clear() {
        let result = screen_at(&intake(), at()).unwrap();
        assert_eq!(result.verdict, Verdict::Clear);
        assert!(result.absolute_flags.is_empty());
        assert!(result.relative_flags.is_empty());
        assert_eq!(result.flags().count(), 0);
    }

    #[test]
    fn malformed_intake_is_an_error_not_clear() {
        let mut i = intake();
        i.substance = "  ".into();
        assert!(matches!(screen_at(&i, at()), Err(ScreeningError::InvalidIntake(_))));

        let mut i = intake();
        i.patient_id = String::new();
        assert!(matches!(screen_at(&i, at()), Err(ScreeningError::InvalidIntake(_))));

        let mut i = intake();
        i.cssrs_score = Some(7);
        let err = screen_at(&i, at()).unwrap_err();
        assert!(err.to_string().contains("cssrs_score"));

        let mut i = intake();
        i.phq9_score = Some(28);
        assert!(screen_at(&i, at()).is_err());

        let mut i = intake();
        i.bmi = Some(f64::NAN);
        assert!(screen_at(&i, at()).is_err());
    }

    #[test]
    fn repeated_screening_is_independent() {
        let mut i = intake();
        i.is_pregnant = true;
        let first = screen_at(&i, at()).unwrap();
        assert_eq!(first.verdict, Verdict::Blocked);

        i.is_pregnant = false;
        let second = screen_at(&i, at()).unwrap();
        assert_eq!(second.verdict, Verdict::Clear);
    }

    #[test]
    fn override_is_recorded_without_changing_verdict() {
        let mut i = intake();
        i.is_pregnant = true;
        i.pcl5_score = Some(70);
        let mut result = screen_at(&i, at()).unwrap();
        let flags_before: Vec<_> = result.flags().cloned().collect();

        let note = result
            .record_override("Dr. Rivera", "Reviewed with OB; proceeding is not planned", at())
            .unwrap();
        assert_eq!(note.clinician, "Dr. Rivera");

        assert_eq!(result.verdict, Verdict::Blocked);
        assert!(result.is_overridden());
        assert_eq!(result.flags().cloned().collect::<Vec<_>>(), flags_before);
    }

    #[test]
    fn override_rejected_on_clear_or_blank_justification() {
        let mut clear = screen_at(&intake(), at()).unwrap();
        assert!(matches!(
            clear.record_override("Dr. Rivera", "ok", at()),
            Err(ScreeningError::InvalidOverride(_))
        ));
        assert!(!clear.is_overridden());

        let mut i = intake();
        i.bmi = Some(16.0);
        let mut caution = screen_at(&i, at()).unwrap();
        assert!(caution.record_override("Dr. Rivera", "   ", at()).is_err());
        assert!(caution.record_override("", "nutrition plan in place", at()).is_err());
        assert!(caution
            .record_override("Dr. Rivera", "nutrition plan in place", at())
            .is_ok());
        assert_eq!(caution.verdict, Verdict::ProceedWithCaution);
    }

    #[test]
    fn override_survives_serialization() {
        let mut i = intake();
        i.age_years = Some(19);
        let mut result = screen_at(&i, at()).unwrap();
        result
            .record_override("Dr. Rivera", "Documented exception", at())
            .unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"verdict\":\"BLOCKED\""));
        let back: ScreeningResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.override_annotation, result.override_annotation);
    }
}
