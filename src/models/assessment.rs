use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SiteId;

/// PHQ-9 measurement positioned relative to a dosing session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongitudinalAssessment {
    pub id: Uuid,
    pub patient_id: String,
    pub site_id: SiteId,
    pub assessment_date: NaiveDate,
    /// Signed distance in days from the associated session.
    pub days_post_session: i32,
    pub phq9_score: u8,
}

/// Intake PHQ-9 taken before any session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineAssessment {
    pub id: Uuid,
    pub patient_id: String,
    pub site_id: SiteId,
    pub assessment_date: NaiveDate,
    pub phq9_score: Option<u8>,
}
