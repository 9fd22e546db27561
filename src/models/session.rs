use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SiteId;

/// A dosing/treatment session. `patient_id` is the pseudonymous link code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalSession {
    pub id: Uuid,
    pub patient_id: String,
    pub site_id: SiteId,
    pub session_date: NaiveDate,
    pub substance: String,
    /// Primary indication, when documented.
    pub condition: Option<String>,
    pub safety_event_id: Option<Uuid>,
}
