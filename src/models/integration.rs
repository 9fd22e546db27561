use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Post-treatment integration (support) session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationSession {
    pub id: Uuid,
    pub patient_id: String,
    pub dosing_session_id: Option<Uuid>,
    pub session_date: NaiveDate,
}
