use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AdverseEventGrade;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub grade: AdverseEventGrade,
    pub occurred_on: NaiveDate,
}
