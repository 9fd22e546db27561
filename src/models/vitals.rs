use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsReading {
    pub id: Uuid,
    pub session_id: Uuid,
    pub recorded_on: NaiveDate,
    pub systolic_bp: Option<u16>,
    pub heart_rate: Option<u16>,
}
