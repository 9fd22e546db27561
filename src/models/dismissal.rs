use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A card hidden by the clinician until `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dismissal {
    pub card_id: String,
    pub dismissed_on: NaiveDate,
    pub expires_at: DateTime<Utc>,
}

impl Dismissal {
    /// Dismissal covering the whole UTC day `day`. `None` only for the last
    /// representable date.
    pub fn for_day(card_id: &str, day: NaiveDate) -> Option<Self> {
        let next = day.succ_opt()?;
        Some(Self {
            card_id: card_id.to_string(),
            dismissed_on: day,
            expires_at: start_of_day(next),
        })
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }

    /// True when this dismissal hides the card on `day`.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.dismissed_on <= day && self.is_active_at(start_of_day(day))
    }
}

/// Midnight UTC at the start of `day`.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}
