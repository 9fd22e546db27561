//! Read-only access to clinical records.
//!
//! Rules see the store only through [`ClinicalDataSource`]. Implementations
//! must honor the ordering contract: sessions newest first (ties by id),
//! longitudinal assessments by day offset ascending (ties by date, then id).

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, open_database, open_memory_database};
use crate::models::*;

use super::types::DataSourceError;

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Half-open date range `[from, to)`. An open bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self { from: None, to: None }
    }

    pub fn before(to: NaiveDate) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// The `days` days ending just before `end` (exclusive).
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        Self::between(end - Duration::days(days), end)
    }

    /// The window of `days` days immediately before this one.
    /// Unbounded ranges have no predecessor and yield themselves.
    pub fn preceding(&self, days: i64) -> Self {
        match self.from {
            Some(from) => Self::trailing(from, days),
            None => *self,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date < t)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Query surface consumed by the insight rules. Calls may block.
pub trait ClinicalDataSource: Send + Sync {
    /// Longitudinal assessments for a site, optionally limited to patients.
    fn longitudinal_assessments(
        &self,
        site_id: SiteId,
        patient_ids: Option<&[String]>,
    ) -> Result<Vec<LongitudinalAssessment>, DataSourceError>;

    /// Dosing sessions for a site within `range`.
    fn sessions(
        &self,
        site_id: SiteId,
        range: DateRange,
    ) -> Result<Vec<ClinicalSession>, DataSourceError>;

    fn safety_events(&self, session_ids: &[Uuid]) -> Result<Vec<SafetyEvent>, DataSourceError>;

    fn integration_sessions(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<IntegrationSession>, DataSourceError>;

    fn baseline_assessments(
        &self,
        site_id: SiteId,
    ) -> Result<Vec<BaselineAssessment>, DataSourceError>;

    /// Which of `session_ids` have vitals recorded.
    fn sessions_with_vitals(&self, session_ids: &[Uuid]) -> Result<HashSet<Uuid>, DataSourceError>;
}

// ---------------------------------------------------------------------------
// SnapshotSource
// ---------------------------------------------------------------------------

/// Immutable in-memory record set. Used for replaying a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    pub sessions: Vec<ClinicalSession>,
    pub longitudinal: Vec<LongitudinalAssessment>,
    pub baselines: Vec<BaselineAssessment>,
    pub safety_events: Vec<SafetyEvent>,
    pub integration: Vec<IntegrationSession>,
    pub vitals: Vec<VitalsReading>,
}

impl ClinicalDataSource for SnapshotSource {
    fn longitudinal_assessments(
        &self,
        site_id: SiteId,
        patient_ids: Option<&[String]>,
    ) -> Result<Vec<LongitudinalAssessment>, DataSourceError> {
        let mut rows: Vec<LongitudinalAssessment> = self
            .longitudinal
            .iter()
            .filter(|a| a.site_id == site_id)
            .filter(|a| patient_ids.map_or(true, |ids| ids.contains(&a.patient_id)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.days_post_session
                .cmp(&b.days_post_session)
                .then_with(|| a.assessment_date.cmp(&b.assessment_date))
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(rows)
    }

    fn sessions(
        &self,
        site_id: SiteId,
        range: DateRange,
    ) -> Result<Vec<ClinicalSession>, DataSourceError> {
        let mut rows: Vec<ClinicalSession> = self
            .sessions
            .iter()
            .filter(|s| s.site_id == site_id && range.contains(s.session_date))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.session_date
                .cmp(&a.session_date)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(rows)
    }

    fn safety_events(&self, session_ids: &[Uuid]) -> Result<Vec<SafetyEvent>, DataSourceError> {
        Ok(self
            .safety_events
            .iter()
            .filter(|e| session_ids.contains(&e.session_id))
            .cloned()
            .collect())
    }

    fn integration_sessions(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<IntegrationSession>, DataSourceError> {
        Ok(self
            .integration
            .iter()
            .filter(|i| patient_ids.contains(&i.patient_id))
            .cloned()
            .collect())
    }

    fn baseline_assessments(
        &self,
        site_id: SiteId,
    ) -> Result<Vec<BaselineAssessment>, DataSourceError> {
        let mut rows: Vec<BaselineAssessment> = self
            .baselines
            .iter()
            .filter(|b| b.site_id == site_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.assessment_date
                .cmp(&b.assessment_date)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(rows)
    }

    fn sessions_with_vitals(&self, session_ids: &[Uuid]) -> Result<HashSet<Uuid>, DataSourceError> {
        Ok(self
            .vitals
            .iter()
            .map(|v| v.session_id)
            .filter(|id| session_ids.contains(id))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SqliteSource
// ---------------------------------------------------------------------------

/// SQLite-backed source. The connection is shared behind a mutex, so
/// concurrent rules serialize on the database.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DataSourceError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DataSourceError> {
        Ok(Self::new(open_memory_database()?))
    }

    /// Direct access for loading records.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, DataSourceError> {
        self.conn.lock().map_err(|_| DataSourceError::LockFailed)
    }
}

impl ClinicalDataSource for SqliteSource {
    fn longitudinal_assessments(
        &self,
        site_id: SiteId,
        patient_ids: Option<&[String]>,
    ) -> Result<Vec<LongitudinalAssessment>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_longitudinal_assessments(&conn, site_id, patient_ids)?)
    }

    fn sessions(
        &self,
        site_id: SiteId,
        range: DateRange,
    ) -> Result<Vec<ClinicalSession>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_sessions(&conn, site_id, range.from, range.to)?)
    }

    fn safety_events(&self, session_ids: &[Uuid]) -> Result<Vec<SafetyEvent>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_safety_events(&conn, session_ids)?)
    }

    fn integration_sessions(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<IntegrationSession>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_integration_sessions(&conn, patient_ids)?)
    }

    fn baseline_assessments(
        &self,
        site_id: SiteId,
    ) -> Result<Vec<BaselineAssessment>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_baseline_assessments(&conn, site_id)?)
    }

    fn sessions_with_vitals(&self, session_ids: &[Uuid]) -> Result<HashSet<Uuid>, DataSourceError> {
        let conn = self.connection()?;
        Ok(db::get_sessions_with_vitals(&conn, session_ids)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(patient: &str, on: NaiveDate) -> ClinicalSession {
        ClinicalSession {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{patient}-{on}").as_bytes()),
            patient_id: patient.into(),
            site_id: 1,
            session_date: on,
            substance: "psilocybin".into(),
            condition: None,
            safety_event_id: None,
        }
    }

    #[test]
    fn date_range_is_half_open() {
        let r = DateRange::trailing(date(2026, 3, 31), 30);
        assert_eq!(r.from, Some(date(2026, 3, 1)));
        assert!(r.contains(date(2026, 3, 1)));
        assert!(r.contains(date(2026, 3, 30)));
        assert!(!r.contains(date(2026, 3, 31)));

        let prior = r.preceding(30);
        assert_eq!(prior.to, Some(date(2026, 3, 1)));
        assert!(!prior.contains(date(2026, 3, 1)));
        assert!(prior.contains(date(2026, 2, 28)));
    }

    #[test]
    fn snapshot_and_sqlite_agree_on_ordering() {
        let rows = vec![
            session("P-1", date(2026, 1, 3)),
            session("P-2", date(2026, 1, 9)),
            session("P-3", date(2026, 1, 6)),
        ];
        let snapshot = SnapshotSource {
            sessions: rows.clone(),
            ..Default::default()
        };
        let sqlite = SqliteSource::open_in_memory().unwrap();
        {
            let conn = sqlite.connection().unwrap();
            for s in &rows {
                db::insert_session(&conn, s).unwrap();
            }
        }

        let a = snapshot.sessions(1, DateRange::all()).unwrap();
        let b = sqlite.sessions(1, DateRange::all()).unwrap();
        assert_eq!(a, b);
        let order: Vec<&str> = a.iter().map(|s| s.patient_id.as_str()).collect();
        assert_eq!(order, vec!["P-2", "P-3", "P-1"]);

        let early = sqlite.sessions(1, DateRange::before(date(2026, 1, 6))).unwrap();
        assert_eq!(early.len(), 1);
    }

    #[test]
    fn snapshot_scopes_by_site() {
        let mut other_site = session("P-9", date(2026, 1, 1));
        other_site.site_id = 2;
        let snapshot = SnapshotSource {
            sessions: vec![session("P-1", date(2026, 1, 1)), other_site],
            ..Default::default()
        };
        assert_eq!(snapshot.sessions(1, DateRange::all()).unwrap().len(), 1);
        assert_eq!(snapshot.sessions(2, DateRange::all()).unwrap().len(), 1);
    }
}
