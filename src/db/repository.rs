//! Query surface over the clinical record tables.
//!
//! Reads are scoped by site and ordered so callers get a stable sequence:
//! sessions newest first, longitudinal assessments by day offset.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::AdverseEventGrade;
use crate::models::*;

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ═══════════════════════════════════════════
// Clinical sessions
// ═══════════════════════════════════════════

pub fn insert_session(conn: &Connection, session: &ClinicalSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinical_sessions (id, patient_id, site_id, session_date, substance,
         condition, safety_event_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session.id.to_string(),
            session.patient_id,
            session.site_id,
            session.session_date,
            session.substance,
            session.condition,
            session.safety_event_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

/// Sessions for a site with `from <= session_date < to`, newest first.
/// Either bound may be open.
pub fn get_sessions(
    conn: &Connection,
    site_id: SiteId,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ClinicalSession>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, patient_id, site_id, session_date, substance, condition, safety_event_id
         FROM clinical_sessions WHERE site_id = ?",
    );
    let mut values = vec![Value::Integer(site_id)];
    if let Some(from) = from {
        sql.push_str(" AND session_date >= ?");
        values.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = to {
        sql.push_str(" AND session_date < ?");
        values.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    sql.push_str(" ORDER BY session_date DESC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, NaiveDate>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, patient_id, site_id, session_date, substance, condition, safety_event_id) = row?;
        sessions.push(ClinicalSession {
            id: parse_uuid(&id)?,
            patient_id,
            site_id,
            session_date,
            substance,
            condition,
            safety_event_id: safety_event_id.as_deref().map(parse_uuid).transpose()?,
        });
    }
    Ok(sessions)
}

// ═══════════════════════════════════════════
// Assessments
// ═══════════════════════════════════════════

pub fn insert_longitudinal_assessment(
    conn: &Connection,
    assessment: &LongitudinalAssessment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO longitudinal_assessments (id, patient_id, site_id, assessment_date,
         days_post_session, phq9_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            assessment.id.to_string(),
            assessment.patient_id,
            assessment.site_id,
            assessment.assessment_date,
            assessment.days_post_session,
            assessment.phq9_score,
        ],
    )?;
    Ok(())
}

/// Longitudinal assessments for a site, optionally restricted to a patient set,
/// ordered by day offset ascending.
pub fn get_longitudinal_assessments(
    conn: &Connection,
    site_id: SiteId,
    patient_ids: Option<&[String]>,
) -> Result<Vec<LongitudinalAssessment>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, patient_id, site_id, assessment_date, days_post_session, phq9_score
         FROM longitudinal_assessments WHERE site_id = ?",
    );
    let mut values = vec![Value::Integer(site_id)];
    if let Some(patients) = patient_ids {
        if patients.is_empty() {
            return Ok(Vec::new());
        }
        sql.push_str(&format!(" AND patient_id IN ({})", placeholders(patients.len())));
        values.extend(patients.iter().map(|p| Value::Text(p.clone())));
    }
    sql.push_str(" ORDER BY days_post_session ASC, assessment_date ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, NaiveDate>(3)?,
            row.get::<_, i32>(4)?,
            row.get::<_, u8>(5)?,
        ))
    })?;

    let mut assessments = Vec::new();
    for row in rows {
        let (id, patient_id, site_id, assessment_date, days_post_session, phq9_score) = row?;
        assessments.push(LongitudinalAssessment {
            id: parse_uuid(&id)?,
            patient_id,
            site_id,
            assessment_date,
            days_post_session,
            phq9_score,
        });
    }
    Ok(assessments)
}

pub fn insert_baseline_assessment(
    conn: &Connection,
    assessment: &BaselineAssessment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO baseline_assessments (id, patient_id, site_id, assessment_date, phq9_score)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            assessment.id.to_string(),
            assessment.patient_id,
            assessment.site_id,
            assessment.assessment_date,
            assessment.phq9_score,
        ],
    )?;
    Ok(())
}

pub fn get_baseline_assessments(
    conn: &Connection,
    site_id: SiteId,
) -> Result<Vec<BaselineAssessment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, site_id, assessment_date, phq9_score
         FROM baseline_assessments WHERE site_id = ?1
         ORDER BY assessment_date ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![site_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, NaiveDate>(3)?,
            row.get::<_, Option<u8>>(4)?,
        ))
    })?;

    let mut baselines = Vec::new();
    for row in rows {
        let (id, patient_id, site_id, assessment_date, phq9_score) = row?;
        baselines.push(BaselineAssessment {
            id: parse_uuid(&id)?,
            patient_id,
            site_id,
            assessment_date,
            phq9_score,
        });
    }
    Ok(baselines)
}

// ═══════════════════════════════════════════
// Safety events
// ═══════════════════════════════════════════

pub fn insert_safety_event(conn: &Connection, event: &SafetyEvent) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO safety_events (id, session_id, grade, occurred_on)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.id.to_string(),
            event.session_id.to_string(),
            event.grade.as_str(),
            event.occurred_on,
        ],
    )?;
    Ok(())
}

pub fn get_safety_events(
    conn: &Connection,
    session_ids: &[Uuid],
) -> Result<Vec<SafetyEvent>, DatabaseError> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, session_id, grade, occurred_on FROM safety_events
         WHERE session_id IN ({}) ORDER BY occurred_on ASC, id ASC",
        placeholders(session_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(session_ids.iter().map(|id| id.to_string())),
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, NaiveDate>(3)?,
            ))
        },
    )?;

    let mut events = Vec::new();
    for row in rows {
        let (id, session_id, grade, occurred_on) = row?;
        events.push(SafetyEvent {
            id: parse_uuid(&id)?,
            session_id: parse_uuid(&session_id)?,
            grade: AdverseEventGrade::from_str(&grade)?,
            occurred_on,
        });
    }
    Ok(events)
}

// ═══════════════════════════════════════════
// Integration sessions
// ═══════════════════════════════════════════

pub fn insert_integration_session(
    conn: &Connection,
    session: &IntegrationSession,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO integration_sessions (id, patient_id, dosing_session_id, session_date)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            session.id.to_string(),
            session.patient_id,
            session.dosing_session_id.map(|id| id.to_string()),
            session.session_date,
        ],
    )?;
    Ok(())
}

pub fn get_integration_sessions(
    conn: &Connection,
    patient_ids: &[String],
) -> Result<Vec<IntegrationSession>, DatabaseError> {
    if patient_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, patient_id, dosing_session_id, session_date FROM integration_sessions
         WHERE patient_id IN ({}) ORDER BY session_date ASC, id ASC",
        placeholders(patient_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(patient_ids.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, NaiveDate>(3)?,
        ))
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, patient_id, dosing_session_id, session_date) = row?;
        sessions.push(IntegrationSession {
            id: parse_uuid(&id)?,
            patient_id,
            dosing_session_id: dosing_session_id.as_deref().map(parse_uuid).transpose()?,
            session_date,
        });
    }
    Ok(sessions)
}

// ═══════════════════════════════════════════
// Vitals
// ═══════════════════════════════════════════

pub fn insert_vitals(conn: &Connection, vitals: &VitalsReading) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO session_vitals (id, session_id, recorded_on, systolic_bp, heart_rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            vitals.id.to_string(),
            vitals.session_id.to_string(),
            vitals.recorded_on,
            vitals.systolic_bp,
            vitals.heart_rate,
        ],
    )?;
    Ok(())
}

/// Subset of `session_ids` that have at least one vitals reading.
pub fn get_sessions_with_vitals(
    conn: &Connection,
    session_ids: &[Uuid],
) -> Result<HashSet<Uuid>, DatabaseError> {
    if session_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let sql = format!(
        "SELECT DISTINCT session_id FROM session_vitals WHERE session_id IN ({})",
        placeholders(session_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(session_ids.iter().map(|id| id.to_string())),
        |row| row.get::<_, String>(0),
    )?;

    let mut found = HashSet::new();
    for row in rows {
        found.insert(parse_uuid(&row?)?);
    }
    Ok(found)
}

// ═══════════════════════════════════════════
// Insight dismissals
// ═══════════════════════════════════════════

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {raw}: {e}")))
}

/// Insert or replace the dismissal for `dismissal.card_id`.
pub fn upsert_dismissal(conn: &Connection, dismissal: &Dismissal) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO insight_dismissals (card_id, dismissed_on, expires_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(card_id) DO UPDATE SET
             dismissed_on = excluded.dismissed_on,
             expires_at = excluded.expires_at",
        params![
            dismissal.card_id,
            dismissal.dismissed_on,
            format_instant(dismissal.expires_at),
        ],
    )?;
    Ok(())
}

pub fn get_dismissal(conn: &Connection, card_id: &str) -> Result<Option<Dismissal>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT card_id, dismissed_on, expires_at FROM insight_dismissals WHERE card_id = ?1",
    )?;
    let row = stmt
        .query_row(params![card_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, NaiveDate>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .optional()?;

    row.map(|(card_id, dismissed_on, expires_at)| -> Result<Dismissal, DatabaseError> {
        Ok(Dismissal {
            card_id,
            dismissed_on,
            expires_at: parse_instant(&expires_at)?,
        })
    })
    .transpose()
}

/// Returns true if a row was deleted.
pub fn delete_dismissal(conn: &Connection, card_id: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM insight_dismissals WHERE card_id = ?1",
        params![card_id],
    )?;
    Ok(deleted > 0)
}

/// Delete dismissals whose expiry is at or before `now`.
pub fn purge_expired_dismissals(
    conn: &Connection,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM insight_dismissals WHERE expires_at <= ?1",
        params![format_instant(now)],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(patient: &str, site_id: SiteId, on: NaiveDate) -> ClinicalSession {
        ClinicalSession {
            id: Uuid::new_v4(),
            patient_id: patient.into(),
            site_id,
            session_date: on,
            substance: "psilocybin".into(),
            condition: Some("mdd".into()),
            safety_event_id: None,
        }
    }

    #[test]
    fn sessions_filtered_by_site_and_window_newest_first() {
        let conn = open_memory_database().unwrap();
        insert_session(&conn, &session("P-1", 1, date(2026, 1, 5))).unwrap();
        insert_session(&conn, &session("P-2", 1, date(2026, 1, 20))).unwrap();
        insert_session(&conn, &session("P-3", 1, date(2026, 2, 1))).unwrap();
        insert_session(&conn, &session("P-4", 2, date(2026, 1, 10))).unwrap();

        let all = get_sessions(&conn, 1, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].patient_id, "P-3");
        assert_eq!(all[2].patient_id, "P-1");

        let january = get_sessions(&conn, 1, Some(date(2026, 1, 1)), Some(date(2026, 2, 1))).unwrap();
        let ids: Vec<&str> = january.iter().map(|s| s.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["P-2", "P-1"]);
    }

    #[test]
    fn longitudinal_assessments_ordered_by_offset() {
        let conn = open_memory_database().unwrap();
        for (offset, score) in [(30, 8u8), (0, 20), (60, 6)] {
            insert_longitudinal_assessment(
                &conn,
                &LongitudinalAssessment {
                    id: Uuid::new_v4(),
                    patient_id: "P-1".into(),
                    site_id: 1,
                    assessment_date: date(2026, 1, 1) + chrono::Duration::days(offset as i64),
                    days_post_session: offset,
                    phq9_score: score,
                },
            )
            .unwrap();
        }
        let rows = get_longitudinal_assessments(&conn, 1, None).unwrap();
        let offsets: Vec<i32> = rows.iter().map(|a| a.days_post_session).collect();
        assert_eq!(offsets, vec![0, 30, 60]);

        let none = get_longitudinal_assessments(&conn, 1, Some(&[])).unwrap();
        assert!(none.is_empty());
        let other = get_longitudinal_assessments(&conn, 1, Some(&["P-9".to_string()])).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn safety_events_round_trip_grade() {
        let conn = open_memory_database().unwrap();
        let s = session("P-1", 1, date(2026, 3, 1));
        insert_session(&conn, &s).unwrap();
        insert_safety_event(
            &conn,
            &SafetyEvent {
                id: Uuid::new_v4(),
                session_id: s.id,
                grade: AdverseEventGrade::Moderate,
                occurred_on: date(2026, 3, 1),
            },
        )
        .unwrap();

        let events = get_safety_events(&conn, &[s.id]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].grade, AdverseEventGrade::Moderate);
        assert!(get_safety_events(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn invalid_grade_surfaces_as_enum_error() {
        let conn = open_memory_database().unwrap();
        let s = session("P-1", 1, date(2026, 3, 1));
        insert_session(&conn, &s).unwrap();
        conn.execute(
            "INSERT INTO safety_events (id, session_id, grade, occurred_on)
             VALUES (?1, ?2, 'catastrophic', '2026-03-01')",
            params![Uuid::new_v4().to_string(), s.id.to_string()],
        )
        .unwrap();
        let err = get_safety_events(&conn, &[s.id]).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn vitals_lookup_returns_only_covered_sessions() {
        let conn = open_memory_database().unwrap();
        let a = session("P-1", 1, date(2026, 3, 1));
        let b = session("P-2", 1, date(2026, 3, 2));
        insert_session(&conn, &a).unwrap();
        insert_session(&conn, &b).unwrap();
        insert_vitals(
            &conn,
            &VitalsReading {
                id: Uuid::new_v4(),
                session_id: a.id,
                recorded_on: date(2026, 3, 1),
                systolic_bp: Some(128),
                heart_rate: Some(72),
            },
        )
        .unwrap();

        let covered = get_sessions_with_vitals(&conn, &[a.id, b.id]).unwrap();
        assert!(covered.contains(&a.id));
        assert!(!covered.contains(&b.id));
    }

    #[test]
    fn integration_sessions_by_patient() {
        let conn = open_memory_database().unwrap();
        for patient in ["P-1", "P-1", "P-2"] {
            insert_integration_session(
                &conn,
                &IntegrationSession {
                    id: Uuid::new_v4(),
                    patient_id: patient.into(),
                    dosing_session_id: None,
                    session_date: date(2026, 3, 3),
                },
            )
            .unwrap();
        }
        let rows = get_integration_sessions(&conn, &["P-1".to_string()]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn dismissal_upsert_replaces_expiry() {
        let conn = open_memory_database().unwrap();
        let first = Dismissal::for_day("safety-event-spike", date(2026, 3, 3)).unwrap();
        upsert_dismissal(&conn, &first).unwrap();
        let later = Dismissal::for_day("safety-event-spike", date(2026, 3, 9)).unwrap();
        upsert_dismissal(&conn, &later).unwrap();

        let stored = get_dismissal(&conn, "safety-event-spike").unwrap().unwrap();
        assert_eq!(stored, later);
        assert!(get_dismissal(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn purge_removes_only_expired_dismissals() {
        let conn = open_memory_database().unwrap();
        upsert_dismissal(&conn, &Dismissal::for_day("a", date(2026, 3, 1)).unwrap()).unwrap();
        upsert_dismissal(&conn, &Dismissal::for_day("b", date(2026, 3, 5)).unwrap()).unwrap();

        let now = start_of_day(date(2026, 3, 2));
        assert_eq!(purge_expired_dismissals(&conn, now).unwrap(), 1);
        assert!(get_dismissal(&conn, "a").unwrap().is_none());
        assert!(delete_dismissal(&conn, "b").unwrap());
        assert!(!delete_dismissal(&conn, "b").unwrap());
    }
}
