//! Per-card, per-day dismissal of insight cards.
//!
//! A dismissal hides a card until the start of the next UTC day, after which
//! the card reappears if its rule still triggers. Stores hold expiry windows;
//! the day-keyed view lives in [`DismissalLedger`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::db::{self, open_database, open_memory_database, DatabaseError};
use crate::models::Dismissal;

use super::types::InsightCard;

#[derive(Error, Debug)]
pub enum DismissalError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Card id must not be empty")]
    EmptyCardId,

    #[error("No day follows {0}")]
    DateOutOfRange(NaiveDate),

    #[error("Internal lock failed")]
    LockFailed,
}

/// External key format for day-scoped dismissals: `cardId_YYYY-MM-DD`.
pub fn dismissal_key(card_id: &str, day: NaiveDate) -> String {
    format!("{card_id}_{}", day.format("%Y-%m-%d"))
}

/// Inverse of [`dismissal_key`]. Card ids may themselves contain `_`.
pub fn parse_dismissal_key(key: &str) -> Option<(String, NaiveDate)> {
    let (card_id, day) = key.rsplit_once('_')?;
    if card_id.is_empty() {
        return None;
    }
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some((card_id.to_string(), day))
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Expiry-keyed persistence for dismissals. One record per card id.
pub trait DismissalStore: Send + Sync {
    fn get(&self, card_id: &str) -> Result<Option<Dismissal>, DismissalError>;

    /// Insert or replace the record for `dismissal.card_id`.
    fn put(&self, dismissal: Dismissal) -> Result<(), DismissalError>;

    /// Returns true if a record was removed.
    fn remove(&self, card_id: &str) -> Result<bool, DismissalError>;

    /// Drop records expired at `now`. Returns how many were dropped.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DismissalError>;
}

/// In-memory store backed by RwLock.
#[derive(Default)]
pub struct MemoryDismissalStore {
    records: RwLock<HashMap<String, Dismissal>>,
}

impl MemoryDismissalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DismissalStore for MemoryDismissalStore {
    fn get(&self, card_id: &str) -> Result<Option<Dismissal>, DismissalError> {
        let records = self.records.read().map_err(|_| DismissalError::LockFailed)?;
        Ok(records.get(card_id).cloned())
    }

    fn put(&self, dismissal: Dismissal) -> Result<(), DismissalError> {
        let mut records = self.records.write().map_err(|_| DismissalError::LockFailed)?;
        records.insert(dismissal.card_id.clone(), dismissal);
        Ok(())
    }

    fn remove(&self, card_id: &str) -> Result<bool, DismissalError> {
        let mut records = self.records.write().map_err(|_| DismissalError::LockFailed)?;
        Ok(records.remove(card_id).is_some())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DismissalError> {
        let mut records = self.records.write().map_err(|_| DismissalError::LockFailed)?;
        let before = records.len();
        records.retain(|_, d| d.is_active_at(now));
        Ok(before - records.len())
    }
}

/// SQLite-backed store over the `insight_dismissals` table.
pub struct SqliteDismissalStore {
    conn: Mutex<Connection>,
}

impl SqliteDismissalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DismissalError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DismissalError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, DismissalError> {
        self.conn.lock().map_err(|_| DismissalError::LockFailed)
    }
}

impl DismissalStore for SqliteDismissalStore {
    fn get(&self, card_id: &str) -> Result<Option<Dismissal>, DismissalError> {
        Ok(db::get_dismissal(&*self.connection()?, card_id)?)
    }

    fn put(&self, dismissal: Dismissal) -> Result<(), DismissalError> {
        Ok(db::upsert_dismissal(&*self.connection()?, &dismissal)?)
    }

    fn remove(&self, card_id: &str) -> Result<bool, DismissalError> {
        Ok(db::delete_dismissal(&*self.connection()?, card_id)?)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DismissalError> {
        Ok(db::purge_expired_dismissals(&*self.connection()?, now)?)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Day-keyed dismissal operations over any [`DismissalStore`].
pub struct DismissalLedger<S: DismissalStore> {
    store: S,
}

impl<S: DismissalStore> DismissalLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_dismissed(&self, card_id: &str, day: NaiveDate) -> Result<bool, DismissalError> {
        Ok(self
            .store
            .get(card_id)?
            .is_some_and(|d| d.covers(day)))
    }

    /// Hide `card_id` for the rest of `day`. Repeating it is a no-op.
    pub fn dismiss(&self, card_id: &str, day: NaiveDate) -> Result<(), DismissalError> {
        if card_id.trim().is_empty() {
            return Err(DismissalError::EmptyCardId);
        }
        let dismissal =
            Dismissal::for_day(card_id, day).ok_or(DismissalError::DateOutOfRange(day))?;
        self.store.put(dismissal)?;
        tracing::debug!(card_id, day = %day, "Insight card dismissed");
        Ok(())
    }

    /// Undo a dismissal made for `day`. Returns true if one was in effect.
    pub fn clear(&self, card_id: &str, day: NaiveDate) -> Result<bool, DismissalError> {
        match self.store.get(card_id)? {
            Some(d) if d.covers(day) => self.store.remove(card_id),
            _ => Ok(false),
        }
    }

    /// Cards not dismissed on `day`, order preserved.
    pub fn filter(
        &self,
        cards: Vec<InsightCard>,
        day: NaiveDate,
    ) -> Result<Vec<InsightCard>, DismissalError> {
        let mut visible = Vec::with_capacity(cards.len());
        for card in cards {
            if !self.is_dismissed(&card.id, day)? {
                visible.push(card);
            }
        }
        Ok(visible)
    }

    /// Clear today's dismissals for every known card. Returns how many were
    /// cleared.
    pub fn show_all(&self, cards: &[InsightCard], day: NaiveDate) -> Result<usize, DismissalError> {
        let mut cleared = 0;
        for card in cards {
            if self.clear(&card.id, day)? {
                cleared += 1;
            }
        }
        tracing::info!(cleared, "Dismissed insight cards restored");
        Ok(cleared)
    }

    /// Housekeeping for stores that outlive a day.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DismissalError> {
        let purged = self.store.purge_expired(now)?;
        if purged > 0 {
            tracing::debug!(purged, "Expired dismissals removed");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::insights::engine::InsightEngine;
    use crate::insights::rules::fixtures::*;
    use crate::insights::source::SnapshotSource;
    use crate::models::start_of_day;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[test]
    fn key_format_round_trips_underscored_ids() {
        let key = dismissal_key("follow-up-loss-PT_7", day(14));
        assert_eq!(key, "follow-up-loss-PT_7_2026-06-14");
        assert_eq!(
            parse_dismissal_key(&key),
            Some(("follow-up-loss-PT_7".to_string(), day(14)))
        );
        assert_eq!(parse_dismissal_key("no-date"), None);
        assert_eq!(parse_dismissal_key("_2026-06-14"), None);
    }

    #[test]
    fn dismissal_lasts_until_next_day() {
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        ledger.dismiss("safety-event-spike", day(14)).unwrap();
        assert!(ledger.is_dismissed("safety-event-spike", day(14)).unwrap());
        assert!(!ledger.is_dismissed("safety-event-spike", day(15)).unwrap());
        assert!(!ledger.is_dismissed("safety-event-spike", day(13)).unwrap());
        assert!(!ledger.is_dismissed("documentation-decay", day(14)).unwrap());
    }

    #[test]
    fn dismiss_is_idempotent() {
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        ledger.dismiss("x", day(14)).unwrap();
        let first = ledger.store().get("x").unwrap();
        ledger.dismiss("x", day(14)).unwrap();
        assert_eq!(ledger.store().get("x").unwrap(), first);
    }

    #[test]
    fn clear_only_affects_the_given_day() {
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        ledger.dismiss("x", day(14)).unwrap();
        assert!(!ledger.clear("x", day(15)).unwrap());
        assert!(ledger.is_dismissed("x", day(14)).unwrap());
        assert!(ledger.clear("x", day(14)).unwrap());
        assert!(!ledger.is_dismissed("x", day(14)).unwrap());
    }

    #[test]
    fn empty_card_id_rejected() {
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        assert!(matches!(
            ledger.dismiss("  ", day(14)),
            Err(DismissalError::EmptyCardId)
        ));
    }

    #[test]
    fn purge_drops_only_expired() {
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        ledger.dismiss("a", day(10)).unwrap();
        ledger.dismiss("b", day(14)).unwrap();
        assert_eq!(ledger.purge_expired(start_of_day(day(12))).unwrap(), 1);
        assert!(ledger.store().get("a").unwrap().is_none());
        assert!(ledger.store().get("b").unwrap().is_some());
    }

    #[test]
    fn sqlite_store_matches_memory_semantics() {
        let ledger = DismissalLedger::new(SqliteDismissalStore::open_in_memory().unwrap());
        ledger.dismiss("x", day(14)).unwrap();
        assert!(ledger.is_dismissed("x", day(14)).unwrap());
        assert!(!ledger.is_dismissed("x", day(15)).unwrap());
        assert!(ledger.clear("x", day(14)).unwrap());
        assert!(ledger.store().get("x").unwrap().is_none());
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dismissals.db");
        {
            let ledger = DismissalLedger::new(SqliteDismissalStore::open(&path).unwrap());
            ledger.dismiss("x", day(14)).unwrap();
        }
        let ledger = DismissalLedger::new(SqliteDismissalStore::open(&path).unwrap());
        assert!(ledger.is_dismissed("x", day(14)).unwrap());
    }

    /// Overdue follow-up that keeps triggering until the patient is seen.
    fn overdue_site() -> SnapshotSource {
        SnapshotSource {
            sessions: vec![session("PT-0042", days_ago(45), "psilocybin")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn dismissed_card_returns_the_next_day() {
        let engine = InsightEngine::new(Arc::new(overdue_site()));
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        let d = today();
        let next = d.succ_opt().unwrap();

        let feed = engine.run_as_of(SITE, d).await;
        let id = feed.cards[0].id.clone();
        assert_eq!(id, "follow-up-loss-PT-0042");
        ledger.dismiss(&id, d).unwrap();

        let same_day = engine.run_as_of(SITE, d).await;
        assert!(ledger.filter(same_day.cards, d).unwrap().is_empty());

        let next_day = engine.run_as_of(SITE, next).await;
        let visible = ledger.filter(next_day.cards, next).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, id);
    }

    #[tokio::test]
    async fn show_all_restores_dismissed_cards() {
        let engine = InsightEngine::new(Arc::new(overdue_site()));
        let ledger = DismissalLedger::new(MemoryDismissalStore::new());
        let d = today();

        let feed = engine.run_as_of(SITE, d).await;
        for card in &feed.cards {
            ledger.dismiss(&card.id, d).unwrap();
        }
        assert!(ledger.filter(feed.cards.clone(), d).unwrap().is_empty());

        assert_eq!(ledger.show_all(&feed.cards, d).unwrap(), feed.cards.len());
        assert_eq!(ledger.filter(feed.cards.clone(), d).unwrap().len(), feed.cards.len());
    }
}
