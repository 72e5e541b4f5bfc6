//! Persistent store for accounts, usage counters and the payment ledger,
//! backed by a single redb file.
//!
//! # Table design
//!
//! ```text
//! accounts   user_id                          -> JSON Account
//! emails     lowercased email                 -> user_id
//! usage      <action>/<YYYY-MM-DD>/<user_id>  -> u32
//! history    <user_id>/<start_ms:020>/<uuid>  -> JSON HistoryEntry
//! revenue    <YYYY-MM-DD>/<currency>          -> JSON RevenueDay
//! processed  event/<id> | session/<id>        -> JSON ReconciliationReceipt
//! ```
//!
//! redb serializes write transactions, so every read-check-write sequence
//! performed inside one write transaction is atomic with respect to other
//! writers. Usage increments and payment reconciliation both rely on that.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, TierlineError};
use crate::history::{HistoryEntry, RevenueDay};
use crate::ledger::Account;
use crate::meter::{CounterKey, CounterStore, UsageDay};
use crate::paths;
use crate::reconcile::ReconciliationReceipt;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
pub(crate) const EMAILS: TableDefinition<&str, &str> = TableDefinition::new("emails");
pub(crate) const USAGE: TableDefinition<&str, u32> = TableDefinition::new("usage");
pub(crate) const HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("history");
pub(crate) const REVENUE: TableDefinition<&str, &[u8]> = TableDefinition::new("revenue");
pub(crate) const PROCESSED: TableDefinition<&str, &[u8]> = TableDefinition::new("processed");

pub(crate) fn store_err(e: impl std::fmt::Display) -> TierlineError {
    TierlineError::Store(e.to_string())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub(crate) fn history_key(entry: &HistoryEntry) -> String {
    let ms = entry.period_start.timestamp_millis().max(0);
    format!("{}/{:020}/{}", entry.user_id, ms, entry.id)
}

pub(crate) fn revenue_key(day: UsageDay, currency: &str) -> String {
    format!("{day}/{}", currency.to_ascii_lowercase())
}

pub(crate) fn event_key(event_id: &str) -> String {
    format!("event/{event_id}")
}

pub(crate) fn session_key(session_id: &str) -> String {
    format!("session/{session_id}")
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    pub(crate) db: Database,
}

impl Store {
    /// Open or create the database at `path`, creating every table so later
    /// read transactions never hit a missing table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACCOUNTS).map_err(store_err)?;
        wt.open_table(EMAILS).map_err(store_err)?;
        wt.open_table(USAGE).map_err(store_err)?;
        wt.open_table(HISTORY).map_err(store_err)?;
        wt.open_table(REVENUE).map_err(store_err)?;
        wt.open_table(PROCESSED).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Open the store of an initialized project root.
    pub fn open_root(root: &Path) -> Result<Self> {
        if !paths::config_path(root).exists() {
            return Err(TierlineError::NotInitialized);
        }
        Self::open(&paths::store_path(root))
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Register a new account at the free tier.
    pub fn create_account(&self, user_id: &str, email: Option<&str>) -> Result<Account> {
        paths::validate_user_id(user_id)?;
        let email = email.map(normalize_email).filter(|e| !e.is_empty());
        let account = Account::new(user_id, email.clone());
        let value = serde_json::to_vec(&account)?;

        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut accounts = wt.open_table(ACCOUNTS).map_err(store_err)?;
            if accounts.get(user_id).map_err(store_err)?.is_some() {
                return Err(TierlineError::AccountExists(user_id.to_string()));
            }
            let mut emails = wt.open_table(EMAILS).map_err(store_err)?;
            if let Some(ref e) = email {
                if emails.get(e.as_str()).map_err(store_err)?.is_some() {
                    return Err(TierlineError::EmailTaken(e.clone()));
                }
                emails.insert(e.as_str(), user_id).map_err(store_err)?;
            }
            accounts
                .insert(user_id, value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        tracing::info!(user_id, "account created");
        Ok(account)
    }

    pub fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACCOUNTS).map_err(store_err)?;
        let Some(guard) = table.get(user_id).map_err(store_err)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(guard.value())?))
    }

    pub fn account(&self, user_id: &str) -> Result<Account> {
        self.get_account(user_id)?
            .ok_or_else(|| TierlineError::AccountNotFound(user_id.to_string()))
    }

    /// Case-insensitive lookup through the email index.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(None);
        }
        let user_id = {
            let rt = self.db.begin_read().map_err(store_err)?;
            let table = rt.open_table(EMAILS).map_err(store_err)?;
            let found = table.get(email.as_str()).map_err(store_err)?;
            match found {
                Some(guard) => guard.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_account(&user_id)
    }

    /// All accounts ordered by user id.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACCOUNTS).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Read-modify-write of one account inside a single write transaction.
    pub(crate) fn update_account<F>(&self, user_id: &str, f: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let wt = self.db.begin_write().map_err(store_err)?;
        let account = {
            let mut table = wt.open_table(ACCOUNTS).map_err(store_err)?;
            let raw = table
                .get(user_id)
                .map_err(store_err)?
                .map(|g| g.value().to_vec())
                .ok_or_else(|| TierlineError::AccountNotFound(user_id.to_string()))?;
            let mut account: Account = serde_json::from_slice(&raw)?;
            f(&mut account);
            account.updated_at = Utc::now();
            let value = serde_json::to_vec(&account)?;
            table
                .insert(user_id, value.as_slice())
                .map_err(store_err)?;
            account
        };
        wt.commit().map_err(store_err)?;
        Ok(account)
    }

    // -----------------------------------------------------------------------
    // Usage
    // -----------------------------------------------------------------------

    /// Every counter recorded for `user_id` on `day`, as `(action, count)`.
    pub fn usage_for(&self, user_id: &str, day: UsageDay) -> Result<Vec<(String, u32)>> {
        let suffix = format!("/{day}/{user_id}");
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(USAGE).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (k, v) = entry.map_err(store_err)?;
            if let Some(action) = k.value().strip_suffix(suffix.as_str()) {
                result.push((action.to_string(), v.value()));
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Ledger reads
    // -----------------------------------------------------------------------

    /// Subscription history for one user, oldest first.
    pub fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        // '0' sorts immediately after '/', bounding the user's key prefix.
        let start = format!("{user_id}/");
        let end = format!("{user_id}0");
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(HISTORY).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Revenue rows for one day, one per currency.
    pub fn revenue(&self, day: UsageDay) -> Result<Vec<RevenueDay>> {
        let start = format!("{day}/");
        let end = format!("{day}0");
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(REVENUE).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Every revenue row, oldest day first, then by currency.
    pub fn revenue_all(&self) -> Result<Vec<RevenueDay>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(REVENUE).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Receipt for an already-processed provider event, if any.
    pub fn receipt_for_event(&self, event_id: &str) -> Result<Option<ReconciliationReceipt>> {
        let key = event_key(event_id);
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(PROCESSED).map_err(store_err)?;
        let Some(guard) = table.get(key.as_str()).map_err(store_err)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(guard.value())?))
    }
}

impl CounterStore for Store {
    fn read(&self, key: &CounterKey) -> Result<u32> {
        let k = key.encode();
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(USAGE).map_err(store_err)?;
        let value = table.get(k.as_str()).map_err(store_err)?.map(|g| g.value());
        Ok(value.unwrap_or(0))
    }

    fn increment_if_below(&self, key: &CounterKey, limit: u32) -> Result<Option<u32>> {
        let k = key.encode();
        let wt = self.db.begin_write().map_err(store_err)?;
        let next = {
            let mut table = wt.open_table(USAGE).map_err(store_err)?;
            let current = table
                .get(k.as_str())
                .map_err(store_err)?
                .map(|g| g.value())
                .unwrap_or(0);
            if current >= limit {
                None
            } else {
                table.insert(k.as_str(), current + 1).map_err(store_err)?;
                Some(current + 1)
            }
        };
        match next {
            Some(_) => wt.commit().map_err(store_err)?,
            None => wt.abort().map_err(store_err)?,
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::{Limit, UsageMeter};
    use tempfile::TempDir;

    pub(crate) fn open_tmp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_fetch_account() {
        let (_dir, store) = open_tmp();
        let created = store.create_account("u1", Some("Jane@Example.com")).unwrap();
        assert_eq!(created.email.as_deref(), Some("jane@example.com"));

        let fetched = store.account("u1").unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert!(store.get_account("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_account_and_email_rejected() {
        let (_dir, store) = open_tmp();
        store.create_account("u1", Some("a@example.com")).unwrap();
        assert!(matches!(
            store.create_account("u1", None),
            Err(TierlineError::AccountExists(_))
        ));
        assert!(matches!(
            store.create_account("u2", Some("A@example.com")),
            Err(TierlineError::EmailTaken(_))
        ));
        assert!(store.get_account("u2").unwrap().is_none());
    }

    #[test]
    fn email_lookup_is_case_insensitive() {
        let (_dir, store) = open_tmp();
        store.create_account("u1", Some("coach@example.com")).unwrap();
        let found = store.find_by_email("  COACH@example.COM ").unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert!(store.find_by_email("other@example.com").unwrap().is_none());
        assert!(store.find_by_email("").unwrap().is_none());
    }

    #[test]
    fn invalid_user_id_rejected() {
        let (_dir, store) = open_tmp();
        assert!(matches!(
            store.create_account("a/b", None),
            Err(TierlineError::InvalidUserId(_))
        ));
    }

    #[test]
    fn counters_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.redb");
        let day: UsageDay = "2026-03-01".parse().unwrap();
        {
            let store = Store::open(&path).unwrap();
            let meter = UsageMeter::new(&store);
            meter.try_consume("u1", "chat", Limit::Daily(3), day).unwrap();
            meter.try_consume("u1", "chat", Limit::Daily(3), day).unwrap();
        }
        let store = Store::open(&path).unwrap();
        let q = UsageMeter::new(&store)
            .peek("u1", "chat", Limit::Daily(3), day)
            .unwrap();
        assert_eq!(q.used, 2);
        assert_eq!(q.remaining, Some(1));
    }

    #[test]
    fn exhausted_counter_is_not_written() {
        let (_dir, store) = open_tmp();
        let key = CounterKey::new("u1", "chat", "2026-03-01".parse().unwrap());
        assert_eq!(store.increment_if_below(&key, 1).unwrap(), Some(1));
        assert_eq!(store.increment_if_below(&key, 1).unwrap(), None);
        assert_eq!(store.read(&key).unwrap(), 1);
    }

    #[test]
    fn usage_for_lists_only_that_user_and_day() {
        let (_dir, store) = open_tmp();
        let day: UsageDay = "2026-03-01".parse().unwrap();
        let meter = UsageMeter::new(&store);
        meter.try_consume("u1", "chat", Limit::Daily(5), day).unwrap();
        meter.try_consume("u1", "journal", Limit::Daily(5), day).unwrap();
        meter.try_consume("u12", "chat", Limit::Daily(5), day).unwrap();
        meter
            .try_consume("u1", "chat", Limit::Daily(5), day.next())
            .unwrap();

        let usage = store.usage_for("u1", day).unwrap();
        assert_eq!(
            usage,
            vec![("chat".to_string(), 1), ("journal".to_string(), 1)]
        );
    }

    #[test]
    fn open_root_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Store::open_root(dir.path()),
            Err(TierlineError::NotInitialized)
        ));
    }
}
