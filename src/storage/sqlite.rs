//! SQLite-backed store

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{Store, SubscriberSource};
use crate::error::{StoreError, StoreResult};
use crate::models::{CheckOutcome, Country, ProxyRecord, Subscriber, Target};

/// SQLite implementation of [`Store`] and [`SubscriberSource`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection; country
/// tasks write disjoint (target, country) keys so contention is short.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Create database schema
    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS targets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS proxies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    country TEXT NOT NULL,
                    addr TEXT NOT NULL,
                    username TEXT,
                    password TEXT,
                    active INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_proxies_country
                    ON proxies(country);

                CREATE TABLE IF NOT EXISTS check_results (
                    target_id INTEGER NOT NULL REFERENCES targets(id),
                    country TEXT NOT NULL,
                    proxy_id INTEGER,
                    is_active INTEGER NOT NULL,
                    status_code INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    error_text TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (target_id, country)
                );

                CREATE TABLE IF NOT EXISTS subscribers (
                    chat_id INTEGER PRIMARY KEY,
                    subscribe_active INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                "#,
        )?;

        Ok(())
    }

    fn find_target(conn: &Connection, url: &str) -> StoreResult<Option<Target>> {
        let target = conn
            .query_row(
                "SELECT id, url, created_at, deleted_at FROM targets WHERE url = ?1",
                params![url],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }
}

fn country_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Country> {
    let code: String = row.get(idx)?;
    Country::parse(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid country code '{code}'").into(),
        )
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: row.get(2)?,
        deleted_at: row.get(3)?,
    })
}

impl Store for SqliteStore {
    fn list_targets(&self) -> StoreResult<Vec<Target>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, created_at, deleted_at FROM targets
             WHERE deleted_at IS NULL ORDER BY id",
        )?;

        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(targets)
    }

    fn add_target(&self, url: &str) -> StoreResult<Option<Target>> {
        let url = url.trim();
        let conn = self.conn()?;
        let now = Utc::now();

        let inserted = conn.execute(
            "INSERT INTO targets (url, created_at) VALUES (?1, ?2)
             ON CONFLICT(url) DO NOTHING",
            params![url, now],
        )?;

        if inserted == 0 {
            let restored = conn.execute(
                "UPDATE targets SET deleted_at = NULL WHERE url = ?1 AND deleted_at IS NOT NULL",
                params![url],
            )?;
            if restored == 0 {
                return Ok(None);
            }
        }

        Self::find_target(&conn, url)
    }

    fn remove_target(&self, url: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "UPDATE targets SET deleted_at = ?2 WHERE url = ?1 AND deleted_at IS NULL",
            params![url.trim(), Utc::now()],
        )?;
        Ok(removed > 0)
    }

    fn list_active_proxies(&self, country: &Country) -> StoreResult<Vec<ProxyRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, country, addr, username, password, active FROM proxies
             WHERE country = ?1 AND active = 1 ORDER BY id",
        )?;

        let proxies = stmt
            .query_map(params![country.as_str()], |row| {
                Ok(ProxyRecord {
                    id: row.get(0)?,
                    country: country_from_row(row, 1)?,
                    addr: row.get(2)?,
                    username: row.get(3)?,
                    password: row.get(4)?,
                    active: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(proxies)
    }

    fn add_proxy(
        &self,
        country: &Country,
        addr: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> StoreResult<ProxyRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO proxies (country, addr, username, password, active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![country.as_str(), addr.trim(), username, password],
        )?;

        Ok(ProxyRecord {
            id: conn.last_insert_rowid(),
            country: country.clone(),
            addr: addr.trim().to_string(),
            username: username.map(String::from),
            password: password.map(String::from),
            active: true,
        })
    }

    fn upsert_outcome(&self, outcome: &CheckOutcome) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO check_results
                    (target_id, country, proxy_id, is_active, status_code, body, error_text, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(target_id, country) DO UPDATE SET
                    proxy_id = excluded.proxy_id,
                    is_active = excluded.is_active,
                    status_code = excluded.status_code,
                    body = excluded.body,
                    error_text = excluded.error_text,
                    updated_at = excluded.updated_at
                "#,
            params![
                outcome.target_id,
                outcome.country.as_str(),
                outcome.proxy_id,
                outcome.is_active,
                outcome.status_code,
                outcome.body,
                outcome.error_text,
                outcome.updated_at,
            ],
        )?;

        Ok(())
    }

    fn list_outcomes(&self, country: &Country) -> StoreResult<Vec<(Target, CheckOutcome)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
                SELECT t.id, t.url, t.created_at, t.deleted_at,
                       r.country, r.proxy_id, r.is_active, r.status_code,
                       r.body, r.error_text, r.updated_at
                FROM check_results r
                JOIN targets t ON t.id = r.target_id
                WHERE r.country = ?1 AND t.deleted_at IS NULL
                ORDER BY t.id
                "#,
        )?;

        let rows = stmt
            .query_map(params![country.as_str()], |row| {
                let target = target_from_row(row)?;
                let updated_at: DateTime<Utc> = row.get(10)?;
                let outcome = CheckOutcome {
                    target_id: target.id,
                    country: country_from_row(row, 4)?,
                    proxy_id: row.get(5)?,
                    is_active: row.get(6)?,
                    status_code: row.get(7)?,
                    body: row.get(8)?,
                    error_text: row.get(9)?,
                    updated_at,
                };
                Ok((target, outcome))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn set_subscription(&self, chat_id: i64, active: bool) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO subscribers (chat_id, subscribe_active, created_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(chat_id) DO UPDATE SET
                    subscribe_active = excluded.subscribe_active
                "#,
            params![chat_id, active, Utc::now()],
        )?;

        Ok(())
    }
}

impl SubscriberSource for SqliteStore {
    fn list_subscribed_recipients(&self) -> StoreResult<Vec<Subscriber>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT chat_id, subscribe_active, created_at FROM subscribers
             WHERE subscribe_active = 1 ORDER BY chat_id",
        )?;

        let subscribers = stmt
            .query_map([], |row| {
                Ok(Subscriber {
                    chat_id: row.get(0)?,
                    subscribe_active: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(subscribers)
    }
}
