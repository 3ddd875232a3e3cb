use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use ptrack_types::{ProductFields, ProductId, ProductRecord, ProductStatus, TxId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ProductStore, StatusUpdate};

const SELECT_COLUMNS: &str = "id, name, producer_id, manufacture_date, integrity_hash, status, \
     ledger_tx_id, attempts, failure_reason, created_at, updated_at";

/// Product table in a SQLite database.
///
/// Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`),
/// so text order is time order. Ties on `created_at` fall back to insertion
/// order through the `seq` rowid.
pub struct SqliteProductStore {
    conn: Mutex<Connection>,
}

impl SqliteProductStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(map_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(map_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.bootstrap()?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS products (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT NOT NULL UNIQUE,
                name             TEXT NOT NULL,
                producer_id      TEXT NOT NULL,
                manufacture_date TEXT NOT NULL,
                integrity_hash   TEXT NOT NULL,
                status           TEXT NOT NULL,
                ledger_tx_id     TEXT,
                attempts         INTEGER NOT NULL DEFAULT 0,
                failure_reason   TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS products_recent ON products (created_at DESC, seq DESC);
            ",
        )
        .map_err(map_err)
    }

    fn select_one(conn: &Connection, id: &ProductId) -> StoreResult<Option<ProductRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM products WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id.as_str()], RawRow::from_row)
            .optional()
            .map_err(map_err)?;
        raw.map(RawRow::into_record).transpose()
    }
}

impl ProductStore for SqliteProductStore {
    fn insert_pending(&self, id: &ProductId, fields: &ProductFields) -> StoreResult<ProductRecord> {
        let record = ProductRecord::pending(id.clone(), fields.clone(), Utc::now());
        let conn = self.conn.lock().expect("lock poisoned");
        let result = conn.execute(
            "
            INSERT INTO products
                (id, name, producer_id, manufacture_date, integrity_hash, status,
                 attempts, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
            ",
            params![
                id.as_str(),
                fields.name,
                fields.producer_id,
                fields.manufacture_date,
                fields.integrity_hash,
                ProductStatus::Pending.as_str(),
                timestamp(&record.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate(id.clone()))
            }
            Err(err) => Err(map_err(err)),
        }
    }

    fn record_attempt(&self, id: &ProductId) -> StoreResult<ProductRecord> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn
            .execute(
                "UPDATE products SET attempts = attempts + 1, updated_at = ?2 WHERE id = ?1",
                params![id.as_str(), timestamp(&Utc::now())],
            )
            .map_err(map_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Self::select_one(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn apply_outcome(&self, id: &ProductId, update: &StatusUpdate) -> StoreResult<ProductRecord> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        let tx = conn.transaction().map_err(map_err)?;

        let mut record =
            Self::select_one(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        update.apply_to(&mut record, Utc::now())?;

        tx.execute(
            "
            UPDATE products
            SET status = ?2, ledger_tx_id = ?3, attempts = ?4, failure_reason = ?5, updated_at = ?6
            WHERE id = ?1
            ",
            params![
                id.as_str(),
                record.status.as_str(),
                record.ledger_tx_id.map(|t| t.to_hex()),
                record.attempts,
                record.failure_reason,
                timestamp(&record.updated_at),
            ],
        )
        .map_err(map_err)?;
        tx.commit().map_err(map_err)?;
        Ok(record)
    }

    fn get(&self, id: &ProductId) -> StoreResult<Option<ProductRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        Self::select_one(&conn, id)
    }

    fn list_recent(&self) -> StoreResult<Vec<ProductRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let sql = format!("SELECT {SELECT_COLUMNS} FROM products ORDER BY created_at DESC, seq DESC");
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map([], RawRow::from_row)
            .map_err(map_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;
        rows.into_iter().map(RawRow::into_record).collect()
    }
}

impl std::fmt::Debug for SqliteProductStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteProductStore").finish_non_exhaustive()
    }
}

/// A `products` row as SQLite returns it, before validation.
struct RawRow {
    id: String,
    name: String,
    producer_id: String,
    manufacture_date: String,
    integrity_hash: String,
    status: String,
    ledger_tx_id: Option<String>,
    attempts: u32,
    failure_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            producer_id: row.get(2)?,
            manufacture_date: row.get(3)?,
            integrity_hash: row.get(4)?,
            status: row.get(5)?,
            ledger_tx_id: row.get(6)?,
            attempts: row.get(7)?,
            failure_reason: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> StoreResult<ProductRecord> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            id: self.id.clone(),
            reason,
        };
        let id = ProductId::new(self.id.clone()).map_err(|e| corrupt(e.to_string()))?;
        let status: ProductStatus = self.status.parse().map_err(|e: ptrack_types::TypeError| corrupt(e.to_string()))?;
        let ledger_tx_id = self
            .ledger_tx_id
            .as_deref()
            .map(TxId::from_hex)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = parse_timestamp(&self.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(&corrupt)?;

        Ok(ProductRecord {
            id,
            fields: ProductFields::new(
                self.name.clone(),
                self.producer_id.clone(),
                self.manufacture_date.clone(),
                self.integrity_hash.clone(),
            ),
            status,
            ledger_tx_id,
            attempts: self.attempts,
            failure_reason: self.failure_reason.clone(),
            created_at,
            updated_at,
        })
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {raw:?}: {e}"))
}

fn map_err(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Persistence(err.to_string()),
    }
}
