// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Embedded SQL backend for the persistent store. Grounded on
// `fendermint_rocksdb`'s transaction-guard idiom (a wrapper that panics if
// dropped without an explicit commit/rollback) and on `reifydb-reifydb`'s use
// of `rusqlite` with the `bundled` feature for an embedded, dependency-free
// SQL database.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{KVError, KVResult};
use crate::kv::{QueryResult, StoreRead, StoreTransaction, StoreWrite};

/// One table, `kv(key, value)`, backs the entire persisted layout; hierarchy
/// lives in the key text, not in SQL schema.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value BLOB NOT NULL)";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> KVResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Start a read-only view. Uses the same connection; SQLite serializes
    /// writers against it via the mutex, so reads here are always consistent
    /// with the last committed write.
    pub fn read(&self) -> SqliteReadTx<'_> {
        SqliteReadTx {
            conn: self.conn.lock().expect("store mutex poisoned"),
        }
    }

    /// Begin a read-write transaction: opened before each crank and committed
    /// at the end.
    pub fn begin_write(&self) -> KVResult<SqliteWriteTx<'_>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteWriteTx {
            conn,
            finished: false,
        })
    }

    /// Raw SQL inspection hook returning tabular results, for debugging and
    /// operational tooling.
    pub fn execute_query(&self, sql: &str) -> KVResult<QueryResult> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut result_rows = stmt.query([])?;
        while let Some(row) = result_rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let v: Option<String> = row.get(i)?;
                values.push(v);
            }
            rows.push(values);
        }
        Ok(QueryResult { columns, rows })
    }

    /// Drop and recreate the backing file's content (Facade `clearState`).
    pub fn clear(&self) -> KVResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch("DELETE FROM kv")?;
        Ok(())
    }
}

/// The last key with the given prefix, used to bound a `key < upper` prefix scan.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.last().copied() {
        if last == 0xff {
            bytes.pop();
            continue;
        }
        bytes.pop();
        bytes.push(last + 1);
        return Some(String::from_utf8(bytes).expect("prefix remains valid utf8"));
    }
    None
}

fn iter_prefix(conn: &Connection, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::new();
    match prefix_upper_bound(prefix) {
        Some(upper) => {
            let mut stmt =
                conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")?;
            let mut rows = stmt.query(rusqlite::params![prefix, upper])?;
            while let Some(row) = rows.next()? {
                out.push((row.get(0)?, row.get(1)?));
            }
        }
        None => {
            let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
            let mut rows = stmt.query(rusqlite::params![prefix])?;
            while let Some(row) = rows.next()? {
                out.push((row.get(0)?, row.get(1)?));
            }
        }
    }
    Ok(out)
}

pub struct SqliteReadTx<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> StoreRead for SqliteReadTx<'a> {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(KVError::from)
    }

    fn iter_prefix(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        iter_prefix(&self.conn, prefix)
    }
}

pub struct SqliteWriteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl<'a> StoreRead for SqliteWriteTx<'a> {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(KVError::from)
    }

    fn iter_prefix(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        iter_prefix(&self.conn, prefix)
    }
}

impl<'a> StoreWrite for SqliteWriteTx<'a> {
    fn set(&mut self, key: &str, value: &[u8]) -> KVResult<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> KVResult<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

impl<'a> StoreTransaction for SqliteWriteTx<'a> {
    fn commit(mut self) -> KVResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> KVResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        Ok(())
    }
}

impl<'a> Drop for SqliteWriteTx<'a> {
    fn drop(&mut self) {
        if !self.finished && !thread::panicking() {
            panic!("write transaction dropped without commit or rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let mut tx = store.begin_write().unwrap();
            tx.set("foo", b"bar").unwrap();
            tx.commit().unwrap();
        }
        let tx = store.read();
        assert_eq!(tx.get("foo").unwrap(), Some(b"bar".to_vec()));
        assert!(tx.has("foo").unwrap());

        let mut tx = store.begin_write().unwrap();
        tx.delete("foo").unwrap();
        tx.commit().unwrap();

        let tx = store.read();
        assert_eq!(tx.get("foo").unwrap(), None);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        tx.set("k", b"v").unwrap();
        tx.rollback().unwrap();

        let tx = store.read();
        assert_eq!(tx.get("k").unwrap(), None);
    }

    #[test]
    fn iter_prefix_returns_keys_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        for key in ["v1.clist.ko1", "v1.clist.ko2", "v2.clist.ko1", "v1.vs.a"] {
            tx.set(key, b"x").unwrap();
        }
        tx.commit().unwrap();

        let tx = store.read();
        let got: Vec<String> = tx
            .iter_prefix("v1.clist.")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(got, vec!["v1.clist.ko1".to_string(), "v1.clist.ko2".to_string()]);
    }

    #[test]
    fn execute_query_returns_tabular_results() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        tx.set("a", b"1").unwrap();
        tx.commit().unwrap();

        let result = store.execute_query("SELECT key, value FROM kv").unwrap();
        assert_eq!(result.columns, vec!["key".to_string(), "value".to_string()]);
        assert_eq!(result.rows.len(), 1);
    }
}
