use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore};

/// SQLite-backed key-value store.
/// Uses a single `kv` table with BLOB key and BLOB value columns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at the given path.
    /// Use `:memory:` for an in-memory database (useful for tests).
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key BLOB PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        Ok(rows.next()?.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let conn = self.lock()?;
        let mut results = Vec::new();
        match increment_prefix(prefix) {
            Some(upper) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let mut rows = stmt.query(params![prefix, upper])?;
                while let Some(row) = rows.next()? {
                    results.push((row.get(0)?, row.get(1)?));
                }
            }
            None => {
                let mut stmt =
                    conn.prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let mut rows = stmt.query(params![prefix])?;
                while let Some(row) = rows.next()? {
                    let k: Vec<u8> = row.get(0)?;
                    if !k.starts_with(prefix) {
                        break;
                    }
                    results.push((k, row.get(1)?));
                }
            }
        }
        Ok(results)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                BatchOp::Delete { key } => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Increment a byte prefix to compute an exclusive upper bound.
/// Returns None if the prefix is all 0xFF bytes (no upper bound).
fn increment_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut result = prefix.to_vec();
    for i in (0..result.len()).rev() {
        if result[i] < 0xFF {
            result[i] += 1;
            result.truncate(i + 1);
            return Some(result);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    #[test]
    fn test_basic_crud() {
        let store = make_store();
        store.put(b"key", b"value1").unwrap();
        store.put(b"key", b"value2").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value2".to_vec()));
        assert!(store.exists(b"key").unwrap());
        store.delete(b"key").unwrap();
        assert!(!store.exists(b"key").unwrap());
    }

    #[test]
    fn test_prefix_scan() {
        let store = make_store();
        store.put(b"prefix:a", b"1").unwrap();
        store.put(b"prefix:b", b"2").unwrap();
        store.put(b"other:d", b"4").unwrap();
        store.put(&[0xFF, 0xFF, 1], b"5").unwrap();

        assert_eq!(store.prefix_scan(b"prefix:").unwrap().len(), 2);
        assert_eq!(store.prefix_scan(&[0xFF, 0xFF]).unwrap().len(), 1);
    }

    #[test]
    fn test_increment_prefix() {
        assert_eq!(increment_prefix(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(increment_prefix(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(increment_prefix(&[0xFF]), None);
    }

    #[test]
    fn test_batch_is_applied() {
        let store = make_store();
        store.put(b"to_delete", b"value").unwrap();
        store
            .write_batch(vec![
                BatchOp::Put {
                    key: b"batch_key".to_vec(),
                    value: b"batch_val".to_vec(),
                },
                BatchOp::Delete {
                    key: b"to_delete".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get(b"batch_key").unwrap(), Some(b"batch_val".to_vec()));
        assert_eq!(store.get(b"to_delete").unwrap(), None);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchor.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.put(b"persisted", b"yes").unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.get(b"persisted").unwrap(), Some(b"yes".to_vec()));
    }
}
