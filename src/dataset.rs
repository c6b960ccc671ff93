//! The `random_data` dataset written by the workload and read back during
//! verification.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::HarnessError;

/// Name of the single table the harness drives.
pub const DATASET_TABLE: &str = "random_data";

/// One row of the generated dataset.
///
/// `value` is strictly increasing in insertion order across a whole run, so
/// `ORDER BY value` reproduces insertion order even though batch boundaries
/// are not otherwise observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRecord {
    /// SQLite-assigned row id.
    pub id: i64,
    /// Fixed-length random alphabetic string.
    pub name: String,
    /// Monotonically increasing insertion counter.
    pub value: i64,
}

/// Open the source database for writing.
///
/// WAL mode keeps the file readable by the agent while the workload holds
/// the single writer connection.
pub fn open_source(path: &Path) -> Result<Connection, HarnessError> {
    let conn = Connection::open(path)?;
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Open a database for reading, for baseline capture and restored output.
///
/// A plain open rather than `SQLITE_OPEN_READ_ONLY`: a database left in WAL
/// mode with a `-wal` sidecar needs write access for recovery on first open.
pub fn open_reader(path: &Path) -> Result<Connection, HarnessError> {
    if !path.is_file() {
        return Err(HarnessError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database file {} does not exist", path.display()),
        )));
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Create the dataset table if it does not exist yet.
pub fn create_table(conn: &Connection) -> Result<(), HarnessError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS random_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            value INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Fetch every row, ordered by `value`.
pub fn fetch_ordered(conn: &Connection) -> Result<Vec<DatasetRecord>, HarnessError> {
    let mut stmt = conn.prepare("SELECT id, name, value FROM random_data ORDER BY value")?;
    let rows = stmt.query_map([], |row| {
        Ok(DatasetRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Count dataset rows, treating a database without the table as empty.
///
/// A restore taken before the agent has replicated the first schema change
/// yields a database with no `random_data` table; for drain polling that
/// simply means zero rows, not an error.
pub fn count_rows(conn: &Connection) -> Result<u64, HarnessError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![DATASET_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM random_data", [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_table(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let conn = memory_db();
        create_table(&conn).unwrap();
        assert_eq!(count_rows(&conn).unwrap(), 0);
    }

    #[test]
    fn test_fetch_ordered_sorts_by_value() {
        let conn = memory_db();
        for (name, value) in [("ccccc", 2i64), ("aaaaa", 0), ("bbbbb", 1)] {
            conn.execute(
                "INSERT INTO random_data (name, value) VALUES (?1, ?2)",
                params![name, value],
            )
            .unwrap();
        }

        let records = fetch_ordered(&conn).unwrap();
        let values: Vec<i64> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(records[0].name, "aaaaa");
    }

    #[test]
    fn test_count_rows_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(count_rows(&conn).unwrap(), 0);
    }
}
