#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `SQLite` output database: session configuration, schema, and the
//! bulk persister.
//!
//! The database holds three tables: an `rtree_i32` virtual table over
//! (lon, lat, time) with degenerate spatial extent per row, a plain
//! `broken_items` table for rows whose time interval is inverted, and a
//! `classes` frequency table. The connection is owned exclusively by the
//! persister; session pragmas trade durability for bulk-insert speed,
//! consistent with the run being restartable from scratch.

pub mod persist;

use std::path::Path;

use rusqlite::Connection;

pub use persist::{PersistSummary, Persister};

/// Errors from database setup or persistence.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `SQLite` call failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file or its directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page cache budget for the bulk ingest session, in KiB (66 MiB).
const CACHE_SIZE_KIB: i64 = 67_584;

/// Opens (or creates) the output database, applies the ingest session
/// pragmas, and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be created or any pragma or
/// DDL statement fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    configure_session(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Bulk-ingest session settings: single exclusive writer, no fsync,
/// truncating journal, in-memory temp store. A crash mid-run means
/// starting over, which the non-resumable design already assumes.
fn configure_session(conn: &Connection) -> Result<(), DbError> {
    conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
    conn.pragma_update(None, "journal_mode", "TRUNCATE")?;
    conn.pragma_update(None, "synchronous", "OFF")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -CACHE_SIZE_KIB)?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS items USING rtree_i32(
            id,               -- QID
            minX, maxX,       -- lon * 1e7
            minY, maxY,       -- lat * 1e7
            minT, maxT,       -- packed time
            +title TEXT,
            +class INTEGER    -- chosen class QID
        );

        CREATE TABLE IF NOT EXISTS classes(
            id   INTEGER PRIMARY KEY,
            cnt  INTEGER,
            name TEXT
        );

        CREATE TABLE IF NOT EXISTS broken_items(
            id   INTEGER PRIMARY KEY,
            minX INTEGER, maxX INTEGER,
            minY INTEGER, maxY INTEGER,
            minT INTEGER, maxT INTEGER,
            title TEXT,
            class INTEGER
        );",
    )?;
    Ok(())
}
