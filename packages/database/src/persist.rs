//! Transactional bulk persistence with two-pass location resolution.
//!
//! Items arriving with both coordinate and time insert immediately.
//! Items with only a coordinate are coordinate *sources*: their point is
//! remembered under their own QID and the item itself is dropped. Items
//! with a time but no coordinate wait on the QID they reference; once
//! that QID's coordinate is known (immediately, or during the drain
//! after end of stream) they inherit it and persist. Resolution is a
//! single indirection hop keyed by QID, so arrival order never matters.

use std::collections::HashMap;

use rusqlite::{params, Connection, Transaction};

use geochron_models::{ClassId, Coord, Item};

use crate::DbError;

const INSERT_ITEM: &str = "INSERT INTO items(id, minX, maxX, minY, maxY, minT, maxT, title, class)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const INSERT_BROKEN: &str =
    "INSERT INTO broken_items(id, minX, maxX, minY, maxY, minT, maxT, title, class)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const INSERT_CLASS: &str = "INSERT INTO classes(id, cnt) VALUES (?1, ?2)";

/// Second-pass inserts are committed in slices of this many rows.
const SECOND_PASS_COMMIT_EVERY: u64 = 126;

/// A known or awaited coordinate for one referent QID.
#[derive(Debug, Default)]
struct LocationEntry {
    coord: Option<Coord>,
    pending: Vec<Item>,
}

/// Row counters accumulated across both passes.
#[derive(Debug, Default)]
struct RowStats {
    class_counts: HashMap<ClassId, i64>,
    inserted: u64,
    broken: u64,
    failed: u64,
}

/// Totals reported after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    /// Rows written to `items` and `broken_items` together.
    pub inserted: u64,
    /// Rows that went to `broken_items`.
    pub broken: u64,
    /// Rows resolved and written during the second pass.
    pub resolved_second_pass: u64,
    /// Distinct classes recorded in the frequency table.
    pub classes: usize,
    /// Rows lost to non-fatal insert errors.
    pub failed_rows: u64,
}

/// Owns the output connection and the location-resolution state.
pub struct Persister {
    conn: Connection,
    locations: HashMap<ClassId, LocationEntry>,
    stats: RowStats,
}

impl Persister {
    /// Wraps an opened output connection (see [`crate::open`]).
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            locations: HashMap::new(),
            stats: RowStats::default(),
        }
    }

    /// First pass over one intake batch, in a single transaction.
    ///
    /// Returns the number of rows written for this batch.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for transaction-level failures; row-level
    /// insert errors are logged and skipped.
    pub fn intake(&mut self, items: Vec<Item>) -> Result<u64, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0u64;

        for mut item in items {
            if !item.has_coord_time() {
                if let Some(coord) = item.coord {
                    // A coordinate source, not a record.
                    self.locations.entry(item.id).or_default().coord = Some(coord);
                    continue;
                }

                let Some(loc_id) = item.location_ref() else {
                    continue;
                };
                let entry = self.locations.entry(loc_id).or_default();
                match entry.coord {
                    Some(coord) => item.coord = Some(coord),
                    None => {
                        entry.pending.push(item);
                        continue;
                    }
                }
            }

            if insert_row(&tx, &mut self.stats, &item)? {
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Second pass after end of stream: drains every location entry
    /// whose coordinate became known, then writes the class-frequency
    /// table. Entries that never learned a coordinate are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for transaction-level failures.
    pub fn finish(&mut self) -> Result<PersistSummary, DbError> {
        log::info!("Resolving deferred items...");

        let locations = std::mem::take(&mut self.locations);
        let mut resolved = 0u64;
        let mut batch = 0u64;

        let mut tx = self.conn.unchecked_transaction()?;
        for entry in locations.into_values() {
            let Some(coord) = entry.coord else { continue };

            for mut item in entry.pending {
                item.coord = Some(coord);

                if insert_row(&tx, &mut self.stats, &item)? {
                    resolved += 1;
                    batch += 1;
                    if batch >= SECOND_PASS_COMMIT_EVERY {
                        tx.commit()?;
                        tx = self.conn.unchecked_transaction()?;
                        batch = 0;
                    }
                }
            }
        }
        tx.commit()?;
        log::info!("{resolved} deferred items resolved");

        log::info!("Writing class frequencies...");
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_CLASS)?;
            for (&id, &cnt) in &self.stats.class_counts {
                if let Err(e) = stmt.execute(params![id, cnt]) {
                    log::error!("Class insert failed for Q{id} (cnt {cnt}): {e}");
                }
            }
        }
        tx.commit()?;
        log::info!("{} classes recorded", self.stats.class_counts.len());

        Ok(PersistSummary {
            inserted: self.stats.inserted,
            broken: self.stats.broken,
            resolved_second_pass: resolved,
            classes: self.stats.class_counts.len(),
            failed_rows: self.stats.failed,
        })
    }
}

/// Classifies and inserts one coordinate-and-time item. Returns whether
/// a row was written; execution errors are logged and swallowed so a bad
/// row never aborts the run.
fn insert_row(tx: &Transaction<'_>, stats: &mut RowStats, item: &Item) -> Result<bool, DbError> {
    let Some(row) = geochron_classify::classify(item) else {
        return Ok(false);
    };
    let Some(coord) = item.coord else {
        return Ok(false);
    };

    let sql = if row.broken { INSERT_BROKEN } else { INSERT_ITEM };
    let mut stmt = tx.prepare_cached(sql)?;

    let result = stmt.execute(params![
        item.id,
        coord.lon_e7,
        coord.lon_e7,
        coord.lat_e7,
        coord.lat_e7,
        row.min_t,
        row.max_t,
        item.title.as_str(),
        row.class,
    ]);

    match result {
        Ok(_) => {
            *stats.class_counts.entry(row.class).or_insert(0) += 1;
            stats.inserted += 1;
            if row.broken {
                stats.broken += 1;
            }
            Ok(true)
        }
        Err(e) => {
            stats.failed += 1;
            log::error!("Insert failed: {e}\n Item: {item}");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geochron_models::WikiDate;
    use smallvec::SmallVec;

    const BRIDGE: ClassId = 12_518;

    fn open_persister(dir: &tempfile::TempDir) -> Persister {
        let conn = crate::open(&dir.path().join("out.sqlite")).unwrap();
        Persister::new(conn)
    }

    fn item(id: u32, classes: &[ClassId]) -> Item {
        Item {
            id,
            title: format!("item {id}"),
            classes: SmallVec::from_slice(classes),
            ..Item::default()
        }
    }

    fn coord_time_item(id: u32, classes: &[ClassId]) -> Item {
        let mut it = item(id, classes);
        it.coord = Some(Coord::from_degrees(2.0, 1.0));
        it.date = Some(WikiDate::new(2020, 1, 2).unwrap());
        it
    }

    fn count(p: &Persister, table: &str) -> i64 {
        p.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn persists_a_plain_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        let mut it = coord_time_item(1, &[BRIDGE]);
        it.title = "P".into();
        assert_eq!(p.intake(vec![it]).unwrap(), 1);
        let summary = p.finish().unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.broken, 0);

        let row: (u32, i32, i32, i32, i32, i32, i32, String, u32) = p
            .conn
            .query_row(
                "SELECT id, minX, maxX, minY, maxY, minT, maxT, title, class FROM items",
                [],
                |r| {
                    Ok((
                        r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?,
                        r.get(5)?, r.get(6)?, r.get(7)?, r.get(8)?,
                    ))
                },
            )
            .unwrap();
        assert_eq!(
            row,
            (1, 20_000_000, 20_000_000, 10_000_000, 10_000_000,
             20_200_102, 20_200_102, "P".into(), BRIDGE)
        );

        let (cid, cnt): (u32, i64) = p
            .conn
            .query_row("SELECT id, cnt FROM classes", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((cid, cnt), (BRIDGE, 1));
    }

    #[test]
    fn ignored_class_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        // Solar eclipse is in the ignore set.
        assert_eq!(p.intake(vec![coord_time_item(1, &[3887])]).unwrap(), 0);
        let summary = p.finish().unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(count(&p, "items"), 0);
        assert_eq!(count(&p, "classes"), 0);
    }

    #[test]
    fn second_pass_resolves_late_coordinate_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        // B references Q100 for its coordinate; A supplies it, arriving
        // later in the same batch.
        let mut b = item(7, &[BRIDGE]);
        b.location = Some(100);
        b.date = Some(WikiDate::new(2020, 1, 2).unwrap());

        let mut a = item(100, &[BRIDGE]);
        a.coord = Some(Coord::from_degrees(9.0, 3.0));

        assert_eq!(p.intake(vec![b, a]).unwrap(), 0);
        assert_eq!(count(&p, "items"), 0);

        let summary = p.finish().unwrap();
        assert_eq!(summary.resolved_second_pass, 1);

        let (id, lon, lat): (u32, i32, i32) = p
            .conn
            .query_row("SELECT id, minX, minY FROM items", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!((id, lon, lat), (7, 90_000_000, 30_000_000));
    }

    #[test]
    fn known_coordinate_resolves_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        let mut a = item(100, &[BRIDGE]);
        a.coord = Some(Coord::from_degrees(9.0, 3.0));
        assert_eq!(p.intake(vec![a]).unwrap(), 0);

        let mut b = item(7, &[BRIDGE]);
        b.admin = Some(100);
        b.start = Some(WikiDate::new(1990, 5, 1).unwrap());

        // Resolved during intake, before the end-of-stream drain.
        assert_eq!(p.intake(vec![b]).unwrap(), 1);
        assert_eq!(count(&p, "items"), 1);

        let summary = p.finish().unwrap();
        assert_eq!(summary.resolved_second_pass, 0);
    }

    #[test]
    fn unresolvable_pending_items_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        let mut b = item(7, &[BRIDGE]);
        b.country = Some(999); // nothing ever supplies Q999
        b.date = Some(WikiDate::new(2020, 1, 2).unwrap());

        p.intake(vec![b]).unwrap();
        let summary = p.finish().unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(count(&p, "items"), 0);
    }

    #[test]
    fn inverted_interval_goes_to_broken_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        let mut it = coord_time_item(4, &[BRIDGE]);
        it.date = None;
        it.start = Some(WikiDate::new(2021, 1, 2).unwrap());
        it.end = Some(WikiDate::new(2020, 1, 1).unwrap());

        assert_eq!(p.intake(vec![it]).unwrap(), 1);
        let summary = p.finish().unwrap();
        assert_eq!(summary.broken, 1);
        assert_eq!(count(&p, "items"), 0);

        let (min_t, max_t): (i32, i32) = p
            .conn
            .query_row("SELECT minT, maxT FROM broken_items", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert!(min_t > max_t);
    }

    #[test]
    fn generic_class_promotes_before_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        // Event first, bridge second: the row lands under bridge.
        p.intake(vec![coord_time_item(5, &[1_656_682, BRIDGE])]).unwrap();
        p.finish().unwrap();

        let class: u32 = p
            .conn
            .query_row("SELECT class FROM items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(class, BRIDGE);
    }

    #[test]
    fn alias_class_is_remapped() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        // Series of wars folds into war.
        p.intake(vec![coord_time_item(6, &[104_212_151])]).unwrap();
        p.finish().unwrap();

        let class: u32 = p
            .conn
            .query_row("SELECT class FROM items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(class, 198);

        let (cid, cnt): (u32, i64) = p
            .conn
            .query_row("SELECT id, cnt FROM classes", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((cid, cnt), (198, 1));
    }

    #[test]
    fn class_counts_match_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        p.intake(vec![
            coord_time_item(1, &[BRIDGE]),
            coord_time_item(2, &[BRIDGE]),
            coord_time_item(3, &[198]),
        ])
        .unwrap();
        p.finish().unwrap();

        let mut stmt = p
            .conn
            .prepare("SELECT id, cnt FROM classes ORDER BY id")
            .unwrap();
        let rows: Vec<(u32, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(rows, vec![(198, 1), (BRIDGE, 2)]);
    }

    #[test]
    fn duplicate_broken_row_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = open_persister(&dir);

        let broken = || {
            let mut it = coord_time_item(4, &[BRIDGE]);
            it.date = None;
            it.start = Some(WikiDate::new(2021, 1, 2).unwrap());
            it.end = Some(WikiDate::new(2020, 1, 1).unwrap());
            it
        };

        // The second row collides on the primary key; the run continues.
        assert_eq!(p.intake(vec![broken(), broken()]).unwrap(), 1);
        let summary = p.finish().unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(count(&p, "broken_items"), 1);
    }
}
