//! The transient item record flowing through the pipeline.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::coord::Coord;
use crate::date::WikiDate;

/// A Wikidata class identifier (the numeric part of a `Q` id).
pub type ClassId = u32;

bitflags! {
    /// Presence-only claims: the classifier cares only whether the
    /// property key exists on the record, never about its value.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ClaimFlags: u16 {
        /// P641 — sport.
        const SPORT = 1 << 0;
        /// P2094 — competition class.
        const COMP_CLASS = 1 << 1;
        /// P3450 — sports season of league or competition.
        const SEASON = 1 << 2;
        /// P1269 — facet of.
        const FACET_OF = 1 << 3;
        /// P179 — part of the series.
        const SERIES = 1 << 4;
        /// P1346 — winner.
        const WINNER = 1 << 5;
        /// P3157 — event distance.
        const DIST = 1 << 6;
        /// P360 — is a list of.
        const LIST_OF = 1 << 7;
        /// P159 — headquarters location.
        const HQ_LOC = 1 << 8;
        /// P126 — maintained by.
        const MAINTAINER = 1 << 9;
        /// P1082 — population.
        const POPULATION = 1 << 10;
        /// P136 — genre.
        const GENRE = 1 << 11;
        /// P437 — distribution format.
        const FORMAT = 1 << 12;
        /// P856 — official website.
        const WEBSITE = 1 << 13;
        /// P973 — described at URL.
        const DESCRIBE_URL = 1 << 14;
    }
}

/// One Wikidata item, reduced to the fields the classifier and persister
/// need. Owned exclusively by whichever pipeline stage currently holds
/// it; ownership moves through the queues.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Numeric part of the item's `Q` id.
    pub id: u32,
    /// English label; empty when the record has none.
    pub title: String,
    /// P31 (instance of) class ids, in record order.
    pub classes: SmallVec<[ClassId; 8]>,
    /// P279 — subclass of.
    pub sub_class_of: Option<ClassId>,
    /// P361 — part of.
    pub part_of: Option<ClassId>,
    /// P2670 — has part.
    pub has_part: Option<ClassId>,
    /// P664 — organizer.
    pub organizer: Option<ClassId>,
    /// P541 — office contested (elections).
    pub office: Option<ClassId>,
    /// P276 — location.
    pub location: Option<ClassId>,
    /// P669 — located on street.
    pub street: Option<ClassId>,
    /// P131 — located in administrative entity.
    pub admin: Option<ClassId>,
    /// P1001 — applies to jurisdiction.
    pub juri: Option<ClassId>,
    /// P17 — country.
    pub country: Option<ClassId>,
    /// Presence-only claim bits.
    pub flags: ClaimFlags,
    /// P625 — coordinate location.
    pub coord: Option<Coord>,
    /// P585 — point in time.
    pub date: Option<WikiDate>,
    /// P580 — start time.
    pub start: Option<WikiDate>,
    /// P582 — end time.
    pub end: Option<WikiDate>,
}

impl Item {
    /// Returns `true` when any time claim is present.
    #[must_use]
    pub const fn has_time(&self) -> bool {
        self.date.is_some() || self.start.is_some() || self.end.is_some()
    }

    /// Returns `true` when the item already carries both a coordinate
    /// and a time, i.e. needs no location resolution.
    #[must_use]
    pub const fn has_coord_time(&self) -> bool {
        self.coord.is_some() && self.has_time()
    }

    /// The admission predicate applied at the end of parsing: an item is
    /// worth carrying if it has a coordinate, or has a time plus some
    /// location reference that a coordinate can later be borrowed from.
    /// Items must also carry at least one class.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.classes.is_empty()
            && (self.coord.is_some()
                || (self.has_time()
                    && (self.location.is_some()
                        || self.street.is_some()
                        || self.admin.is_some()
                        || self.country.is_some())))
    }

    /// The QID to resolve a coordinate from, by claim precedence.
    #[must_use]
    pub const fn location_ref(&self) -> Option<ClassId> {
        if self.location.is_some() {
            self.location
        } else if self.street.is_some() {
            self.street
        } else if self.admin.is_some() {
            self.admin
        } else if self.juri.is_some() {
            self.juri
        } else {
            self.country
        }
    }

    /// Computes the packed time bounds for the R-tree row.
    ///
    /// Missing endpoints borrow from each other; when both are missing
    /// or inverted and a point-in-time exists, both bounds collapse onto
    /// it. Callers must only invoke this on items with at least one time
    /// claim, which the admission predicate guarantees.
    #[must_use]
    pub fn time_range(&self) -> (i32, i32) {
        let mut min_t = self.start.map_or(0, WikiDate::pack);
        let mut max_t = self.end.map_or(0, WikiDate::pack);

        if min_t == 0 {
            min_t = max_t;
        }
        if max_t == 0 {
            max_t = min_t;
        }

        if min_t == 0 || min_t > max_t {
            if let Some(d) = self.date {
                let t = d.pack();
                min_t = t;
                max_t = t;
            }
        }

        debug_assert!(min_t != 0 && max_t != 0);
        (min_t, max_t)
    }
}

impl fmt::Display for Item {
    /// Multi-line summary used when a database insert fails.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}: {}", self.id, self.title)?;
        if let Some(c) = self.coord {
            write!(f, "\n      coord   : {}, {}", c.lon_degrees(), c.lat_degrees())?;
        }
        if let Some(q) = self.location {
            write!(f, "\n      location: Q{q}")?;
        }
        if let Some(q) = self.street {
            write!(f, "\n      street  : Q{q}")?;
        }
        if let Some(q) = self.admin {
            write!(f, "\n      admin   : Q{q}")?;
        }
        if let Some(q) = self.country {
            write!(f, "\n      country : Q{q}")?;
        }
        if let Some(d) = self.start {
            write!(f, "\n      start: {}", d.pack())?;
        }
        if let Some(d) = self.end {
            write!(f, "\n      end  : {}", d.pack())?;
        }
        if let Some(d) = self.date {
            write!(f, "\n      date : {}", d.pack())?;
        }
        if !self.classes.is_empty() {
            write!(f, "\n      instance of: ")?;
            for c in &self.classes {
                write!(f, "Q{c}|")?;
            }
        }
        Ok(())
    }
}
