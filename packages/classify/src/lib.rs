#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Decides, per item, whether a row is written and under which class.
//!
//! The rules are an ordered filter list: presence-claim exclusions
//! first, then the ignore set, then a handful of per-class refinements
//! (election folding, event/convention pruning, date guards, generic
//! class promotion), and finally the alias remap. An item that survives
//! yields its class and packed time bounds.

use geochron_models::{ClaimFlags, ClassId, Item};

// Classes the rules refer to by name.
const CONVENTION: ClassId = 625_994;
const MEETING: ClassId = 2_761_147;
const EVENT: ClassId = 1_656_682;
const OCCURRENCE: ClassId = 1_190_554;
const INCIDENT: ClassId = 12_890_393;
const LEGAL_CASE: ClassId = 2_334_719;
const CONCERT: ClassId = 182_832;
const SQUARE: ClassId = 174_782;
const MONUMENT: ClassId = 4_989_906;
const GROUP_OF_ELECTIONS: ClassId = 76_853_179;
const PUBLIC_ELECTION: ClassId = 40_231;
const LOCAL_ELECTION: ClassId = 15_966_540;
const LEADERS_DEBATE: ClassId = 6_508_605;
const CYCLING_RACE_CLASSES: [ClassId; 2] = [22_231_119, 60_181_400];

/// Presence claims that disqualify an item outright: sports plumbing,
/// list/series pages, organisations, media works, populated places
/// carried by other classes already.
const EXCLUDED_FLAGS: ClaimFlags = ClaimFlags::SPORT
    .union(ClaimFlags::COMP_CLASS)
    .union(ClaimFlags::SEASON)
    .union(ClaimFlags::WINNER)
    .union(ClaimFlags::DIST)
    .union(ClaimFlags::LIST_OF)
    .union(ClaimFlags::HQ_LOC)
    .union(ClaimFlags::MAINTAINER)
    .union(ClaimFlags::POPULATION)
    .union(ClaimFlags::GENRE)
    .union(ClaimFlags::FORMAT);

/// A classified row ready to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowClass {
    /// Final class after refinement and remapping.
    pub class: ClassId,
    /// Packed lower time bound.
    pub min_t: i32,
    /// Packed upper time bound.
    pub max_t: i32,
    /// Set when the computed interval is inverted; such rows go to the
    /// separate broken table so the R-tree ordering invariant holds.
    pub broken: bool,
}

/// Runs the rule list over an item carrying both coordinate and time.
///
/// Returns `None` when the item is filtered out.
#[must_use]
pub fn classify(item: &Item) -> Option<RowClass> {
    debug_assert!(item.has_coord_time());

    if item.flags.intersects(EXCLUDED_FLAGS) {
        return None;
    }

    if item
        .sub_class_of
        .is_some_and(|c| CYCLING_RACE_CLASSES.contains(&c))
    {
        return None;
    }

    if geochron_taxonomy::any_ignored(item.classes.iter().copied()) {
        return None;
    }

    let mut class = *item.classes.first()?;

    if item
        .flags
        .intersects(ClaimFlags::FACET_OF | ClaimFlags::SERIES)
        && (class == CONVENTION || class == MEETING)
    {
        return None;
    }

    if item
        .has_part
        .is_some_and(|c| c == LOCAL_ELECTION || c == LEADERS_DEBATE)
    {
        return None;
    }

    if let Some(part_of) = item.part_of {
        if item.office.is_some() || item.juri.is_some() || class == GROUP_OF_ELECTIONS {
            return None;
        }
        if class == EVENT && geochron_taxonomy::is_ignored(part_of) {
            return None;
        }
    }

    if item.office.is_some() {
        // Only country-level elections: the contested jurisdiction must
        // be the country itself (two absent values also match).
        if item.country != item.juri {
            return None;
        }
        class = PUBLIC_ELECTION;
    }

    if class == CONVENTION || class == EVENT {
        if item.part_of.is_some()
            || item
                .flags
                .intersects(ClaimFlags::WEBSITE | ClaimFlags::DESCRIBE_URL)
        {
            return None;
        }
        if item.organizer.is_some_and(geochron_taxonomy::is_ignored) {
            return None;
        }
    }

    let (min_t, max_t) = item.time_range();

    // Date guards: these classes accumulate huge modern memberships that
    // drown the index; the thresholds cut them off. Below them, generic
    // leading classes promote to the next listed class.
    if class == CONCERT && min_t > 19_260_101 {
        return None;
    } else if class == SQUARE && min_t > 16_260_101 {
        return None;
    } else if class == MONUMENT && min_t > 19_160_101 {
        return None;
    } else if matches!(class, OCCURRENCE | INCIDENT | LEGAL_CASE | EVENT) {
        if item.classes.len() > 1 {
            class = item.classes[1];
            if class == LEGAL_CASE {
                return None;
            }
        } else if class == LEGAL_CASE {
            return None;
        }
    }

    class = geochron_taxonomy::remap(class);

    Some(RowClass {
        class,
        min_t,
        max_t,
        broken: min_t > max_t,
    })
}
