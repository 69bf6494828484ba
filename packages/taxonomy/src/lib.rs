#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Class taxonomy lookups for the spatio-temporal filter.
//!
//! Two read-only tables over Wikidata class ids: an ignore set (classes
//! whose instances are never persisted, e.g. sports fixtures, censuses,
//! transport infrastructure) and a remap map folding alias classes into
//! a canonical one (e.g. the hurricane category classes into hurricane).
//! Both are generated data; see [`tables`](self) for provenance.

mod tables;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// A Wikidata class identifier (the numeric part of a `Q` id).
pub type ClassId = u32;

static IGNORED: LazyLock<HashSet<ClassId>> =
    LazyLock::new(|| tables::IGNORED_CLASSES.iter().copied().collect());

static REMAP: LazyLock<HashMap<ClassId, ClassId>> =
    LazyLock::new(|| tables::CLASS_REMAP.iter().copied().collect());

/// Returns `true` if instances of `class` are filtered out of the index.
#[must_use]
pub fn is_ignored(class: ClassId) -> bool {
    IGNORED.contains(&class)
}

/// Returns `true` if any class in `classes` is in the ignore set.
///
/// Short-circuits on the first ignored member.
pub fn any_ignored(classes: impl IntoIterator<Item = ClassId>) -> bool {
    classes.into_iter().any(is_ignored)
}

/// Folds an alias class into its canonical class.
///
/// Identity for every id without a remap entry.
#[must_use]
pub fn remap(class: ClassId) -> ClassId {
    REMAP.get(&class).copied().unwrap_or(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_known_class() {
        // Solar eclipse.
        assert!(is_ignored(3887));
    }

    #[test]
    fn passes_unlisted_class() {
        // Bridge is not in the ignore set.
        assert!(!is_ignored(12518));
    }

    #[test]
    fn any_ignored_finds_member() {
        assert!(any_ignored([12518, 3887]));
        assert!(!any_ignored([12518, 198]));
        assert!(!any_ignored([]));
    }

    #[test]
    fn remaps_alias_class() {
        // Series of wars folds into war.
        assert_eq!(remap(104_212_151), 198);
    }

    #[test]
    fn remap_is_identity_for_unlisted() {
        assert_eq!(remap(198), 198);
        assert_eq!(remap(12518), 12518);
    }

    #[test]
    fn remap_is_idempotent_on_outputs() {
        for &(_, target) in tables::CLASS_REMAP {
            assert_eq!(remap(target), target, "remap target Q{target} is itself remapped");
        }
    }
}
