//! Narrow JSON extraction for one dump record.
//!
//! A record is a deeply nested Wikibase entity; only a fixed handful of
//! dot-paths matter here. Serde schema structs mirror those paths with
//! every field optional, the tokenizer skips everything else, and a
//! single conversion step at the end decides whether the record becomes
//! an [`Item`].

use serde::Deserialize;
use serde::de::IgnoredAny;

use geochron_models::{ClaimFlags, Coord, Item, WikiDate, COORD_SCALE};

/// Parses one record line in place and converts it to an [`Item`].
///
/// Returns `None` for anything that should be dropped: tokenizer
/// failures, non-item entities, unparseable ids, or records failing the
/// admission predicate. All drops are silent; the caller counts them.
#[must_use]
pub fn extract_item(line: &mut [u8]) -> Option<Item> {
    let raw: RawRecord = simd_json::serde::from_slice(line).ok()?;
    raw.into_item()
}

/// One claim under `claims.P<n>[]`; everything below `value` is typed by
/// the property kind.
#[derive(Deserialize)]
struct Claim<T> {
    #[serde(default)]
    mainsnak: Option<Mainsnak<T>>,
}

#[derive(Deserialize)]
struct Mainsnak<T> {
    #[serde(default)]
    datavalue: Option<Datavalue<T>>,
}

#[derive(Deserialize)]
struct Datavalue<T> {
    #[serde(default)]
    value: Option<T>,
}

impl<T> Claim<T> {
    fn into_value(self) -> Option<T> {
        self.mainsnak?.datavalue?.value
    }
}

#[derive(Deserialize, Default)]
struct QidValue {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize, Default)]
struct CoordValue {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

#[derive(Deserialize, Default)]
struct TimeValue {
    #[serde(default)]
    time: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Labels {
    en: Option<Label>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Label {
    value: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Claims {
    #[serde(rename = "P31")]
    instance_of: Vec<Claim<QidValue>>,
    #[serde(rename = "P279")]
    sub_class_of: Vec<Claim<QidValue>>,
    #[serde(rename = "P361")]
    part_of: Vec<Claim<QidValue>>,
    #[serde(rename = "P2670")]
    has_part: Vec<Claim<QidValue>>,
    #[serde(rename = "P664")]
    organizer: Vec<Claim<QidValue>>,
    #[serde(rename = "P541")]
    office: Vec<Claim<QidValue>>,
    #[serde(rename = "P276")]
    location: Vec<Claim<QidValue>>,
    #[serde(rename = "P669")]
    street: Vec<Claim<QidValue>>,
    #[serde(rename = "P131")]
    admin: Vec<Claim<QidValue>>,
    #[serde(rename = "P1001")]
    juri: Vec<Claim<QidValue>>,
    #[serde(rename = "P17")]
    country: Vec<Claim<QidValue>>,

    #[serde(rename = "P641")]
    sport: Option<IgnoredAny>,
    #[serde(rename = "P2094")]
    comp_class: Option<IgnoredAny>,
    #[serde(rename = "P3450")]
    season: Option<IgnoredAny>,
    #[serde(rename = "P1269")]
    facet_of: Option<IgnoredAny>,
    #[serde(rename = "P179")]
    series: Option<IgnoredAny>,
    #[serde(rename = "P1346")]
    winner: Option<IgnoredAny>,
    #[serde(rename = "P3157")]
    dist: Option<IgnoredAny>,
    #[serde(rename = "P360")]
    list_of: Option<IgnoredAny>,
    #[serde(rename = "P159")]
    hq_loc: Option<IgnoredAny>,
    #[serde(rename = "P126")]
    maintainer: Option<IgnoredAny>,
    #[serde(rename = "P1082")]
    population: Option<IgnoredAny>,
    #[serde(rename = "P136")]
    genre: Option<IgnoredAny>,
    #[serde(rename = "P437")]
    format: Option<IgnoredAny>,
    #[serde(rename = "P856")]
    website: Option<IgnoredAny>,
    #[serde(rename = "P973")]
    describe_url: Option<IgnoredAny>,

    #[serde(rename = "P625")]
    coord: Vec<Claim<CoordValue>>,
    #[serde(rename = "P585")]
    date: Vec<Claim<TimeValue>>,
    #[serde(rename = "P580")]
    start: Vec<Claim<TimeValue>>,
    #[serde(rename = "P582")]
    end: Vec<Claim<TimeValue>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
    labels: Option<Labels>,
    claims: Option<Claims>,
}

/// Parses the numeric part of a `Q<digits>` id.
fn parse_qid(s: &str) -> Option<u32> {
    let digits = s.strip_prefix('Q')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// First array element's QID, degrading malformed values to absent.
fn first_qid(claims: Vec<Claim<QidValue>>) -> Option<u32> {
    let value = claims.into_iter().next()?.into_value()?;
    parse_qid(&value.id?)
}

/// First array element's date, degrading malformed values to absent.
fn first_date(claims: Vec<Claim<TimeValue>>) -> Option<WikiDate> {
    let value = claims.into_iter().next()?.into_value()?;
    WikiDate::parse(&value.time?).ok()
}

impl RawRecord {
    fn into_item(self) -> Option<Item> {
        if self.kind.as_deref() != Some("item") {
            return None;
        }
        let id = parse_qid(&self.id?)?;

        let title = self
            .labels
            .and_then(|l| l.en)
            .and_then(|l| l.value)
            .unwrap_or_default();

        let claims = self.claims.unwrap_or_default();

        let mut flags = ClaimFlags::default();
        flags.set(ClaimFlags::SPORT, claims.sport.is_some());
        flags.set(ClaimFlags::COMP_CLASS, claims.comp_class.is_some());
        flags.set(ClaimFlags::SEASON, claims.season.is_some());
        flags.set(ClaimFlags::FACET_OF, claims.facet_of.is_some());
        flags.set(ClaimFlags::SERIES, claims.series.is_some());
        flags.set(ClaimFlags::WINNER, claims.winner.is_some());
        flags.set(ClaimFlags::DIST, claims.dist.is_some());
        flags.set(ClaimFlags::LIST_OF, claims.list_of.is_some());
        flags.set(ClaimFlags::HQ_LOC, claims.hq_loc.is_some());
        flags.set(ClaimFlags::MAINTAINER, claims.maintainer.is_some());
        flags.set(ClaimFlags::POPULATION, claims.population.is_some());
        flags.set(ClaimFlags::GENRE, claims.genre.is_some());
        flags.set(ClaimFlags::FORMAT, claims.format.is_some());
        flags.set(ClaimFlags::WEBSITE, claims.website.is_some());
        flags.set(ClaimFlags::DESCRIBE_URL, claims.describe_url.is_some());

        // Record-order class list; malformed entries degrade to absent.
        let classes = claims
            .instance_of
            .into_iter()
            .filter_map(|c| parse_qid(&c.into_value()?.id?))
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let coord = claims
            .coord
            .into_iter()
            .next()
            .and_then(Claim::into_value)
            .and_then(|v| {
                let (lat, lon) = (v.latitude?, v.longitude?);
                // Truncation toward zero is the on-disk convention for
                // values arriving as JSON doubles.
                Some(Coord {
                    lon_e7: (lon * COORD_SCALE) as i32,
                    lat_e7: (lat * COORD_SCALE) as i32,
                })
            });

        let item = Item {
            id,
            title,
            classes,
            sub_class_of: first_qid(claims.sub_class_of),
            part_of: first_qid(claims.part_of),
            has_part: first_qid(claims.has_part),
            organizer: first_qid(claims.organizer),
            office: first_qid(claims.office),
            location: first_qid(claims.location),
            street: first_qid(claims.street),
            admin: first_qid(claims.admin),
            juri: first_qid(claims.juri),
            country: first_qid(claims.country),
            flags,
            coord,
            date: first_date(claims.date),
            start: first_date(claims.start),
            end: first_date(claims.end),
        };

        item.is_valid().then_some(item)
    }
}
