//! Wikidata calendar dates.
//!
//! Wikibase time values carry a signed year (negative for BCE) and allow
//! a zero month/day meaning "unspecified, year precision only". Dates
//! convert to a packed signed 32-bit integer used for the R-tree time
//! bounds, and to a Julian Day Number for interval arithmetic.

use std::fmt;

/// Errors from date parsing, decoding, or calendar conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    /// The textual form could not be parsed.
    #[error("malformed wiki date string")]
    Malformed,

    /// Components violate the date invariants, or a conversion left
    /// the representable range.
    #[error("wiki date out of range")]
    OutOfRange,
}

/// A Wikidata date: signed year, optional month and day.
///
/// Invariants (enforced by [`WikiDate::new`]): `year != 0`,
/// `month <= 12`, `day <= 31`, and a zero month implies a zero day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WikiDate {
    /// Negative for BCE, positive for CE. Zero is invalid.
    pub year: i16,
    /// 0 means unspecified (year precision).
    pub month: u8,
    /// 0 means unspecified.
    pub day: u8,
}

/// Rounds toward zero, the way the astronomical JDN formulas expect.
fn tolong(v: f64) -> f64 {
    if v >= 0.0 { v.floor() } else { v.ceil() }
}

impl WikiDate {
    /// Builds a date, checking the component invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::OutOfRange`] if `year` is zero, `month`
    /// exceeds 12, `day` exceeds 31, or a day is given without a month.
    pub const fn new(year: i16, month: u8, day: u8) -> Result<Self, DateError> {
        let d = Self { year, month, day };
        if d.is_valid() { Ok(d) } else { Err(DateError::OutOfRange) }
    }

    const fn is_valid(self) -> bool {
        self.year != 0 && self.month <= 12 && self.day <= 31 && (self.month != 0 || self.day == 0)
    }

    /// Parses the Wikibase textual form, e.g. `+2020-01-02T00:00:00Z`.
    ///
    /// The leading sign is optional on read; a bare year (`+2020`) is
    /// accepted, but a month must be followed by a day. Trailing time
    /// components after `T` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::Malformed`] for syntax errors and
    /// [`DateError::OutOfRange`] for component violations.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        let s = s.strip_prefix('+').unwrap_or(s);
        let b = s.as_bytes();

        let mut i = usize::from(b.first() == Some(&b'-'));
        let year_end = Self::scan_digits(b, i)?;
        let year: i16 = s[..year_end].parse().map_err(|_| DateError::Malformed)?;
        i = year_end;

        if i == b.len() {
            return Self::new(year, 0, 0);
        }
        if b[i] != b'-' {
            return Err(DateError::Malformed);
        }
        i += 1;

        let month_end = Self::scan_digits(b, i)?;
        let month: u8 = s[i..month_end].parse().map_err(|_| DateError::Malformed)?;
        i = month_end;

        // A month without a day is not a form the dump produces.
        if i == b.len() || b[i] != b'-' {
            return Err(DateError::Malformed);
        }
        i += 1;

        let day_end = Self::scan_digits(b, i)?;
        let day: u8 = s[i..day_end].parse().map_err(|_| DateError::Malformed)?;
        i = day_end;

        if i < b.len() && b[i] != b'T' {
            return Err(DateError::Malformed);
        }

        Self::new(year, month, day)
    }

    /// Returns the end of the digit run starting at `from`, requiring at
    /// least one digit.
    fn scan_digits(b: &[u8], from: usize) -> Result<usize, DateError> {
        let mut i = from;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == from { Err(DateError::Malformed) } else { Ok(i) }
    }

    /// Packs into the signed 32-bit form used for R-tree time bounds.
    ///
    /// CE: `year * 10000 + month * 100 + day`. BCE:
    /// `year * 10000 - (12 - month) * 100 - (31 - day)`, which keeps BCE
    /// values monotonically increasing with chronological order. The two
    /// sign ranges are individually monotone but not continuous across
    /// zero; range queries spanning the boundary must split on the sign.
    #[must_use]
    pub const fn pack(self) -> i32 {
        debug_assert!(self.is_valid());
        let (y, m, d) = (self.year as i32, self.month as i32, self.day as i32);
        if y >= 0 {
            y * 10_000 + m * 100 + d
        } else {
            y * 10_000 - (12 - m) * 100 - (31 - d)
        }
    }

    /// Decodes a packed 32-bit value back into a date.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::OutOfRange`] if the value does not decode to
    /// a valid date (year zero, components out of range, or a year that
    /// does not fit in `i16`).
    pub fn unpack(v: i32) -> Result<Self, DateError> {
        let t = v.abs();
        let year = t / 10_000;
        let rem = t - year * 10_000;
        let month = rem / 100;
        let day = rem - month * 100;

        let (year, month, day) = if v < 0 {
            (-year, 12 - month, 31 - day)
        } else {
            (year, month, day)
        };

        let year = i16::try_from(year).map_err(|_| DateError::OutOfRange)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (month, day) = (month as u8, day as u8);
        Self::new(year, month, day)
    }

    /// Converts to a Julian Day Number.
    ///
    /// Uses the astronomical formula with the Gregorian-calendar
    /// correction for dates on or after 1582-10-15, and validates the
    /// result by converting back: year-precision dates (zero month or
    /// day) therefore fail, as does anything the calendar cannot
    /// represent.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::OutOfRange`] when the date has no exact JDN.
    pub fn to_jdn(self) -> Result<i32, DateError> {
        if !self.is_valid() {
            return Err(DateError::OutOfRange);
        }

        let mut y = if self.year < 0 {
            f64::from(self.year) + 1.0
        } else {
            f64::from(self.year)
        };
        let m = if self.month > 2 {
            f64::from(self.month) + 1.0
        } else {
            y -= 1.0;
            f64::from(self.month) + 13.0
        };

        let mut n = tolong(
            (365.25 * y).floor() + (30.6001 * m).floor() + f64::from(self.day) + 1_720_995.0,
        );

        let gregorian_start = 14 + 31 * (10 + 12 * 1582);
        if i32::from(self.day) + 31 * (i32::from(self.month) + 12 * i32::from(self.year))
            >= gregorian_start
        {
            let a = tolong(0.01 * y);
            n += 2.0 - a + tolong(0.25 * a);
        }

        let back = Self::from_jdn_f64(n)?;
        if back != self {
            return Err(DateError::OutOfRange);
        }
        #[allow(clippy::cast_possible_truncation)]
        let jdn = n as i32;
        Ok(jdn)
    }

    /// Converts a Julian Day Number back to a calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::OutOfRange`] if the resulting year falls
    /// outside `i16` or the components are not a valid date.
    pub fn from_jdn(n: i32) -> Result<Self, DateError> {
        Self::from_jdn_f64(f64::from(n))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_jdn_f64(mut n: f64) -> Result<Self, DateError> {
        if n > 2_299_160.0 {
            let a = tolong(((n - 1_867_216.0) - 0.25) / 36_524.25);
            n += 1.0 + a - tolong(0.25 * a);
        }

        let b = n + 1524.0;
        let c = tolong(6680.0 + ((b - 2_439_870.0) - 122.1) / 365.25);
        let d = tolong(365.0 * c + 0.25 * c);
        let e = tolong((b - d) / 30.6001);

        let mut jy = c - 4715.0;
        let mut jm = e - 1.0;
        let jd = b - d - tolong(30.6001 * e);

        if jm > 12.0 {
            jm -= 12.0;
        }
        if jm > 2.0 {
            jy -= 1.0;
        }
        if jy <= 0.0 {
            jy -= 1.0;
        }

        if jy < f64::from(i16::MIN)
            || jy > f64::from(i16::MAX)
            || !(0.0..=12.0).contains(&jm)
            || !(0.0..=31.0).contains(&jd)
        {
            return Err(DateError::OutOfRange);
        }

        Self::new(jy as i16, jm as u8, jd as u8)
    }
}

impl fmt::Display for WikiDate {
    /// Writes the Wikibase textual form; the `+` sign is mandatory for
    /// CE years on output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.year > 0 { "+" } else { "" };
        write!(
            f,
            "{sign}{}-{}-{}T00:00:00Z",
            self.year, self.month, self.day
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i16, month: u8, day: u8) -> WikiDate {
        WikiDate::new(year, month, day).unwrap()
    }

    #[test]
    fn parses_common_form() {
        assert_eq!(
            WikiDate::parse("+2020-01-02T00:00:00Z").unwrap(),
            date(2020, 1, 2)
        );
    }

    #[test]
    fn parses_bce_and_bare_year() {
        assert_eq!(
            WikiDate::parse("-44-3-15T00:00:00Z").unwrap(),
            date(-44, 3, 15)
        );
        assert_eq!(WikiDate::parse("+1999").unwrap(), date(1999, 0, 0));
    }

    #[test]
    fn rejects_malformed() {
        assert!(WikiDate::parse("").is_err());
        assert!(WikiDate::parse("+0-1-1").is_err());
        assert!(WikiDate::parse("+2020-13-01T00:00:00Z").is_err());
        assert!(WikiDate::parse("+2020-01").is_err()); // month without day
        assert!(WikiDate::parse("+2020-01-02X").is_err());
        assert!(WikiDate::parse("+2000000000-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn rejects_day_without_month() {
        assert!(WikiDate::new(2020, 0, 5).is_err());
    }

    #[test]
    fn display_round_trips() {
        for d in [date(2020, 1, 2), date(-44, 3, 15), date(1999, 0, 0), date(-1, 12, 31)] {
            assert_eq!(WikiDate::parse(&d.to_string()).unwrap(), d);
        }
    }

    #[test]
    fn packs_ce() {
        assert_eq!(date(2020, 1, 2).pack(), 20_200_102);
        assert_eq!(date(1, 1, 1).pack(), 10_101);
    }

    #[test]
    fn packs_bce_monotonically() {
        // Within BCE, chronologically later dates pack to larger values.
        let a = date(-44, 3, 15).pack();
        let b = date(-44, 3, 16).pack();
        let c = date(-43, 1, 1).pack();
        assert!(a < b && b < c);
        assert_eq!(a, -440_916);
    }

    #[test]
    fn pack_round_trips() {
        for d in [
            date(2020, 1, 2),
            date(-44, 3, 15),
            date(1999, 0, 0),
            date(-1999, 0, 0),
            date(1, 1, 1),
            date(-1, 12, 31),
            date(i16::MAX, 12, 31),
            date(i16::MIN, 1, 1),
        ] {
            assert_eq!(WikiDate::unpack(d.pack()).unwrap(), d);
        }
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert!(WikiDate::unpack(0).is_err());
        assert!(WikiDate::unpack(20_201_399).is_err()); // month 13
        assert!(WikiDate::unpack(i32::MAX).is_err()); // year beyond i16
    }

    #[test]
    fn jdn_known_value() {
        assert_eq!(date(2020, 1, 2).to_jdn().unwrap(), 2_458_851);
    }

    #[test]
    fn jdn_round_trips() {
        for d in [date(2020, 1, 2), date(1582, 10, 15), date(1000, 6, 15), date(-44, 3, 15)] {
            let n = d.to_jdn().unwrap();
            assert_eq!(WikiDate::from_jdn(n).unwrap(), d);
        }
    }

    #[test]
    fn jdn_rejects_year_precision() {
        assert!(date(2020, 0, 0).to_jdn().is_err());
    }

    #[test]
    fn jdn_rejects_fictitious_day() {
        // 2020-02-31 does not survive the calendar round trip.
        assert!(date(2020, 2, 31).to_jdn().is_err());
    }
}
