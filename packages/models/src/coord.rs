//! Fixed-point geographic coordinates.

/// Scale between floating-point degrees and the stored fixed-point form.
pub const COORD_SCALE: f64 = 1e7;

/// A WGS84 point stored as degrees times 10^7.
///
/// The scale is a fixed invariant of the on-disk format; conversion from
/// floating-point degrees is exact to within ±5e-8 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    /// Longitude in 1e-7 degrees.
    pub lon_e7: i32,
    /// Latitude in 1e-7 degrees.
    pub lat_e7: i32,
}

impl Coord {
    /// Converts from floating-point degrees, rounding to the nearest
    /// representable point so that [`Coord::lon_degrees`] /
    /// [`Coord::lat_degrees`] round-trip exactly.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon_e7: (lon * COORD_SCALE).round() as i32,
            lat_e7: (lat * COORD_SCALE).round() as i32,
        }
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon_degrees(self) -> f64 {
        f64::from(self.lon_e7) / COORD_SCALE
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn lat_degrees(self) -> f64 {
        f64::from(self.lat_e7) / COORD_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_degrees() {
        let c = Coord::from_degrees(2.0, 1.0);
        assert_eq!(c, Coord { lon_e7: 20_000_000, lat_e7: 10_000_000 });
    }

    #[test]
    fn degrees_round_trip() {
        for (lon, lat) in [
            (-123_456_789, 89_999_999),
            (855_878_559, -696_667_421),
            (1_800_000_000, -900_000_000),
            (0, 1),
        ] {
            let c = Coord { lon_e7: lon, lat_e7: lat };
            let back = Coord::from_degrees(c.lon_degrees(), c.lat_degrees());
            assert_eq!(back, c);
        }
    }
}
