//! Coordinate math for the spherical web-mercator world space
//!
//! The clustering index works in a normalized world space: the whole map is the
//! unit square `[0, 1] x [0, 1]`, with `x` growing eastward and `y` growing
//! southward (the usual tile-pyramid orientation). A pixel radius at a given
//! zoom level converts to a constant world-space distance, which is what makes
//! the per-level clustering radius well defined.

use geo::Coord;
use smallvec::SmallVec;

/// Logical tile size in pixels used for pixel-to-world conversions
pub const TILE_SIZE: f64 = 256.0;

/// Maximum latitude representable in spherical web mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Convert a longitude in degrees to a world-space x in `[0, 1]`
#[inline(always)]
pub fn lng_to_world_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Convert a latitude in degrees to a world-space y in `[0, 1]`
///
/// Latitudes beyond the web-mercator singularity are clamped, matching what
/// every slippy-map surface does.
#[inline(always)]
pub fn lat_to_world_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin = lat.to_radians().sin();
    let y = 0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * std::f64::consts::PI);
    y.clamp(0.0, 1.0)
}

/// Convert a world-space x back to a longitude in degrees
#[inline(always)]
pub fn world_x_to_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

/// Convert a world-space y back to a latitude in degrees
#[inline(always)]
pub fn world_y_to_lat(y: f64) -> f64 {
    let rad = 2.0 * (std::f64::consts::PI * (1.0 - 2.0 * y)).exp().atan() - std::f64::consts::FRAC_PI_2;
    rad.to_degrees()
}

/// Project a WGS84 position into world space
#[inline(always)]
pub fn project(lat: f64, lng: f64) -> Coord<f64> {
    Coord {
        x: lng_to_world_x(lng),
        y: lat_to_world_y(lat),
    }
}

/// Convert a pixel radius at a discrete zoom level to a world-space distance
#[inline(always)]
pub fn pixel_radius_to_world(radius_px: f64, zoom: u8) -> f64 {
    radius_px / (TILE_SIZE * f64::from(1u32 << u32::from(zoom.min(31))))
}

/// A geographic bounding box in WGS84 degrees
///
/// `west > east` is a valid state and means the box crosses the antimeridian;
/// all containment and world-range logic below is wrap-aware.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    /// Create a bounding box from the four edges
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole mercator-representable world
    pub fn world() -> Self {
        Self::new(-180.0, -MAX_LATITUDE, 180.0, MAX_LATITUDE)
    }

    /// Whether the box crosses the antimeridian
    #[inline]
    pub fn wraps_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitudinal width in degrees, wrap-aware
    #[inline]
    pub fn width(&self) -> f64 {
        if self.wraps_antimeridian() {
            360.0 - (self.west - self.east)
        } else {
            self.east - self.west
        }
    }

    /// Latitudinal height in degrees
    #[inline]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Whether the given position lies inside the box (edges inclusive)
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        if lat < self.south || lat > self.north {
            return false;
        }
        let lng = normalize_lng(lng);
        if self.wraps_antimeridian() {
            lng >= self.west || lng <= self.east
        } else {
            lng >= self.west && lng <= self.east
        }
    }

    /// Return the box grown by `fraction` of its own width/height on each side
    ///
    /// Used to pad viewport queries so markers do not pop right at the screen
    /// edge. Latitude is clamped to the poles; a box that grows past a full
    /// revolution degenerates to the whole world.
    pub fn expanded(&self, fraction: f64) -> Self {
        let dlat = self.height() * fraction;
        let dlng = self.width() * fraction;

        if self.width() + 2.0 * dlng >= 360.0 {
            return Self::new(
                -180.0,
                (self.south - dlat).max(-90.0),
                180.0,
                (self.north + dlat).min(90.0),
            );
        }

        Self {
            west: normalize_lng(self.west - dlng),
            south: (self.south - dlat).max(-90.0),
            east: normalize_lng(self.east + dlng),
            north: (self.north + dlat).min(90.0),
        }
    }

    /// World-space x intervals covered by the box
    ///
    /// One interval in the common case, two when the box wraps.
    pub fn world_x_ranges(&self) -> SmallVec<[(f64, f64); 2]> {
        let mut ranges = SmallVec::new();
        let x_west = lng_to_world_x(self.west);
        let x_east = lng_to_world_x(self.east);
        if self.wraps_antimeridian() {
            ranges.push((x_west, 1.0));
            ranges.push((0.0, x_east));
        } else {
            ranges.push((x_west, x_east));
        }
        ranges
    }

    /// World-space y interval covered by the box (`min_y` is the north edge)
    #[inline]
    pub fn world_y_range(&self) -> (f64, f64) {
        (lat_to_world_y(self.north), lat_to_world_y(self.south))
    }
}

/// Wrap a longitude into `[-180, 180]`
#[inline(always)]
pub fn normalize_lng(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps 180.0 to -180.0; keep the eastern edge representable
    if wrapped == -180.0 && lng >= 180.0 {
        180.0
    } else {
        wrapped
    }
}
