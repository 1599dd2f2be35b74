//! Listing point records fed into the clustering index
//!
//! Points arrive from the listing-data layer as a full replacement set. The
//! engine treats them as immutable once indexed and never inspects the display
//! metadata, which travels through unchanged to the point-selected callback.

/// A single geolocated listing
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListingPoint {
    /// Stable identifier assigned by the listing-data layer
    pub id: String,
    /// Latitude in WGS84 degrees
    pub lat: f64,
    /// Longitude in WGS84 degrees
    pub lng: f64,
    /// Opaque display metadata, passed through to selection callbacks
    pub metadata: serde_json::Value,
}

impl ListingPoint {
    /// Create a point with no metadata
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a point carrying display metadata
    pub fn with_metadata(
        id: impl Into<String>,
        lat: f64,
        lng: f64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            metadata,
        }
    }

    /// Whether both coordinates are finite numbers
    ///
    /// Points failing this check are dropped before indexing: never indexed,
    /// never rendered.
    #[inline]
    pub fn has_finite_coordinates(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}
