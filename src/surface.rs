//! The narrow interface to the externally-owned rendering surface
//!
//! The engine never links a map toolkit. Everything it needs from the slippy
//! map underneath (retained markers, camera moves, layout invalidation,
//! fullscreen) is expressed by [`MarkerSurface`], and every call into it is
//! routed through the [`LifecycleGuard`](crate::lifecycle::LifecycleGuard).
//!
//! Errors split into two classes on purpose: lifecycle races (the surface is
//! mid-construction or already torn down) are expected and suppressed by the
//! guard, while genuine platform failures propagate so real bugs stay visible
//! in testing.

/// Errors reported by a rendering surface
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The surface has not finished initializing
    #[error("rendering surface is not ready")]
    NotReady,

    /// The surface's container is no longer attached
    #[error("rendering surface container is detached")]
    Detached,

    /// A marker handle the surface does not recognize
    #[error("unknown marker handle")]
    UnknownMarker,

    /// A genuine platform failure, never suppressed
    #[error("platform error: {0}")]
    Platform(String),
}

impl SurfaceError {
    /// Whether this error belongs to the expected lifecycle-race class
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, SurfaceError::NotReady | SurfaceError::Detached)
    }
}

/// What a marker represents, which decides its visual treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MarkerKind {
    /// A count-labeled aggregate
    Cluster,
    /// A single listing pin
    Listing,
    /// The viewer's own position
    UserLocation,
}

/// Everything the surface needs to place one marker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerSpec {
    /// Diffing key, unique among live markers
    pub key: String,
    pub kind: MarkerKind,
    pub lat: f64,
    pub lng: f64,
    /// Badge text; for clusters this is exactly the aggregated point count
    pub label: Option<String>,
}

/// Operations the engine requires from the rendering surface
///
/// Implementations wrap whatever map toolkit the host application uses. The
/// `Handle` is the only reference the engine ever holds into the surface's
/// object graph, and the engine releases every handle it takes.
pub trait MarkerSurface {
    /// Surface-native reference to a placed marker
    type Handle;

    /// Whether the surface's internal readiness markers are present
    /// (container attached, position caches populated)
    fn is_operational(&self) -> bool;

    /// Place a marker and return its handle
    fn add_marker(&mut self, spec: &MarkerSpec) -> Result<Self::Handle, SurfaceError>;

    /// Remove a previously placed marker
    fn remove_marker(&mut self, handle: &Self::Handle) -> Result<(), SurfaceError>;

    /// Move a placed marker without removing and re-adding it
    fn move_marker(&mut self, handle: &Self::Handle, lat: f64, lng: f64)
    -> Result<(), SurfaceError>;

    /// Animate the camera to a position and zoom; the surface fires a
    /// viewport-changed event once the transition settles
    fn animate_to(&mut self, lat: f64, lng: f64, zoom: f64) -> Result<(), SurfaceError>;

    /// Force a re-layout so the pixel-to-geo mapping is recomputed
    fn invalidate_size(&mut self) -> Result<(), SurfaceError>;

    /// Request the platform's fullscreen entry/exit; the surface fires a
    /// fullscreen-changed event once the platform confirms
    fn set_fullscreen(&mut self, enabled: bool) -> Result<(), SurfaceError>;
}
