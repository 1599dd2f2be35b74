//! Listing Map - Clustered Marker Rendering for Marketplace Maps
//!
//! This library turns a flat set of geolocated listings into the marker set a
//! map widget should actually draw: clusters with count badges at coarse
//! zooms, raw listing pins past the detail threshold, diffed against the
//! previous frame so the surface only sees the minimal set of mutations.
//!
//! # Architecture
//!
//! - **[`SpatialIndex`]**: Grid-bucketed cluster ladder built once per listing set
//! - **[`ViewportController`]**: Owns the settled viewport and plans camera moves
//! - **[`MarkerRenderer`]**: Key-based diffing between query results and placed markers
//! - **[`LifecycleGuard`]**: Suppresses surface calls outside the ready window
//! - **[`ListingMap`]**: The widget wiring all of the above to a [`MarkerSurface`]
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N × Z) for N points over Z zoom levels, projection parallelized
//! - **Query Time**: O(C + K) where C=grid cells covered, K=results
//! - **Memory**: O(N × Z) entries across the ladder, membership shared via `Arc`
//!
//! The engine is UI-toolkit agnostic: hosts implement [`MarkerSurface`] for
//! their map view and forward its lifecycle, gesture and click events to the
//! [`ListingMap`] methods.

mod cluster;
mod fullscreen;
mod index;
mod lifecycle;
mod point;
mod renderer;
mod surface;
mod user_location;
pub mod utils;
mod viewport;
mod widget;

// Public API exports
pub use cluster::ClusterNode;
pub use fullscreen::FullscreenController;
pub use index::{IndexInfo, MapConfig, MapEntity, RenderMode, SpatialIndex};
pub use lifecycle::{LifecycleGuard, LifecycleState};
pub use point::ListingPoint;
pub use renderer::{MarkerRenderer, RenderDiff, RenderedMarker};
pub use surface::{MarkerKind, MarkerSpec, MarkerSurface, SurfaceError};
pub use user_location::UserLocationOverlay;
pub use utils::GeoBounds;
pub use viewport::{CameraMove, Viewport, ViewportController};
pub use widget::{ClusterExpandedCallback, ListingMap, PointSelectedCallback};

pub type Result<T> = std::result::Result<T, SurfaceError>;
