//! Viewport ownership and camera decisions
//!
//! The controller owns the current (bounds, zoom) pair. It is fed by the
//! surface's settle events only: the surface's own event cadence is the
//! debounce, so no timer lives here. Cluster expansion never touches the
//! marker set directly: it produces a camera move, and the subsequent settle
//! re-queries and redraws through the normal diff cycle.

use crate::cluster::ClusterNode;
use crate::index::{RenderMode, SpatialIndex};
use crate::utils::GeoBounds;

/// The currently visible geographic box plus zoom
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    pub bounds: GeoBounds,
    pub zoom: f64,
}

/// An animated camera transition the widget issues through the guard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMove {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

/// A cluster expansion waiting for its transition to settle
#[derive(Debug, Clone, Copy)]
struct PendingExpansion {
    cluster_id: u64,
}

/// Owns the viewport and decides render mode and camera moves
pub struct ViewportController {
    viewport: Option<Viewport>,
    cluster_zoom_threshold: f64,
    pending_expansion: Option<PendingExpansion>,
}

impl ViewportController {
    pub fn new(cluster_zoom_threshold: f64) -> Self {
        Self {
            viewport: None,
            cluster_zoom_threshold,
            pending_expansion: None,
        }
    }

    /// Record a settled viewport and decide the render mode for it
    pub fn viewport_changed(&mut self, bounds: GeoBounds, zoom: f64) -> RenderMode {
        self.viewport = Some(Viewport { bounds, zoom });
        RenderMode::for_zoom(zoom, self.cluster_zoom_threshold)
    }

    /// The most recent settled viewport, if any
    #[inline]
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    /// Render mode for the current viewport, if one is known
    pub fn render_mode(&self) -> Option<RenderMode> {
        self.viewport
            .map(|vp| RenderMode::for_zoom(vp.zoom, self.cluster_zoom_threshold))
    }

    /// Plan the camera move that reveals a cluster's members
    ///
    /// Returns `None` for an unknown cluster id. The expansion is recorded as
    /// pending; the widget reports it once the resulting transition settles.
    pub fn expand_cluster(&mut self, index: &SpatialIndex, cluster_id: u64) -> Option<CameraMove> {
        let node: ClusterNode = index.cluster(cluster_id)?;
        self.pending_expansion = Some(PendingExpansion { cluster_id });
        tracing::debug!(
            cluster_id,
            expansion_zoom = node.expansion_zoom,
            "expanding cluster"
        );
        Some(CameraMove {
            lat: node.lat,
            lng: node.lng,
            zoom: f64::from(node.expansion_zoom),
        })
    }

    /// Drain the pending expansion after its transition settled
    ///
    /// Returns `(cluster_id, settled_zoom)` for the observability callback.
    pub fn take_settled_expansion(&mut self, settled_zoom: f64) -> Option<(u64, f64)> {
        self.pending_expansion
            .take()
            .map(|pending| (pending.cluster_id, settled_zoom))
    }

    /// Drop any deferred work; teardown path
    pub fn clear_pending(&mut self) {
        self.pending_expansion = None;
    }

    /// Camera move that frames the given bounds
    ///
    /// Explicit fit capability on the controller, replacing any global
    /// fit-bounds callback.
    pub fn fit_bounds(&self, bounds: &GeoBounds) -> CameraMove {
        let center_lat = (bounds.south + bounds.north) / 2.0;
        let center_lng = if bounds.wraps_antimeridian() {
            crate::utils::normalize_lng(bounds.west + bounds.width() / 2.0)
        } else {
            (bounds.west + bounds.east) / 2.0
        };

        let max_span = bounds.height().max(bounds.width());
        let zoom = if max_span > 0.0 {
            let zoom_estimate = (4.0 * 360.0 / max_span).log2();
            (zoom_estimate - 0.5).clamp(1.0, 18.0)
        } else {
            12.0
        };

        CameraMove {
            lat: center_lat,
            lng: center_lng,
            zoom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MapConfig, MapEntity, SpatialIndex};
    use crate::point::ListingPoint;

    #[test]
    fn test_viewport_stored_and_mode_decided() {
        let mut controller = ViewportController::new(10.0);
        assert!(controller.viewport().is_none());
        assert!(controller.render_mode().is_none());

        let mode = controller.viewport_changed(GeoBounds::world(), 7.0);
        assert_eq!(mode, RenderMode::Clustered);
        assert_eq!(controller.viewport().unwrap().zoom, 7.0);

        let mode = controller.viewport_changed(GeoBounds::world(), 10.5);
        assert_eq!(mode, RenderMode::Individual);
    }

    #[test]
    fn test_threshold_is_inclusive_on_clustered_side() {
        let mut controller = ViewportController::new(10.0);
        assert_eq!(
            controller.viewport_changed(GeoBounds::world(), 10.0),
            RenderMode::Clustered
        );
    }

    #[test]
    fn test_expand_cluster_plans_move_and_records_pending() {
        let points = vec![
            ListingPoint::new("a", 50.0, 14.0),
            ListingPoint::new("b", 50.001, 14.001),
        ];
        let index = SpatialIndex::build(points, &MapConfig::default());
        let cluster = index
            .query(&GeoBounds::world(), 5.0)
            .into_iter()
            .find_map(|e| match e {
                MapEntity::Cluster(node) => Some(node),
                MapEntity::Listing(_) => None,
            })
            .unwrap();

        let mut controller = ViewportController::new(10.0);
        let camera_move = controller.expand_cluster(&index, cluster.id).unwrap();
        assert_eq!(camera_move.zoom, f64::from(cluster.expansion_zoom));
        assert!((camera_move.lat - cluster.lat).abs() < 1e-12);

        let (id, zoom) = controller.take_settled_expansion(camera_move.zoom).unwrap();
        assert_eq!(id, cluster.id);
        assert_eq!(zoom, camera_move.zoom);
        // Drained exactly once.
        assert!(controller.take_settled_expansion(camera_move.zoom).is_none());
    }

    #[test]
    fn test_expand_unknown_cluster_is_none() {
        let index = SpatialIndex::empty(&MapConfig::default());
        let mut controller = ViewportController::new(10.0);
        assert!(controller.expand_cluster(&index, 12345).is_none());
        assert!(controller.take_settled_expansion(8.0).is_none());
    }

    #[test]
    fn test_clear_pending() {
        let points = vec![
            ListingPoint::new("a", 50.0, 14.0),
            ListingPoint::new("b", 50.001, 14.001),
        ];
        let index = SpatialIndex::build(points, &MapConfig::default());
        let cluster_id = index
            .query(&GeoBounds::world(), 5.0)
            .iter()
            .find_map(|e| match e {
                MapEntity::Cluster(node) => Some(node.id),
                MapEntity::Listing(_) => None,
            })
            .unwrap();

        let mut controller = ViewportController::new(10.0);
        controller.expand_cluster(&index, cluster_id).unwrap();
        controller.clear_pending();
        assert!(controller.take_settled_expansion(16.0).is_none());
    }

    #[test]
    fn test_fit_bounds_centers_and_zooms() {
        let controller = ViewportController::new(10.0);
        let camera_move = controller.fit_bounds(&GeoBounds::new(14.0, 49.5, 15.0, 50.5));

        assert!((camera_move.lat - 50.0).abs() < 1e-9);
        assert!((camera_move.lng - 14.5).abs() < 1e-9);
        assert!(camera_move.zoom > 1.0 && camera_move.zoom < 18.0);

        // A tighter box zooms in further.
        let closer = controller.fit_bounds(&GeoBounds::new(14.4, 49.9, 14.6, 50.1));
        assert!(closer.zoom > camera_move.zoom);
    }

    #[test]
    fn test_fit_bounds_degenerate_box() {
        let controller = ViewportController::new(10.0);
        let camera_move = controller.fit_bounds(&GeoBounds::new(14.0, 50.0, 14.0, 50.0));
        assert_eq!(camera_move.zoom, 12.0);
    }
}
