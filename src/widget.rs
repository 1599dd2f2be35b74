//! The listing map widget
//!
//! Top-level owner wiring the index, viewport controller, renderer,
//! fullscreen controller and user-location overlay to one rendering surface.
//! Everything is event-driven: the host forwards the surface's lifecycle and
//! gesture events to the methods below, and selection/expansion results flow
//! back out through the registered callbacks.
//!
//! All work is synchronous and single-threaded. The only deferred state is a
//! pending cluster expansion waiting for its camera transition to settle, and
//! teardown clears it.

use crate::fullscreen::FullscreenController;
use crate::index::{MapConfig, SpatialIndex};
use crate::lifecycle::{LifecycleGuard, LifecycleState};
use crate::point::ListingPoint;
use crate::renderer::MarkerRenderer;
use crate::surface::{MarkerSurface, SurfaceError};
use crate::user_location::UserLocationOverlay;
use crate::utils::GeoBounds;
use crate::viewport::ViewportController;

/// Fired when an individual listing marker is clicked
pub type PointSelectedCallback = Box<dyn FnMut(&str, &serde_json::Value)>;

/// Fired after a cluster-expansion transition settles; observability only
pub type ClusterExpandedCallback = Box<dyn FnMut(u64, f64)>;

/// Interactive map widget plotting a clustered listing set
///
/// Generic over the rendering surface so hosts can plug in whatever map
/// toolkit they use; every surface call is routed through the widget's
/// [`LifecycleGuard`].
pub struct ListingMap<S: MarkerSurface> {
    surface: S,
    guard: LifecycleGuard,
    config: MapConfig,
    index: SpatialIndex,
    viewport: ViewportController,
    renderer: MarkerRenderer<S::Handle>,
    fullscreen: FullscreenController,
    user_location: UserLocationOverlay<S::Handle>,
    on_point_selected: Option<PointSelectedCallback>,
    on_cluster_expanded: Option<ClusterExpandedCallback>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: MarkerSurface> ListingMap<S> {
    /// Attach a widget to a (possibly still constructing) surface
    pub fn new(surface: S, config: MapConfig) -> Self {
        let guard = LifecycleGuard::new();
        guard.begin_initialization();
        Self {
            surface,
            guard,
            index: SpatialIndex::empty(&config),
            viewport: ViewportController::new(config.cluster_zoom_threshold),
            renderer: MarkerRenderer::new(),
            fullscreen: FullscreenController::new(),
            user_location: UserLocationOverlay::new(),
            config,
            on_point_selected: None,
            on_cluster_expanded: None,
        }
    }

    /// Register the individual-marker selection callback
    pub fn set_on_point_selected(&mut self, callback: PointSelectedCallback) {
        self.on_point_selected = Some(callback);
    }

    /// Register the optional cluster-expansion observability callback
    pub fn set_on_cluster_expanded(&mut self, callback: ClusterExpandedCallback) {
        self.on_cluster_expanded = Some(callback);
    }

    /// The surface fired its ready event
    pub fn surface_ready(&mut self) -> Result<(), SurfaceError> {
        self.guard.surface_ready();
        self.user_location.resync(&self.guard, &mut self.surface)?;
        self.refresh()
    }

    /// Replace the listing set; full replacement, never an incremental patch
    ///
    /// The rebuild is synchronous and always runs against the latest set, so
    /// a superseded set is simply replaced rather than queued.
    pub fn set_points(&mut self, points: Vec<ListingPoint>) -> Result<(), SurfaceError> {
        if self.guard.state() == LifecycleState::Destroyed {
            return Ok(());
        }
        self.index = SpatialIndex::build(points, &self.config);
        self.refresh()
    }

    /// The surface settled on a new viewport after a pan/zoom gesture
    ///
    /// The surface's settle cadence is the debounce; this is never called per
    /// animation frame.
    pub fn viewport_changed(&mut self, bounds: GeoBounds, zoom: f64) -> Result<(), SurfaceError> {
        if self.guard.state() == LifecycleState::Destroyed {
            return Ok(());
        }
        self.viewport.viewport_changed(bounds, zoom);
        self.refresh()?;

        if let Some((cluster_id, settled_zoom)) = self.viewport.take_settled_expansion(zoom)
            && let Some(callback) = self.on_cluster_expanded.as_mut()
        {
            callback(cluster_id, settled_zoom);
        }
        Ok(())
    }

    /// A marker was clicked, identified by its diffing key
    ///
    /// Clusters expand by moving the viewport to their expansion zoom; the
    /// subsequent settle re-queries and redraws. Individual listings only
    /// notify the caller and perform no map mutation.
    pub fn marker_clicked(&mut self, key: &str) -> Result<(), SurfaceError> {
        if self.guard.state() == LifecycleState::Destroyed {
            return Ok(());
        }

        if let Some(cluster_id) = key
            .strip_prefix("cluster:")
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            if let Some(camera_move) = self.viewport.expand_cluster(&self.index, cluster_id) {
                let issued = self.guard.guard(&mut self.surface, |s| {
                    s.animate_to(camera_move.lat, camera_move.lng, camera_move.zoom)
                })?;
                if issued.is_none() {
                    // The transition never started, so nothing will settle.
                    self.viewport.clear_pending();
                }
            }
        } else if let Some(point_id) = key.strip_prefix("point:")
            && let Some(point) = self.index.point_by_id(point_id)
            && let Some(callback) = self.on_point_selected.as_mut()
        {
            callback(&point.id, &point.metadata);
        }
        Ok(())
    }

    /// Request fullscreen entry/exit
    pub fn toggle_fullscreen(&mut self) -> Result<(), SurfaceError> {
        self.fullscreen.toggle(&self.guard, &mut self.surface)
    }

    /// The platform confirmed a fullscreen transition
    pub fn fullscreen_changed(&mut self, enabled: bool) -> Result<(), SurfaceError> {
        self.fullscreen
            .fullscreen_changed(&self.guard, &mut self.surface, enabled)
    }

    /// Update or clear the viewer's own position marker
    pub fn set_user_location(&mut self, location: Option<(f64, f64)>) -> Result<(), SurfaceError> {
        self.user_location
            .set(&self.guard, &mut self.surface, location)
    }

    /// Move the camera to frame all loaded listings
    pub fn fit_to_listings(&mut self) -> Result<(), SurfaceError> {
        let Some(bounds) = self.index.bounding_box() else {
            return Ok(());
        };
        let camera_move = self.viewport.fit_bounds(&bounds);
        self.guard.guard(&mut self.surface, |s| {
            s.animate_to(camera_move.lat, camera_move.lng, camera_move.zoom)
        })?;
        Ok(())
    }

    /// Tear the widget down; idempotent
    ///
    /// Order matters: the guard flips first so no further guarded call
    /// executes, then every held marker handle is force-released, then any
    /// deferred work is dropped.
    pub fn destroy(&mut self) {
        self.guard.destroy();
        self.renderer.clear_all(&mut self.surface);
        self.user_location.clear_all(&mut self.surface);
        self.viewport.clear_pending();
    }

    /// Query the current viewport and apply the result to the surface
    fn refresh(&mut self) -> Result<(), SurfaceError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("widget::refresh");

        let Some(viewport) = self.viewport.viewport().copied() else {
            return Ok(());
        };
        let entities = self.index.query(&viewport.bounds, viewport.zoom);
        self.renderer
            .render(&self.guard, &mut self.surface, &entities)?;
        Ok(())
    }

    /// Current lifecycle state
    #[inline]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.guard.state()
    }

    /// Guarded operations suppressed so far; diagnostics only
    #[inline]
    pub fn suppressed_ops(&self) -> u64 {
        self.guard.suppressed_ops()
    }

    /// Whether the platform has confirmed fullscreen presentation
    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_fullscreen()
    }

    /// Number of listing/cluster markers currently placed
    #[inline]
    pub fn rendered_marker_count(&self) -> usize {
        self.renderer.len()
    }

    /// The index over the current listing set
    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Access the wrapped surface
    #[inline]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access to the wrapped surface, for host-side event wiring
    #[inline]
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MapEntity;
    use crate::surface::testing::MockSurface;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn prague_pair_points() -> Vec<ListingPoint> {
        vec![
            ListingPoint::new("a", 50.0, 14.0),
            ListingPoint::new("b", 50.001, 14.001),
            ListingPoint::new("c", 10.0, 10.0),
        ]
    }

    fn ready_widget(points: Vec<ListingPoint>) -> ListingMap<MockSurface> {
        let mut map = ListingMap::new(MockSurface::new(), MapConfig::default());
        map.surface_ready().unwrap();
        map.set_points(points).unwrap();
        map
    }

    #[test]
    fn test_nothing_renders_before_surface_ready() {
        let mut map = ListingMap::new(MockSurface::new(), MapConfig::default());
        map.set_points(prague_pair_points()).unwrap();
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();

        assert_eq!(map.rendered_marker_count(), 0);
        assert!(map.surface().markers.is_empty());
        assert!(map.suppressed_ops() > 0);

        // The ready event triggers the catch-up render of the known viewport.
        map.surface_ready().unwrap();
        assert_eq!(map.rendered_marker_count(), 2);
    }

    #[test]
    fn test_clustered_and_individual_modes() {
        let mut map = ready_widget(prague_pair_points());

        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        assert_eq!(map.rendered_marker_count(), 2); // one cluster + one point

        map.viewport_changed(GeoBounds::world(), 15.0).unwrap();
        assert_eq!(map.rendered_marker_count(), 3); // all individual
        assert!(
            map.surface()
                .marker_keys()
                .iter()
                .all(|key| key.starts_with("point:"))
        );
    }

    #[test]
    fn test_pan_applies_minimal_diff() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 15.0).unwrap();
        let mutations = map.surface().mutation_count;

        // Pan to a viewport that keeps the Czech pair but loses "c".
        map.viewport_changed(GeoBounds::new(13.0, 49.0, 15.0, 51.0), 15.0)
            .unwrap();
        assert_eq!(map.rendered_marker_count(), 2);
        // One removal only; the surviving markers were not touched.
        assert_eq!(map.surface().mutation_count, mutations + 1);
    }

    #[test]
    fn test_cluster_click_expands_and_reports() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();

        let cluster = map
            .index()
            .query(&GeoBounds::world(), 5.0)
            .into_iter()
            .find_map(|e| match e {
                MapEntity::Cluster(node) => Some(node),
                MapEntity::Listing(_) => None,
            })
            .unwrap();

        let expansions: Rc<RefCell<Vec<(u64, f64)>>> = Rc::default();
        let sink = expansions.clone();
        map.set_on_cluster_expanded(Box::new(move |id, zoom| {
            sink.borrow_mut().push((id, zoom));
        }));

        map.marker_clicked(&format!("cluster:{}", cluster.id)).unwrap();
        let (lat, lng, zoom) = *map.surface().camera_moves.last().unwrap();
        assert!((lat - cluster.lat).abs() < 1e-9);
        assert!((lng - cluster.lng).abs() < 1e-9);
        assert_eq!(zoom, f64::from(cluster.expansion_zoom));
        assert!(expansions.borrow().is_empty()); // not settled yet

        // The surface settles on the expansion viewport.
        map.viewport_changed(GeoBounds::new(13.0, 49.0, 15.0, 51.0), zoom)
            .unwrap();
        assert_eq!(*expansions.borrow(), vec![(cluster.id, zoom)]);

        // The old cluster is gone; its members are individually addressable.
        let keys = map.surface().marker_keys();
        assert!(!keys.contains(&format!("cluster:{}", cluster.id)));
        assert!(keys.contains(&"point:a".to_string()));
        assert!(keys.contains(&"point:b".to_string()));
    }

    #[test]
    fn test_point_click_notifies_caller_without_map_mutation() {
        let mut map = ready_widget(vec![ListingPoint::with_metadata(
            "flat-1",
            50.0,
            14.0,
            serde_json::json!({ "title": "Loft" }),
        )]);
        map.viewport_changed(GeoBounds::world(), 15.0).unwrap();

        let selections: Rc<RefCell<Vec<(String, serde_json::Value)>>> = Rc::default();
        let sink = selections.clone();
        map.set_on_point_selected(Box::new(move |id, metadata| {
            sink.borrow_mut().push((id.to_string(), metadata.clone()));
        }));

        let mutations = map.surface().mutation_count;
        map.marker_clicked("point:flat-1").unwrap();

        assert_eq!(map.surface().mutation_count, mutations);
        let recorded = selections.borrow();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "flat-1");
        assert_eq!(recorded[0].1, serde_json::json!({ "title": "Loft" }));
    }

    #[test]
    fn test_click_on_unknown_marker_is_ignored() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        map.marker_clicked("cluster:999999").unwrap();
        map.marker_clicked("point:missing").unwrap();
        map.marker_clicked("garbage").unwrap();
        assert!(map.surface().camera_moves.is_empty());
    }

    #[test]
    fn test_point_set_replacement_rerenders() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 15.0).unwrap();
        assert_eq!(map.rendered_marker_count(), 3);

        map.set_points(vec![ListingPoint::new("z", 20.0, 30.0)]).unwrap();
        assert_eq!(map.rendered_marker_count(), 1);
        assert_eq!(map.surface().marker_keys(), vec!["point:z"]);
    }

    #[test]
    fn test_fullscreen_flow_through_widget() {
        let mut map = ready_widget(Vec::new());
        map.toggle_fullscreen().unwrap();
        assert!(!map.is_fullscreen());
        assert_eq!(map.surface().fullscreen_requests, vec![true]);

        map.fullscreen_changed(true).unwrap();
        assert!(map.is_fullscreen());
        assert_eq!(map.surface().invalidate_count, 1);
    }

    #[test]
    fn test_user_location_independent_of_clustering() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        map.set_user_location(Some((49.0, 13.0))).unwrap();

        assert!(map.surface().marker_keys().contains(&"user-location".to_string()));
        // Listing markers are unaffected by the overlay.
        assert_eq!(map.rendered_marker_count(), 2);

        // A pan re-render leaves the overlay alone.
        let mutations = map.surface().mutation_count;
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        assert_eq!(map.surface().mutation_count, mutations);
        assert!(map.surface().marker_keys().contains(&"user-location".to_string()));
    }

    #[test]
    fn test_fit_to_listings_issues_camera_move() {
        let mut map = ready_widget(prague_pair_points());
        map.fit_to_listings().unwrap();
        assert_eq!(map.surface().camera_moves.len(), 1);

        // Empty index: no move at all.
        let mut empty = ready_widget(Vec::new());
        empty.fit_to_listings().unwrap();
        assert!(empty.surface().camera_moves.is_empty());
    }

    #[test]
    fn test_destroy_releases_everything_and_silences_events() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 15.0).unwrap();
        map.set_user_location(Some((49.0, 13.0))).unwrap();
        assert!(!map.surface().markers.is_empty());

        map.destroy();
        assert_eq!(map.lifecycle_state(), LifecycleState::Destroyed);
        assert!(map.surface().markers.is_empty());
        assert_eq!(map.rendered_marker_count(), 0);

        // Every subsequent event is a no-op with zero surface mutations.
        let mutations = map.surface().mutation_count;
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        map.set_points(prague_pair_points()).unwrap();
        map.marker_clicked("point:a").unwrap();
        map.toggle_fullscreen().unwrap();
        map.set_user_location(Some((1.0, 2.0))).unwrap();
        map.fit_to_listings().unwrap();
        assert_eq!(map.surface().mutation_count, mutations);

        // Destroy is idempotent.
        map.destroy();
    }

    #[test]
    fn test_platform_error_propagates_through_widget() {
        let mut map = ready_widget(prague_pair_points());
        map.surface_mut().fail_next = Some(SurfaceError::Platform("gl context lost".into()));

        let err = map.viewport_changed(GeoBounds::world(), 5.0).unwrap_err();
        assert!(matches!(err, SurfaceError::Platform(_)));
    }

    #[test]
    fn test_suppressed_expansion_clears_pending() {
        let mut map = ready_widget(prague_pair_points());
        map.viewport_changed(GeoBounds::world(), 5.0).unwrap();
        let cluster_key = map
            .surface()
            .marker_keys()
            .into_iter()
            .find(|k| k.starts_with("cluster:"))
            .unwrap();

        // Surface loses its container between the click and the camera call.
        map.surface_mut().operational = false;
        map.marker_clicked(&cluster_key).unwrap();
        map.surface_mut().operational = true;

        let expansions: Rc<RefCell<Vec<(u64, f64)>>> = Rc::default();
        let sink = expansions.clone();
        map.set_on_cluster_expanded(Box::new(move |id, zoom| {
            sink.borrow_mut().push((id, zoom));
        }));

        // A later unrelated settle must not report a phantom expansion.
        map.viewport_changed(GeoBounds::world(), 6.0).unwrap();
        assert!(expansions.borrow().is_empty());
    }
}
