//! Diff-based marker rendering
//!
//! The renderer owns the only map of surface marker handles in the engine.
//! Each render call diffs the new query result against the currently placed
//! set by key: stale markers are removed, shared keys are left untouched (no
//! flicker, handle identity preserved), new keys are added. A handle is always
//! released through the surface before its bookkeeping entry is discarded.

use crate::index::MapEntity;
use crate::lifecycle::LifecycleGuard;
use crate::surface::{MarkerKind, MarkerSpec, MarkerSurface, SurfaceError};
use std::collections::{HashMap, HashSet};

/// A marker currently placed on the surface
#[derive(Debug)]
pub struct RenderedMarker<H> {
    pub key: String,
    pub kind: MarkerKind,
    pub lat: f64,
    pub lng: f64,
    handle: H,
}

/// What one render call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderDiff {
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
}

/// Translates query results into surface markers, instance-scoped
pub struct MarkerRenderer<H> {
    markers: HashMap<String, RenderedMarker<H>>,
}

impl<H> Default for MarkerRenderer<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<H> MarkerRenderer<H> {
    pub fn new() -> Self {
        Self {
            markers: HashMap::new(),
        }
    }

    /// Apply a query result to the surface
    ///
    /// Guard-suppressed additions leave no bookkeeping entry behind, so the
    /// held map always mirrors what is actually on the surface.
    pub fn render<S>(
        &mut self,
        guard: &LifecycleGuard,
        surface: &mut S,
        entities: &[MapEntity],
    ) -> Result<RenderDiff, SurfaceError>
    where
        S: MarkerSurface<Handle = H>,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("renderer::render");

        let new_keys: HashSet<String> = entities.iter().map(MapEntity::key).collect();
        let mut diff = RenderDiff::default();

        // Remove markers absent from the new result. An entry is only dropped
        // once the surface actually released the handle; a suppressed remove
        // keeps the entry so the next render retries it instead of stranding
        // the marker on the surface.
        let stale: Vec<String> = self
            .markers
            .keys()
            .filter(|key| !new_keys.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            let Some(marker) = self.markers.get(&key) else {
                continue;
            };
            let released = guard.guard(surface, |s| s.remove_marker(&marker.handle))?;
            if released.is_some() {
                self.markers.remove(&key);
                diff.removed += 1;
            }
        }

        // Add markers new to the result; shared keys stay untouched.
        for entity in entities {
            let key = entity.key();
            if self.markers.contains_key(&key) {
                diff.retained += 1;
                continue;
            }
            let spec = marker_spec(&key, entity);
            if let Some(handle) = guard.guard(surface, |s| s.add_marker(&spec))? {
                self.markers.insert(
                    key.clone(),
                    RenderedMarker {
                        key,
                        kind: spec.kind,
                        lat: spec.lat,
                        lng: spec.lng,
                        handle,
                    },
                );
                diff.added += 1;
            }
        }

        tracing::trace!(
            added = diff.added,
            removed = diff.removed,
            retained = diff.retained,
            "applied marker diff"
        );
        Ok(diff)
    }

    /// Force-release every held handle, ignoring lifecycle races
    ///
    /// Teardown path: the guard is already `Destroyed` by the time this runs,
    /// so removal is attempted directly and best-effort.
    pub fn clear_all<S>(&mut self, surface: &mut S)
    where
        S: MarkerSurface<Handle = H>,
    {
        let count = self.markers.len();
        for (_, marker) in self.markers.drain() {
            if let Err(err) = surface.remove_marker(&marker.handle) {
                tracing::debug!(key = %marker.key, error = %err, "marker release failed at teardown");
            }
        }
        if count > 0 {
            tracing::debug!(count, "released all marker handles");
        }
    }

    /// Kind of the marker rendered under `key`, if any
    pub fn kind_of(&self, key: &str) -> Option<MarkerKind> {
        self.markers.get(key).map(|m| m.kind)
    }

    /// Number of markers currently placed
    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Sorted keys of the currently placed markers
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.markers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Build the surface spec for one query result item
///
/// The cluster badge carries exactly the aggregated point count.
fn marker_spec(key: &str, entity: &MapEntity) -> MarkerSpec {
    let (lat, lng) = entity.position();
    match entity {
        MapEntity::Cluster(node) => MarkerSpec {
            key: key.to_string(),
            kind: MarkerKind::Cluster,
            lat,
            lng,
            label: Some(node.point_count.to_string()),
        },
        MapEntity::Listing(_) => MarkerSpec {
            key: key.to_string(),
            kind: MarkerKind::Listing,
            lat,
            lng,
            label: None,
        },
    }
}
