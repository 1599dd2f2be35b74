//! The viewer's own position marker
//!
//! A single special marker, fully independent of the clustering pipeline: it
//! is never indexed, never clustered and never diffed against listing
//! markers. Position updates move the existing marker in place instead of
//! removing and re-adding it, so it does not flicker while the geolocation
//! collaborator streams updates.

use crate::lifecycle::LifecycleGuard;
use crate::surface::{MarkerKind, MarkerSpec, MarkerSurface, SurfaceError};

const USER_LOCATION_KEY: &str = "user-location";

/// Maintains at most one viewer-position marker
pub struct UserLocationOverlay<H> {
    handle: Option<H>,
    position: Option<(f64, f64)>,
}

impl<H> Default for UserLocationOverlay<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> UserLocationOverlay<H> {
    pub fn new() -> Self {
        Self {
            handle: None,
            position: None,
        }
    }

    /// Last position requested by the geolocation collaborator
    #[inline]
    pub fn position(&self) -> Option<(f64, f64)> {
        self.position
    }

    /// Whether the marker is actually placed on the surface
    #[inline]
    pub fn is_rendered(&self) -> bool {
        self.handle.is_some()
    }

    /// Set or clear the viewer's position
    ///
    /// `None` removes the marker. A new position for an existing marker moves
    /// it in place. The requested position is remembered even when the guard
    /// suppresses the surface call, so it can be re-applied once the surface
    /// becomes ready.
    pub fn set<S>(
        &mut self,
        guard: &LifecycleGuard,
        surface: &mut S,
        location: Option<(f64, f64)>,
    ) -> Result<(), SurfaceError>
    where
        S: MarkerSurface<Handle = H>,
    {
        self.position = location;
        match (location, self.handle.as_ref()) {
            (None, Some(handle)) => {
                // The handle is kept on a suppressed remove so a later resync
                // can retry instead of stranding the marker on the surface.
                let removed = guard.guard(surface, |s| s.remove_marker(handle))?;
                if removed.is_some() {
                    self.handle = None;
                }
            }
            (None, None) => {}
            (Some((lat, lng)), Some(handle)) => {
                guard.guard(surface, |s| s.move_marker(handle, lat, lng))?;
            }
            (Some((lat, lng)), None) => {
                let spec = MarkerSpec {
                    key: USER_LOCATION_KEY.to_string(),
                    kind: MarkerKind::UserLocation,
                    lat,
                    lng,
                    label: None,
                };
                self.handle = guard.guard(surface, |s| s.add_marker(&spec))?;
            }
        }
        Ok(())
    }

    /// Re-apply the remembered state, typically after the surface turned ready
    ///
    /// Re-adds a marker whose placement was suppressed and retries a removal
    /// that was suppressed, so the surface converges on the requested state.
    pub fn resync<S>(&mut self, guard: &LifecycleGuard, surface: &mut S) -> Result<(), SurfaceError>
    where
        S: MarkerSurface<Handle = H>,
    {
        match (self.position, self.handle.is_some()) {
            (Some(position), false) => self.set(guard, surface, Some(position)),
            (None, true) => self.set(guard, surface, None),
            _ => Ok(()),
        }
    }

    /// Force-release the marker handle, ignoring lifecycle races; teardown path
    pub fn clear_all<S>(&mut self, surface: &mut S)
    where
        S: MarkerSurface<Handle = H>,
    {
        if let Some(handle) = self.handle.take()
            && let Err(err) = surface.remove_marker(&handle)
        {
            tracing::debug!(error = %err, "user location release failed at teardown");
        }
        self.position = None;
    }
}
