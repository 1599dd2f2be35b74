//! Fullscreen presentation toggling
//!
//! The widget never assumes a fullscreen request succeeded: the flag flips
//! only when the platform confirms through its own change notification. After
//! every confirmed transition the surface is told to recompute its layout;
//! without that, its pixel-to-geo mapping goes stale and every subsequent
//! viewport-changed event carries wrong bounds.

use crate::lifecycle::LifecycleGuard;
use crate::surface::{MarkerSurface, SurfaceError};

/// Toggles the widget between inline and fullscreen presentation
#[derive(Debug, Default)]
pub struct FullscreenController {
    fullscreen: bool,
}

impl FullscreenController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the platform has confirmed fullscreen presentation
    #[inline]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Request entry/exit; the flag flips on confirmation, not here
    pub fn toggle<S>(&self, guard: &LifecycleGuard, surface: &mut S) -> Result<(), SurfaceError>
    where
        S: MarkerSurface,
    {
        let target = !self.fullscreen;
        guard.guard(surface, |s| s.set_fullscreen(target))?;
        Ok(())
    }

    /// The platform confirmed a transition; record it and force a re-layout
    pub fn fullscreen_changed<S>(
        &mut self,
        guard: &LifecycleGuard,
        surface: &mut S,
        enabled: bool,
    ) -> Result<(), SurfaceError>
    where
        S: MarkerSurface,
    {
        self.fullscreen = enabled;
        // Mandatory: the surface's pixel-to-geo mapping is stale after the
        // container resized.
        guard.guard(surface, |s| s.invalidate_size())?;
        tracing::debug!(enabled, "fullscreen transition confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::MockSurface;

    fn ready_guard() -> LifecycleGuard {
        let guard = LifecycleGuard::new();
        guard.begin_initialization();
        guard.surface_ready();
        guard
    }

    #[test]
    fn test_toggle_requests_but_does_not_flip() {
        let guard = ready_guard();
        let mut surface = MockSurface::new();
        let controller = FullscreenController::new();

        controller.toggle(&guard, &mut surface).unwrap();
        assert_eq!(surface.fullscreen_requests, vec![true]);
        assert!(!controller.is_fullscreen());
    }

    #[test]
    fn test_confirmation_flips_and_invalidates() {
        let guard = ready_guard();
        let mut surface = MockSurface::new();
        let mut controller = FullscreenController::new();

        controller
            .fullscreen_changed(&guard, &mut surface, true)
            .unwrap();
        assert!(controller.is_fullscreen());
        assert_eq!(surface.invalidate_count, 1);

        controller
            .fullscreen_changed(&guard, &mut surface, false)
            .unwrap();
        assert!(!controller.is_fullscreen());
        assert_eq!(surface.invalidate_count, 2);
    }

    #[test]
    fn test_full_cycle_requests_exit_after_entry() {
        let guard = ready_guard();
        let mut surface = MockSurface::new();
        let mut controller = FullscreenController::new();

        controller.toggle(&guard, &mut surface).unwrap();
        controller
            .fullscreen_changed(&guard, &mut surface, true)
            .unwrap();
        controller.toggle(&guard, &mut surface).unwrap();

        assert_eq!(surface.fullscreen_requests, vec![true, false]);
    }

    #[test]
    fn test_resize_suppressed_when_not_ready() {
        let guard = LifecycleGuard::new();
        let mut surface = MockSurface::new();
        let mut controller = FullscreenController::new();

        controller
            .fullscreen_changed(&guard, &mut surface, true)
            .unwrap();
        // The flag still tracks the platform's announcement, but no surface
        // call went through.
        assert!(controller.is_fullscreen());
        assert_eq!(surface.invalidate_count, 0);
        assert_eq!(guard.suppressed_ops(), 1);
    }
}
