//! Lifecycle gate for every call into the rendering surface
//!
//! The surface is owned by the host platform and becomes usable (and unusable)
//! asynchronously. Instead of readiness checks scattered through every
//! component, all surface-touching work passes through one explicit state
//! machine: operations attempted outside `Ready` are silently dropped rather
//! than crashing into a half-constructed or torn-down surface.
//!
//! Guard failures are expected races, not bugs, so they are no-ops; a counter
//! of suppressed operations is kept for diagnostics only.

use crate::surface::{MarkerSurface, SurfaceError};
use std::cell::Cell;

/// Readiness of the externally-owned rendering surface
///
/// Monotonic; `Destroyed` is terminal. A fresh widget instance gets a fresh
/// guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

/// The single gate all surface-touching calls must pass through
#[derive(Debug)]
pub struct LifecycleGuard {
    state: Cell<LifecycleState>,
    suppressed: Cell<u64>,
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self {
            state: Cell::new(LifecycleState::Uninitialized),
            suppressed: Cell::new(0),
        }
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Whether guarded operations currently execute
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.get() == LifecycleState::Ready
    }

    /// Operations suppressed so far; diagnostics only, never an error
    #[inline]
    pub fn suppressed_ops(&self) -> u64 {
        self.suppressed.get()
    }

    /// The widget has been attached and the surface began constructing
    pub fn begin_initialization(&self) {
        match self.state.get() {
            LifecycleState::Uninitialized => self.state.set(LifecycleState::Initializing),
            other => tracing::debug!(?other, "ignoring begin_initialization"),
        }
    }

    /// The surface fired its ready event
    pub fn surface_ready(&self) {
        match self.state.get() {
            LifecycleState::Initializing => self.state.set(LifecycleState::Ready),
            other => tracing::debug!(?other, "ignoring surface_ready"),
        }
    }

    /// Component teardown; terminal and idempotent
    pub fn destroy(&self) {
        let prev = self.state.get();
        self.state.set(LifecycleState::Destroyed);
        if prev != LifecycleState::Destroyed {
            tracing::debug!(
                suppressed = self.suppressed.get(),
                "lifecycle guard destroyed"
            );
        }
    }

    /// Run `op` against the surface only when it is safe to do so
    ///
    /// Returns `Ok(None)` without invoking `op` when the state is not `Ready`
    /// or the surface's readiness markers are missing, and when `op` itself
    /// fails with a lifecycle-class error. Platform errors are re-thrown.
    pub fn guard<S, T>(
        &self,
        surface: &mut S,
        op: impl FnOnce(&mut S) -> Result<T, SurfaceError>,
    ) -> Result<Option<T>, SurfaceError>
    where
        S: MarkerSurface + ?Sized,
    {
        if self.state.get() != LifecycleState::Ready || !surface.is_operational() {
            self.suppressed.set(self.suppressed.get() + 1);
            tracing::trace!(state = ?self.state.get(), "suppressed guarded operation");
            return Ok(None);
        }

        match op(surface) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_lifecycle() => {
                self.suppressed.set(self.suppressed.get() + 1);
                tracing::debug!(error = %err, "suppressed lifecycle race");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
