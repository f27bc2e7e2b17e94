//! Parameters for surface-constrained queries.

use crate::error::{GeodesicError, GeodesicResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerances and limits shared by both mesh backends.
///
/// # Example
///
/// ```
/// use mesh_geodesic::SurfaceParams;
///
/// let params = SurfaceParams::default();
/// assert_eq!(params.max_walk_steps, 1000);
/// assert!(params.validate().is_ok());
///
/// let tuned = SurfaceParams::fast().with_cache_capacity(32);
/// assert_eq!(tuned.geodesic_cache_capacity, 32);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceParams {
    /// Slack allowed on each barycentric coordinate before a point is
    /// considered outside a face.
    pub barycentric_epsilon: f64,

    /// Maximum distance from a face plane, relative to the mean edge length,
    /// for the face to be accepted as containing a point.
    pub plane_tolerance: f64,

    /// Number of nearest vertices whose incident faces are searched when the
    /// locator hint misses.
    pub locator_neighbors: usize,

    /// Upper bound on face crossings during one walk.
    pub max_walk_steps: usize,

    /// Remaining displacement below which a walk stops.
    pub walk_epsilon: f64,

    /// Number of per-vertex distance fields kept in the geodesic cache.
    pub geodesic_cache_capacity: usize,

    /// Heat diffusion time as a multiple of the squared mean edge length.
    pub heat_time_factor: f64,

    /// Relative residual at which the conjugate gradient solver stops.
    pub solver_tolerance: f64,

    /// Iteration cap for the conjugate gradient solver.
    pub solver_max_iterations: usize,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            barycentric_epsilon: 1e-6,
            plane_tolerance: 0.5,
            locator_neighbors: 8,
            max_walk_steps: 1000,
            walk_epsilon: 1e-12,
            geodesic_cache_capacity: 256,
            heat_time_factor: 1.0,
            solver_tolerance: 1e-12,
            solver_max_iterations: 2000,
        }
    }
}

impl SurfaceParams {
    /// Tighter solver settings and a wider locator search.
    #[must_use]
    pub const fn high_accuracy() -> Self {
        Self {
            barycentric_epsilon: 1e-9,
            plane_tolerance: 0.5,
            locator_neighbors: 16,
            max_walk_steps: 10_000,
            walk_epsilon: 1e-14,
            geodesic_cache_capacity: 1024,
            heat_time_factor: 1.0,
            solver_tolerance: 1e-13,
            solver_max_iterations: 10_000,
        }
    }

    /// Looser solver settings for interactive use.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            barycentric_epsilon: 1e-5,
            plane_tolerance: 0.5,
            locator_neighbors: 4,
            max_walk_steps: 200,
            walk_epsilon: 1e-10,
            geodesic_cache_capacity: 64,
            heat_time_factor: 1.0,
            solver_tolerance: 1e-9,
            solver_max_iterations: 500,
        }
    }

    /// Set the barycentric slack.
    #[must_use]
    pub const fn with_barycentric_epsilon(mut self, epsilon: f64) -> Self {
        self.barycentric_epsilon = epsilon;
        self
    }

    /// Set the number of vertices searched on a locator miss.
    #[must_use]
    pub const fn with_locator_neighbors(mut self, k: usize) -> Self {
        self.locator_neighbors = k;
        self
    }

    /// Set the face-crossing cap for walks.
    #[must_use]
    pub const fn with_max_walk_steps(mut self, steps: usize) -> Self {
        self.max_walk_steps = steps;
        self
    }

    /// Set the geodesic cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.geodesic_cache_capacity = capacity;
        self
    }

    /// Set the heat diffusion time factor.
    #[must_use]
    pub const fn with_heat_time_factor(mut self, factor: f64) -> Self {
        self.heat_time_factor = factor;
        self
    }

    /// Set the solver tolerance and iteration cap.
    #[must_use]
    pub const fn with_solver(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.solver_tolerance = tolerance;
        self.solver_max_iterations = max_iterations;
        self
    }

    /// Check that every field is in range.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::InvalidParams`] naming the first bad field.
    pub fn validate(&self) -> GeodesicResult<()> {
        let fail = |reason: &str| {
            Err(GeodesicError::InvalidParams {
                reason: reason.to_string(),
            })
        };

        if !(self.barycentric_epsilon.is_finite() && self.barycentric_epsilon >= 0.0) {
            return fail("barycentric_epsilon must be finite and non-negative");
        }
        if !(self.plane_tolerance.is_finite() && self.plane_tolerance > 0.0) {
            return fail("plane_tolerance must be finite and positive");
        }
        if self.locator_neighbors == 0 {
            return fail("locator_neighbors must be at least 1");
        }
        if self.max_walk_steps == 0 {
            return fail("max_walk_steps must be at least 1");
        }
        if !(self.walk_epsilon.is_finite() && self.walk_epsilon >= 0.0) {
            return fail("walk_epsilon must be finite and non-negative");
        }
        if self.geodesic_cache_capacity < 3 {
            return fail("geodesic_cache_capacity must hold at least one face (3 fields)");
        }
        if !(self.heat_time_factor.is_finite() && self.heat_time_factor > 0.0) {
            return fail("heat_time_factor must be finite and positive");
        }
        if !(self.solver_tolerance.is_finite() && self.solver_tolerance > 0.0) {
            return fail("solver_tolerance must be finite and positive");
        }
        if self.solver_max_iterations == 0 {
            return fail("solver_max_iterations must be at least 1");
        }
        Ok(())
    }
}
