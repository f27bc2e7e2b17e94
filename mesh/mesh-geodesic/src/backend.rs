//! The capability contract shared by both mesh backends.

use crate::error::{GeodesicError, GeodesicResult};
use nalgebra::{Matrix3, Point3, Vector3};

/// Distance between two surface points, with an optional gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    /// Surface distance.
    pub distance: f64,
    /// Unit tangent direction of steepest increase at the first point.
    ///
    /// `None` unless requested and supported by the backend.
    pub gradient: Option<Vector3<f64>>,
}

/// Surface queries an optimizer issues per particle per iteration.
///
/// Particle indices are optional; `None` means the query has no particle and
/// never touches the locator table. Every method takes `&self` so one
/// backend can be shared across worker threads.
///
/// Methods taking a point fail only with [`GeodesicError::NonFinitePoint`];
/// points off the surface are clamped to the nearest face.
pub trait MeshBackend: Send + Sync {
    /// Surface distance from `a` to `b`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn compute_distance(
        &self,
        a: &Point3<f64>,
        idx_a: Option<usize>,
        b: &Point3<f64>,
        idx_b: Option<usize>,
        want_gradient: bool,
    ) -> GeodesicResult<DistanceSample>;

    /// Move `point` along the surface by `vector`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn geodesic_walk(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Point3<f64>>;

    /// `vector` with its component along the local face normal removed.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn project_vector_to_surface_tangent(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Vector3<f64>>;

    /// Smoothly interpolated unit normal at `point`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn sample_normal_at_point(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
    ) -> GeodesicResult<Vector3<f64>>;

    /// Gradient of the interpolated normal field at `point`.
    ///
    /// `Ok(None)` when the backend does not support it.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn sample_grad_n_at_point(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
    ) -> GeodesicResult<Option<Matrix3<f64>>>;

    /// Closest point on the surface to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    fn snap_to_mesh(&self, point: &Point3<f64>, idx: Option<usize>)
    -> GeodesicResult<Point3<f64>>;

    /// A fixed point known to lie on the surface.
    fn point_on_mesh(&self) -> Point3<f64>;

    /// Minimum corner of the mesh bounding box.
    fn mesh_lower_bound(&self) -> Point3<f64>;

    /// Maximum corner of the mesh bounding box.
    fn mesh_upper_bound(&self) -> Point3<f64>;

    /// Forget the cached face for `idx`.
    fn invalidate_particle(&self, _idx: usize) {}

    /// Whether distances are true geodesics.
    fn is_geodesics_enabled(&self) -> bool;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Reject NaN or infinite coordinates.
pub(crate) fn ensure_finite(coords: &Vector3<f64>) -> GeodesicResult<()> {
    if coords.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(GeodesicError::NonFinitePoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_check() {
        assert!(ensure_finite(&Vector3::new(1.0, -2.0, 0.0)).is_ok());
        assert!(matches!(
            ensure_finite(&Vector3::new(f64::NAN, 0.0, 0.0)),
            Err(GeodesicError::NonFinitePoint)
        ));
        assert!(ensure_finite(&Vector3::new(0.0, f64::INFINITY, 0.0)).is_err());
    }
}
