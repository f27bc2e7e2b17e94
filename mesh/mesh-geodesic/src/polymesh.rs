//! Lightweight backend: BVH snapping and Euclidean distances.

use crate::backend::{DistanceSample, MeshBackend, ensure_finite};
use crate::bvh::FaceBvh;
use crate::error::GeodesicResult;
use crate::geometry::{Location, SurfaceGeometry, project_vector_to_face, rotate_vector_to_face};
use crate::params::SurfaceParams;
use mesh_types::IndexedMesh;
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{info, trace};

/// Polygon-mesh backend without geodesic distances.
///
/// Every query snaps through a face BVH. Distances are straight-line and
/// carry no gradient; walks advance in short tangent sub-steps, snapping
/// back to the surface after each one.
#[derive(Debug)]
pub struct PolyMeshBackend {
    geometry: SurfaceGeometry,
    params: SurfaceParams,
    bvh: FaceBvh,
}

impl PolyMeshBackend {
    /// Build the backend for `mesh`.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` are out of range or the mesh is empty,
    /// references missing vertices, or has non-finite positions.
    pub fn new(mesh: IndexedMesh, params: SurfaceParams) -> GeodesicResult<Self> {
        params.validate()?;
        let start = std::time::Instant::now();

        let geometry = SurfaceGeometry::new(mesh)?;
        let bvh = FaceBvh::build(&geometry);

        info!(
            vertices = geometry.vertex_count(),
            faces = geometry.face_count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Built polygon mesh backend"
        );

        Ok(Self {
            geometry,
            params,
            bvh,
        })
    }

    /// The mesh this backend was built from.
    #[must_use]
    pub const fn mesh(&self) -> &IndexedMesh {
        self.geometry.mesh()
    }

    /// Derived geometry.
    #[must_use]
    pub const fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    /// Closest surface location to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`](crate::GeodesicError::NonFinitePoint)
    /// for NaN or infinite input.
    pub fn locate(&self, point: &Point3<f64>) -> GeodesicResult<Location> {
        ensure_finite(&point.coords)?;
        Ok(self.snap(point))
    }

    fn snap(&self, point: &Point3<f64>) -> Location {
        self.bvh
            .nearest(&self.geometry, point)
            .unwrap_or_else(|| self.geometry.closest_in_face(0, point))
    }
}

impl MeshBackend for PolyMeshBackend {
    fn compute_distance(
        &self,
        a: &Point3<f64>,
        _idx_a: Option<usize>,
        b: &Point3<f64>,
        _idx_b: Option<usize>,
        _want_gradient: bool,
    ) -> GeodesicResult<DistanceSample> {
        let la = self.locate(a)?;
        let lb = self.locate(b)?;
        Ok(DistanceSample {
            distance: (la.point - lb.point).norm(),
            gradient: None,
        })
    }

    fn geodesic_walk(
        &self,
        point: &Point3<f64>,
        _idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Point3<f64>> {
        ensure_finite(vector)?;
        let mut here = self.locate(point)?;
        let mut remaining = project_vector_to_face(&self.geometry.face_normal(here.face), vector);
        let max_step = 0.5 * self.geometry.mean_edge_length();

        let mut steps = 0;
        while remaining.norm() > self.params.walk_epsilon {
            if steps == self.params.max_walk_steps {
                trace!(steps, "Sub-stepped walk hit the step limit");
                break;
            }
            steps += 1;

            let length = remaining.norm();
            let step = if length > max_step {
                remaining * (max_step / length)
            } else {
                remaining
            };
            let next = self.snap(&(here.point + step));

            let Some(rest) = rotate_vector_to_face(
                &self.geometry.face_normal(here.face),
                &self.geometry.face_normal(next.face),
                &(remaining - step),
            ) else {
                trace!(from = here.face, to = next.face, "Sub-stepped walk stopped at a fold");
                here = next;
                break;
            };
            remaining = project_vector_to_face(&self.geometry.face_normal(next.face), &rest);
            here = next;
        }

        Ok(here.point)
    }

    fn project_vector_to_surface_tangent(
        &self,
        point: &Point3<f64>,
        _idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Vector3<f64>> {
        ensure_finite(vector)?;
        let location = self.locate(point)?;
        Ok(project_vector_to_face(
            &self.geometry.face_normal(location.face),
            vector,
        ))
    }

    fn sample_normal_at_point(
        &self,
        point: &Point3<f64>,
        _idx: Option<usize>,
    ) -> GeodesicResult<Vector3<f64>> {
        let location = self.locate(point)?;
        Ok(self
            .geometry
            .interpolate_normal(location.face, &location.bary))
    }

    fn sample_grad_n_at_point(
        &self,
        point: &Point3<f64>,
        _idx: Option<usize>,
    ) -> GeodesicResult<Option<Matrix3<f64>>> {
        ensure_finite(&point.coords)?;
        Ok(None)
    }

    fn snap_to_mesh(&self, point: &Point3<f64>, _idx: Option<usize>) -> GeodesicResult<Point3<f64>> {
        Ok(self.locate(point)?.point)
    }

    fn point_on_mesh(&self) -> Point3<f64> {
        self.geometry.triangle(0).centroid()
    }

    fn mesh_lower_bound(&self) -> Point3<f64> {
        self.geometry.bounds().min
    }

    fn mesh_upper_bound(&self) -> Point3<f64> {
        self.geometry.bounds().max
    }

    fn is_geodesics_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "polymesh"
    }
}
