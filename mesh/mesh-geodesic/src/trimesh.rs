//! Full-featured backend: heat-method geodesics and face-marching walks.

use crate::backend::{DistanceSample, MeshBackend, ensure_finite};
use crate::cache::{CacheStats, GeodesicCache};
use crate::distance::{DistanceField, far_distance, is_near, near_distance};
use crate::error::{GeodesicError, GeodesicResult};
use crate::geometry::{Location, SurfaceGeometry, clamp_barycentric, project_vector_to_face};
use crate::heat::HeatOperator;
use crate::locator::ParticleLocator;
use crate::params::SurfaceParams;
use crate::spatial::VertexIndex;
use crate::walk::walk_on_faces;
use mesh_types::IndexedMesh;
use nalgebra::{Matrix3, Point3, Vector3};
use std::sync::{Arc, OnceLock};
use tracing::{info, trace};

/// Triangle-mesh backend with true geodesic distances.
///
/// Distances come from the heat method, solved lazily per source vertex and
/// cached. Walks march straight across faces, unfolding at each edge.
///
/// # Example
///
/// ```
/// use mesh_geodesic::{MeshBackend, SurfaceParams, TriMeshBackend};
/// use mesh_types::grid_plane;
/// use nalgebra::{Point3, Vector3};
///
/// let backend = TriMeshBackend::new(grid_plane(4, 4, 1.0), SurfaceParams::default()).unwrap();
/// let start = Point3::new(0.5, 0.5, 0.0);
/// let end = backend.geodesic_walk(&start, Some(0), &Vector3::new(2.0, 1.0, 0.0)).unwrap();
/// assert!((end - Point3::new(2.5, 1.5, 0.0)).norm() < 1e-9);
/// ```
#[derive(Debug)]
pub struct TriMeshBackend {
    geometry: SurfaceGeometry,
    params: SurfaceParams,
    vertex_index: VertexIndex,
    locator: ParticleLocator,
    cache: GeodesicCache,
    grad_n: Vec<Matrix3<f64>>,
    heat: OnceLock<HeatOperator>,
}

impl TriMeshBackend {
    /// Build the backend for `mesh`.
    ///
    /// The heat operator is assembled on the first distance query, not here.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` are out of range or the mesh is empty,
    /// references missing vertices, or has non-finite positions.
    pub fn new(mesh: IndexedMesh, params: SurfaceParams) -> GeodesicResult<Self> {
        params.validate()?;
        let start = std::time::Instant::now();

        let geometry = SurfaceGeometry::new(mesh)?;
        let vertex_index = VertexIndex::from_mesh(geometry.mesh());
        let grad_n = geometry.vertex_normal_gradients();
        let cache = GeodesicCache::new(params.geodesic_cache_capacity);

        info!(
            vertices = geometry.vertex_count(),
            faces = geometry.face_count(),
            boundary_edges = geometry.adjacency().boundary_edge_count(),
            mean_edge_length = geometry.mean_edge_length(),
            elapsed_ms = start.elapsed().as_millis(),
            "Built triangle mesh backend"
        );

        Ok(Self {
            geometry,
            params,
            vertex_index,
            locator: ParticleLocator::new(),
            cache,
            grad_n,
            heat: OnceLock::new(),
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

    /// Parameters in use.
    #[must_use]
    pub const fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Unit normal of `face`.
    ///
    /// # Panics
    ///
    /// Panics if `face` is out of range.
    #[must_use]
    pub fn face_normal(&self, face: usize) -> Vector3<f64> {
        self.geometry.face_normal(face)
    }

    /// Indices of the `k` vertices nearest `point`, closest first.
    #[must_use]
    pub fn k_nearest_vertices(&self, point: &Point3<f64>, k: usize) -> Vec<usize> {
        self.vertex_index.k_nearest(point, k)
    }

    /// Source vertices whose distance fields are currently cached.
    #[must_use]
    pub fn cached_sources(&self) -> Vec<usize> {
        self.cache.sources()
    }

    /// Geodesic cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of particles with a face hint.
    #[must_use]
    pub fn tracked_particles(&self) -> usize {
        self.locator.len()
    }

    /// Heat-method distance between two vertices.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::InvalidVertex`] if either index is out of range.
    pub fn geodesic_distance_between_vertices(&self, from: usize, to: usize) -> GeodesicResult<f64> {
        let vertex_count = self.geometry.vertex_count();
        if to >= vertex_count {
            return Err(GeodesicError::InvalidVertex {
                index: to,
                vertex_count,
            });
        }
        Ok(self.distance_field(from)?.distance(to))
    }

    /// Distance field from `source`, solved on first use and cached.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::InvalidVertex`] if `source` is out of range.
    pub fn distance_field(&self, source: usize) -> GeodesicResult<Arc<DistanceField>> {
        self.cache.get_or_compute(source, || {
            self.heat_operator()
                .distance_from_vertex(&self.geometry, source)
        })
    }

    fn heat_operator(&self) -> &HeatOperator {
        self.heat
            .get_or_init(|| HeatOperator::build(&self.geometry, &self.params))
    }

    /// Resolve `point` to a face, updating the hint for `idx`.
    ///
    /// Tries the hinted face and its neighbors, then the faces around the
    /// nearest vertices. A point no candidate contains is clamped to the
    /// closest candidate.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::NonFinitePoint`] for NaN or infinite input.
    pub fn locate(&self, point: &Point3<f64>, idx: Option<usize>) -> GeodesicResult<Location> {
        ensure_finite(&point.coords)?;
        let location = self.locate_unchecked(point, idx);
        if let Some(particle) = idx {
            self.locator.record(particle, location.face);
        }
        Ok(location)
    }

    fn containing(&self, face: usize, point: &Point3<f64>) -> Option<Location> {
        let bary = self.geometry.contains(
            face,
            point,
            self.params.barycentric_epsilon,
            self.params.plane_tolerance,
        )?;
        let bary = clamp_barycentric(&bary);
        Some(Location {
            face,
            bary,
            point: self.geometry.triangle(face).point_at(&bary),
        })
    }

    fn locate_unchecked(&self, point: &Point3<f64>, idx: Option<usize>) -> Location {
        let adjacency = self.geometry.adjacency();
        let hint = idx
            .and_then(|particle| self.locator.hint(particle))
            .filter(|&face| face < self.geometry.face_count());

        if let Some(hint) = hint {
            let found = std::iter::once(hint)
                .chain(adjacency.neighbors(hint))
                .find_map(|face| self.containing(face, point));
            if let Some(location) = found {
                return location;
            }
        }

        let mut candidates: Vec<usize> = Vec::new();
        for vertex in self
            .vertex_index
            .k_nearest(point, self.params.locator_neighbors)
        {
            candidates.extend(adjacency.vertex_faces(vertex).iter().map(|&f| f as usize));
        }
        candidates.extend(hint);
        candidates.sort_unstable();
        candidates.dedup();

        // Best containing face by plane offset, else closest clamped point
        let mut best: Option<(bool, f64, Location)> = None;
        for &face in &candidates {
            let (inside, location) = match self.containing(face, point) {
                Some(location) => (true, location),
                None => (false, self.geometry.closest_in_face(face, point)),
            };
            let distance = (location.point - point).norm_squared();
            let better = best.as_ref().is_none_or(|(best_inside, best_distance, _)| {
                (inside && !best_inside) || (inside == *best_inside && distance < *best_distance)
            });
            if better {
                best = Some((inside, distance, location));
            }
        }

        match best {
            Some((true, _, location)) => location,
            Some((false, distance, location)) => {
                trace!(
                    face = location.face,
                    distance = distance.sqrt(),
                    "Clamped point to nearest candidate face"
                );
                location
            }
            None => {
                trace!("No candidate faces; clamping to face 0");
                self.geometry.closest_in_face(0, point)
            }
        }
    }
}

impl MeshBackend for TriMeshBackend {
    fn compute_distance(
        &self,
        a: &Point3<f64>,
        idx_a: Option<usize>,
        b: &Point3<f64>,
        idx_b: Option<usize>,
        want_gradient: bool,
    ) -> GeodesicResult<DistanceSample> {
        let la = self.locate(a, idx_a)?;
        let lb = self.locate(b, idx_b)?;

        let (distance, gradient) = if is_near(&self.geometry, &la, &lb) {
            near_distance(&self.geometry, &la, &lb)
        } else {
            let [v0, v1, v2] = self.geometry.face(la.face);
            let f0 = self.distance_field(v0 as usize)?;
            let f1 = self.distance_field(v1 as usize)?;
            let f2 = self.distance_field(v2 as usize)?;
            far_distance(&self.geometry, &la, &lb, [&f0, &f1, &f2])
        };

        Ok(DistanceSample {
            distance,
            gradient: want_gradient.then_some(gradient),
        })
    }

    fn geodesic_walk(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Point3<f64>> {
        ensure_finite(vector)?;
        let start = self.locate(point, idx)?;
        let outcome = walk_on_faces(&self.geometry, &start, vector, &self.params);
        if let Some(particle) = idx {
            self.locator.record(particle, outcome.face);
        }
        Ok(outcome.point)
    }

    fn project_vector_to_surface_tangent(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
        vector: &Vector3<f64>,
    ) -> GeodesicResult<Vector3<f64>> {
        ensure_finite(vector)?;
        let location = self.locate(point, idx)?;
        Ok(project_vector_to_face(
            &self.geometry.face_normal(location.face),
            vector,
        ))
    }

    fn sample_normal_at_point(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
    ) -> GeodesicResult<Vector3<f64>> {
        let location = self.locate(point, idx)?;
        Ok(self
            .geometry
            .interpolate_normal(location.face, &location.bary))
    }

    fn sample_grad_n_at_point(
        &self,
        point: &Point3<f64>,
        idx: Option<usize>,
    ) -> GeodesicResult<Option<Matrix3<f64>>> {
        let location = self.locate(point, idx)?;
        let tensor = self
            .geometry
            .face(location.face)
            .iter()
            .zip(&location.bary)
            .fold(Matrix3::zeros(), |acc, (&v, &w)| acc + self.grad_n[v as usize] * w);
        Ok(Some(tensor))
    }

    fn snap_to_mesh(&self, point: &Point3<f64>, idx: Option<usize>) -> GeodesicResult<Point3<f64>> {
        Ok(self.locate(point, idx)?.point)
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

    fn invalidate_particle(&self, idx: usize) {
        self.locator.invalidate(idx);
    }

    fn is_geodesics_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "trimesh"
    }
}
