//! Surface-constrained distance and transport queries for particle systems.
//!
//! A particle optimizer keeps its particles on a triangle mesh and asks, per
//! particle per iteration, for surface distances, tangent projections,
//! surface-constrained moves and local normal information. This crate answers
//! those queries through one trait, [`MeshBackend`], with two backends:
//!
//! - [`TriMeshBackend`] - heat-method geodesic distances with gradients,
//!   straight-line walks that unfold across face edges, and normal-gradient
//!   tensors
//! - [`PolyMeshBackend`] - BVH snapping, Euclidean distances and sub-stepped
//!   walks; reports `is_geodesics_enabled() == false`
//!
//! Both share one [`SurfaceParams`] configuration and are `Send + Sync`: a
//! single backend is meant to be shared by reference across worker threads.
//!
//! # Layer 0 Crate
//!
//! No engine or GUI dependencies. It can be used in:
//! - Optimizer drivers
//! - CLI tools
//! - Servers
//! - Python bindings
//!
//! # Algorithm
//!
//! Distances between vertices use the heat method: a short heat diffusion
//! from the source, the normalized negative heat gradient, and a Poisson
//! solve that recovers a distance with that gradient. Each per-source field
//! is solved once with Jacobi-preconditioned conjugate gradients and kept in
//! a bounded LRU cache. Point-to-point distances blend the fields of the
//! first point's face vertices; points on the same or adjacent faces use the
//! straight line.
//!
//! # Example
//!
//! ```
//! use mesh_geodesic::{MeshBackend, SurfaceParams, TriMeshBackend};
//! use mesh_types::icosphere;
//! use nalgebra::Point3;
//!
//! let backend = TriMeshBackend::new(icosphere(3), SurfaceParams::default()).unwrap();
//!
//! let north = Point3::new(0.0, 0.0, 1.0);
//! let south = Point3::new(0.0, 0.0, -1.0);
//! let sample = backend.compute_distance(&north, Some(0), &south, Some(1), true).unwrap();
//!
//! // Half a great circle, well above the chord
//! assert!((sample.distance - std::f64::consts::PI).abs() < 0.15 * std::f64::consts::PI);
//! assert!(sample.gradient.is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod adjacency;
mod backend;
mod bvh;
mod cache;
mod distance;
mod error;
mod geometry;
mod heat;
mod locator;
mod params;
mod polymesh;
mod spatial;
mod trimesh;
mod walk;

pub use adjacency::FaceAdjacency;
pub use backend::{DistanceSample, MeshBackend};
pub use bvh::FaceBvh;
pub use cache::{CacheStats, GeodesicCache};
pub use distance::{DistanceField, far_distance, is_near, near_distance};
pub use error::{GeodesicError, GeodesicResult};
pub use geometry::{
    Location, SurfaceGeometry, barycentric_on_edge, clamp_barycentric, exit_edge,
    is_barycentric_valid, project_vector_to_face, rotate_vector_to_face,
};
pub use heat::{HeatOperator, SolveReport};
pub use locator::ParticleLocator;
pub use params::SurfaceParams;
pub use polymesh::PolyMeshBackend;
pub use spatial::VertexIndex;
pub use trimesh::TriMeshBackend;
pub use walk::{WalkOutcome, WalkTermination, walk_on_faces};

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{grid_plane, unit_icosahedron};
    use nalgebra::{Point3, Vector3};

    fn backends(mesh: &mesh_types::IndexedMesh) -> Vec<Box<dyn MeshBackend>> {
        let params = SurfaceParams::default();
        let tri = TriMeshBackend::new(mesh.clone(), params.clone());
        let poly = PolyMeshBackend::new(mesh.clone(), params);
        match (tri, poly) {
            (Ok(tri), Ok(poly)) => vec![Box::new(tri) as Box<dyn MeshBackend>, Box::new(poly)],
            _ => panic!("backend construction failed"),
        }
    }

    #[test]
    fn backends_share_one_contract() {
        let mesh = grid_plane(4, 4, 1.0);
        for backend in backends(&mesh) {
            let p = Point3::new(1.5, 2.25, 0.0);
            let snapped = backend.snap_to_mesh(&Point3::new(1.5, 2.25, 0.4), None);
            assert!(matches!(snapped, Ok(q) if (q - p).norm() < 1e-12), "{}", backend.name());

            let tangent = backend.project_vector_to_surface_tangent(&p, None, &Vector3::new(1.0, 2.0, 3.0));
            assert!(matches!(tangent, Ok(t) if t.z.abs() < 1e-12), "{}", backend.name());

            let lo = backend.mesh_lower_bound();
            let hi = backend.mesh_upper_bound();
            assert!(lo.x.abs() < 1e-12 && (hi.x - 4.0).abs() < 1e-12);

            let on = backend.point_on_mesh();
            assert!(matches!(backend.snap_to_mesh(&on, None), Ok(q) if (q - on).norm() < 1e-12));

            // Default no-op on the light backend, hint removal on the full one
            backend.invalidate_particle(3);
        }
    }

    #[test]
    fn only_trimesh_has_geodesics() {
        let mesh = unit_icosahedron();
        let enabled: Vec<bool> = backends(&mesh)
            .iter()
            .map(|b| b.is_geodesics_enabled())
            .collect();
        assert_eq!(enabled, vec![true, false]);
    }
}
