//! Distance fields and point-to-point surface distance.
//!
//! A [`DistanceField`] holds one heat-method solve: the distance from a source
//! vertex to every vertex. Distances between arbitrary surface points blend
//! the fields of the first point's face vertices bilinearly.

use crate::geometry::{Location, SurfaceGeometry, project_vector_to_face};
use nalgebra::Vector3;

/// Per-vertex distance field.
///
/// Stores the computed geodesic distances from one source vertex to all
/// vertices in the mesh.
#[derive(Debug, Clone)]
pub struct DistanceField {
    /// Distance values for each vertex.
    distances: Vec<f64>,
}

impl DistanceField {
    /// Create a distance field from a vector of distances.
    #[must_use]
    pub const fn from_distances(distances: Vec<f64>) -> Self {
        Self { distances }
    }

    /// Get the distance to a vertex.
    ///
    /// Returns `f64::INFINITY` if the index is out of bounds.
    #[inline]
    #[must_use]
    pub fn distance(&self, vertex: usize) -> f64 {
        self.distances.get(vertex).copied().unwrap_or(f64::INFINITY)
    }

    /// Distance at barycentric position `bary` of a face with vertices `face`.
    #[must_use]
    pub fn interpolate(&self, face: [u32; 3], bary: &[f64; 3]) -> f64 {
        face.iter()
            .zip(bary)
            .map(|(&v, &b)| b * self.distance(v as usize))
            .sum()
    }
}

/// Whether two located points are close enough for a straight line.
///
/// True when they share a face or their faces share an edge.
#[must_use]
pub fn is_near(geometry: &SurfaceGeometry, a: &Location, b: &Location) -> bool {
    a.face == b.face || geometry.adjacency().shared_edge(a.face, b.face).is_some()
}

/// Straight-line distance and its tangent gradient at `a`.
///
/// The gradient is the unit direction from `b` to `a` projected into the
/// tangent plane of `a`'s face, or zero when the points coincide.
#[must_use]
pub fn near_distance(geometry: &SurfaceGeometry, a: &Location, b: &Location) -> (f64, Vector3<f64>) {
    let delta = a.point - b.point;
    let distance = delta.norm();
    if distance <= f64::EPSILON {
        return (0.0, Vector3::zeros());
    }
    let tangent = project_vector_to_face(&geometry.face_normal(a.face), &(delta / distance));
    (distance, normalize_or_zero(tangent))
}

/// Bilinear blend `Σᵢ Σⱼ aᵢ bⱼ d(vᵢ, wⱼ)` and its tangent gradient at `a`.
///
/// `fields[i]` is the distance field sourced at vertex `i` of `a`'s face.
/// The gradient is `Σᵢ cᵢ ∇aᵢ` with `cᵢ = Σⱼ bⱼ d(vᵢ, wⱼ)`, normalized to unit
/// length because a distance function has unit gradient.
#[must_use]
pub fn far_distance(
    geometry: &SurfaceGeometry,
    a: &Location,
    b: &Location,
    fields: [&DistanceField; 3],
) -> (f64, Vector3<f64>) {
    let target_face = geometry.face(b.face);
    let to_target: [f64; 3] = fields.map(|f| f.interpolate(target_face, &b.bary));

    let distance = to_target
        .iter()
        .zip(&a.bary)
        .map(|(c, w)| c * w)
        .sum::<f64>()
        .max(0.0);

    let basis = geometry.grad_basis(a.face);
    let gradient = basis[0] * to_target[0] + basis[1] * to_target[1] + basis[2] * to_target[2];

    (distance, normalize_or_zero(gradient))
}

fn normalize_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    let len = v.norm();
    if len > f64::EPSILON { v / len } else { Vector3::zeros() }
}
