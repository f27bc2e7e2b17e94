//! Derived surface geometry and the small vector/barycentric helpers built on it.
//!
//! [`SurfaceGeometry`] owns the mesh plus everything computed from it once at
//! backend construction: unit face normals, vertex normals,
//! per-face gradient bases, face adjacency, bounds and mean edge length.

use crate::adjacency::FaceAdjacency;
use crate::error::{GeodesicError, GeodesicResult};
use mesh_types::{Aabb, IndexedMesh, MeshBounds, Triangle};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use rayon::prelude::*;

/// Cosine above which two face normals are treated as coplanar.
const COPLANAR_COS: f64 = 1.0 - 1e-12;

/// A point resolved onto a specific face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Containing face.
    pub face: usize,
    /// Barycentric coordinates within `face`.
    pub bary: [f64; 3],
    /// Position on the surface.
    pub point: Point3<f64>,
}

/// Immutable mesh plus derived per-face and per-vertex quantities.
#[derive(Debug)]
pub struct SurfaceGeometry {
    mesh: IndexedMesh,
    triangles: Vec<Triangle>,
    face_normals: Vec<Vector3<f64>>,
    face_areas: Vec<f64>,
    vertex_normals: Vec<Vector3<f64>>,
    grad_basis: Vec<[Vector3<f64>; 3]>,
    adjacency: FaceAdjacency,
    bounds: Aabb,
    mean_edge_length: f64,
}

impl SurfaceGeometry {
    /// Validate `mesh` and derive its geometry.
    ///
    /// # Errors
    ///
    /// - [`GeodesicError::EmptyMesh`] if there are no vertices or no faces
    /// - [`GeodesicError::InvalidFace`] if a face references a missing vertex
    /// - [`GeodesicError::NonFinitePoint`] if a vertex position is NaN or infinite
    pub fn new(mesh: IndexedMesh) -> GeodesicResult<Self> {
        if mesh.vertices.is_empty() || mesh.faces.is_empty() {
            return Err(GeodesicError::EmptyMesh);
        }

        let vertex_count = mesh.vertices.len();
        for (face, indices) in mesh.faces.iter().enumerate() {
            if let Some(&vertex) = indices.iter().find(|&&v| v as usize >= vertex_count) {
                return Err(GeodesicError::InvalidFace {
                    face,
                    vertex,
                    vertex_count,
                });
            }
        }
        if mesh.vertices.iter().any(|v| !v.is_finite()) {
            return Err(GeodesicError::NonFinitePoint);
        }

        let triangles: Vec<Triangle> = mesh
            .faces
            .iter()
            .map(|&[a, b, c]| {
                Triangle::new(
                    mesh.vertices[a as usize].position,
                    mesh.vertices[b as usize].position,
                    mesh.vertices[c as usize].position,
                )
            })
            .collect();

        let face_normals: Vec<Vector3<f64>> = triangles
            .iter()
            .map(|t| t.normal().unwrap_or_else(Vector3::zeros))
            .collect();
        let face_areas: Vec<f64> = triangles.iter().map(Triangle::area).collect();

        let mut vertex_normals = vec![Vector3::zeros(); vertex_count];
        for (face, triangle) in mesh.faces.iter().zip(&triangles) {
            for (corner, &v) in face.iter().enumerate() {
                vertex_normals[v as usize] += corner_normal_weight(triangle, corner);
            }
        }
        for normal in &mut vertex_normals {
            let len = normal.norm();
            if len > f64::EPSILON {
                *normal /= len;
            }
        }

        let grad_basis = triangles
            .iter()
            .zip(&face_normals)
            .zip(&face_areas)
            .map(|((t, n), &area)| face_gradient_basis(t, n, area))
            .collect();

        let adjacency = FaceAdjacency::from_mesh(&mesh);
        let bounds = mesh.bounds();
        let mean_edge_length = mesh.mean_edge_length();

        Ok(Self {
            mesh,
            triangles,
            face_normals,
            face_areas,
            vertex_normals,
            grad_basis,
            adjacency,
            bounds,
            mean_edge_length,
        })
    }

    /// The underlying mesh.
    #[inline]
    #[must_use]
    pub const fn mesh(&self) -> &IndexedMesh {
        &self.mesh
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.mesh.vertices.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    /// Vertex indices of `face`.
    #[inline]
    #[must_use]
    pub fn face(&self, face: usize) -> [u32; 3] {
        self.mesh.faces[face]
    }

    /// Resolved triangle of `face`.
    #[inline]
    #[must_use]
    pub fn triangle(&self, face: usize) -> &Triangle {
        &self.triangles[face]
    }

    /// Unit normal of `face`; zero for a degenerate face.
    #[inline]
    #[must_use]
    pub fn face_normal(&self, face: usize) -> Vector3<f64> {
        self.face_normals[face]
    }

    /// Area of `face`.
    #[inline]
    #[must_use]
    pub fn face_area(&self, face: usize) -> f64 {
        self.face_areas[face]
    }

    /// Unit normal at `vertex`, from the corner weights of [`corner_normal_weight`].
    #[inline]
    #[must_use]
    pub fn vertex_normal(&self, vertex: usize) -> Vector3<f64> {
        self.vertex_normals[vertex]
    }

    /// Gradients of the three barycentric coordinate functions over `face`.
    #[inline]
    #[must_use]
    pub fn grad_basis(&self, face: usize) -> &[Vector3<f64>; 3] {
        &self.grad_basis[face]
    }

    /// Face adjacency.
    #[inline]
    #[must_use]
    pub const fn adjacency(&self) -> &FaceAdjacency {
        &self.adjacency
    }

    /// Axis-aligned bounds of all vertices.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Mean length over unique edges.
    #[inline]
    #[must_use]
    pub const fn mean_edge_length(&self) -> f64 {
        self.mean_edge_length
    }

    /// Barycentrics of `point` if it lies in `face` within tolerance.
    ///
    /// `plane_tolerance` is relative to the mean edge length.
    #[must_use]
    pub fn contains(
        &self,
        face: usize,
        point: &Point3<f64>,
        epsilon: f64,
        plane_tolerance: f64,
    ) -> Option<[f64; 3]> {
        let tri = &self.triangles[face];
        let bary = tri.barycentric(point)?;
        if !is_barycentric_valid(&bary, epsilon) {
            return None;
        }
        let offset = (point - tri.v0).dot(&self.face_normals[face]).abs();
        (offset <= plane_tolerance * self.mean_edge_length).then_some(bary)
    }

    /// Closest point of `face` to `point`.
    #[must_use]
    pub fn closest_in_face(&self, face: usize, point: &Point3<f64>) -> Location {
        let (point, bary) = self.triangles[face].closest_point(point);
        Location { face, bary, point }
    }

    /// Barycentric blend of the vertex normals of `face`, renormalized.
    ///
    /// Falls back to the face normal where the blend vanishes.
    #[must_use]
    pub fn interpolate_normal(&self, face: usize, bary: &[f64; 3]) -> Vector3<f64> {
        let [a, b, c] = self.mesh.faces[face];
        let blended = self.vertex_normals[a as usize] * bary[0]
            + self.vertex_normals[b as usize] * bary[1]
            + self.vertex_normals[c as usize] * bary[2];
        let len = blended.norm();
        if len > f64::EPSILON {
            blended / len
        } else {
            self.face_normals[face]
        }
    }

    /// Per-vertex gradient of the interpolated normal field.
    ///
    /// For each face the gradient is `Σ nᵢ ⊗ ∇bᵢ`, entry `(r, c)` being
    /// `∂n_r/∂x_c`; each vertex takes the area-weighted mean over its faces.
    #[must_use]
    pub fn vertex_normal_gradients(&self) -> Vec<Matrix3<f64>> {
        let face_tensors: Vec<Matrix3<f64>> = (0..self.face_count())
            .into_par_iter()
            .map(|f| {
                let [a, b, c] = self.mesh.faces[f];
                face_normal_gradient(
                    [
                        &self.vertex_normals[a as usize],
                        &self.vertex_normals[b as usize],
                        &self.vertex_normals[c as usize],
                    ],
                    &self.grad_basis[f],
                )
            })
            .collect();

        (0..self.vertex_count())
            .into_par_iter()
            .map(|v| {
                let mut sum = Matrix3::zeros();
                let mut weight = 0.0;
                for &f in self.adjacency.vertex_faces(v) {
                    let area = self.face_areas[f as usize];
                    sum += face_tensors[f as usize] * area;
                    weight += area;
                }
                if weight > 0.0 { sum / weight } else { sum }
            })
            .collect()
    }
}

/// Whether every coordinate lies in `[-epsilon, 1 + epsilon]`.
///
/// # Example
///
/// ```
/// use mesh_geodesic::is_barycentric_valid;
///
/// assert!(is_barycentric_valid(&[0.2, 0.3, 0.5], 1e-9));
/// assert!(is_barycentric_valid(&[-1e-12, 0.5, 0.5], 1e-9));
/// assert!(!is_barycentric_valid(&[-0.1, 0.6, 0.5], 1e-9));
/// ```
#[must_use]
pub fn is_barycentric_valid(bary: &[f64; 3], epsilon: f64) -> bool {
    bary.iter()
        .all(|&b| b.is_finite() && b >= -epsilon && b <= 1.0 + epsilon)
}

/// Clamp negative coordinates to zero and renormalize to sum one.
#[must_use]
pub fn clamp_barycentric(bary: &[f64; 3]) -> [f64; 3] {
    let clamped = bary.map(|b| if b.is_finite() { b.max(0.0) } else { 0.0 });
    let sum: f64 = clamped.iter().sum();
    if sum > 0.0 {
        clamped.map(|b| b / sum)
    } else {
        [1.0 / 3.0; 3]
    }
}

/// Remove the component of `vector` along the unit `normal`.
#[inline]
#[must_use]
pub fn project_vector_to_face(normal: &Vector3<f64>, vector: &Vector3<f64>) -> Vector3<f64> {
    vector - normal * normal.dot(vector)
}

/// Carry a tangent vector from one face frame to the next.
///
/// Rotates by the dihedral angle about the axis `prev × next`, which for
/// edge-adjacent faces is the shared edge. Returns `None` when the faces fold
/// back onto each other or either normal is degenerate.
#[must_use]
pub fn rotate_vector_to_face(
    prev_normal: &Vector3<f64>,
    next_normal: &Vector3<f64>,
    vector: &Vector3<f64>,
) -> Option<Vector3<f64>> {
    if prev_normal.norm_squared() < 0.5 || next_normal.norm_squared() < 0.5 {
        return None;
    }
    let cos = prev_normal.dot(next_normal);
    let rotated = if cos > COPLANAR_COS {
        *vector
    } else {
        Rotation3::rotation_between(prev_normal, next_normal)? * vector
    };
    Some(project_vector_to_face(next_normal, &rotated))
}

/// First edge crossed when moving in a straight line from `start` to `end`.
///
/// Both arguments are barycentrics in the same face. Returns the local edge
/// index (the coordinate that reaches zero first) and the segment parameter
/// in `[0, 1]`, or `None` if `end` has no negative coordinate.
#[must_use]
pub fn exit_edge(start: &[f64; 3], end: &[f64; 3]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (&s, &e)) in start.iter().zip(end).enumerate() {
        if e >= 0.0 {
            continue;
        }
        let denom = s - e;
        let t = if denom > f64::EPSILON {
            (s / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };
        if best.is_none_or(|(_, bt)| t < bt) {
            best = Some((i, t));
        }
    }
    best
}

/// Barycentrics at parameter `t` on the segment `start → end`, snapped onto `edge`.
#[must_use]
pub fn barycentric_on_edge(start: &[f64; 3], end: &[f64; 3], t: f64, edge: usize) -> [f64; 3] {
    let mut bary: [f64; 3] = std::array::from_fn(|i| (end[i] - start[i]).mul_add(t, start[i]));
    bary[edge] = 0.0;
    clamp_barycentric(&bary)
}

/// Contribution of one face corner to its vertex normal.
///
/// `(e₁ × e₂) / (|e₁|² |e₂|²)` over the two edges leaving the corner
/// (Max, 1999). Summed over a fan and normalized it reproduces the exact
/// normal when the vertex and its neighbors lie on a common sphere. Zero for
/// a collapsed corner.
#[must_use]
pub fn corner_normal_weight(triangle: &Triangle, corner: usize) -> Vector3<f64> {
    let v = triangle.vertices();
    let e1 = v[(corner + 1) % 3] - v[corner];
    let e2 = v[(corner + 2) % 3] - v[corner];
    let scale = e1.norm_squared() * e2.norm_squared();
    if scale <= f64::MIN_POSITIVE {
        return Vector3::zeros();
    }
    e1.cross(&e2) / scale
}

/// Gradients `∇bᵢ = (n × eᵢ) / 2A`, with `eᵢ` the edge opposite vertex `i`.
///
/// Zero for a degenerate face.
#[must_use]
pub fn face_gradient_basis(
    triangle: &Triangle,
    normal: &Vector3<f64>,
    area: f64,
) -> [Vector3<f64>; 3] {
    if area <= f64::EPSILON || normal.norm_squared() < 0.5 {
        return [Vector3::zeros(); 3];
    }
    let v = triangle.vertices();
    let inv = 1.0 / (2.0 * area);
    [
        normal.cross(&(v[2] - v[1])) * inv,
        normal.cross(&(v[0] - v[2])) * inv,
        normal.cross(&(v[1] - v[0])) * inv,
    ]
}

/// Gradient `Σ nᵢ ⊗ ∇bᵢ` of a linearly interpolated normal field over one face.
#[must_use]
pub fn face_normal_gradient(
    normals: [&Vector3<f64>; 3],
    basis: &[Vector3<f64>; 3],
) -> Matrix3<f64> {
    normals
        .iter()
        .zip(basis)
        .fold(Matrix3::zeros(), |acc, (n, g)| acc + *n * g.transpose())
}
