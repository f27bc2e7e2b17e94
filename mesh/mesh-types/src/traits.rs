//! Traits for mesh types.

use crate::{Aabb, Triangle};
use nalgebra::Point3;

/// Read access to positions and index triples.
///
/// Lookups return `None` out of range, so derived quantities can be computed
/// on a mesh before its indices have been validated.
pub trait MeshTopology {
    /// Get the number of vertices.
    fn vertex_count(&self) -> usize;

    /// Get the number of faces (triangles).
    fn face_count(&self) -> usize;

    /// Check if the mesh is empty.
    fn is_empty(&self) -> bool {
        self.vertex_count() == 0 || self.face_count() == 0
    }

    /// Get a vertex position by index.
    ///
    /// Returns `None` if the index is out of bounds.
    fn position(&self, index: usize) -> Option<Point3<f64>>;

    /// Get a face by index as vertex index triple.
    ///
    /// Returns `None` if the index is out of bounds.
    fn face(&self, index: usize) -> Option<[u32; 3]>;

    /// Get a triangle by face index with resolved vertex positions.
    ///
    /// Returns `None` if the face or any of its vertices is out of bounds.
    fn triangle(&self, face_index: usize) -> Option<Triangle> {
        let [i0, i1, i2] = self.face(face_index)?;
        Some(Triangle::new(
            self.position(i0 as usize)?,
            self.position(i1 as usize)?,
            self.position(i2 as usize)?,
        ))
    }
}

/// Trait for types that can compute a bounding box.
pub trait MeshBounds {
    /// Compute the axis-aligned bounding box.
    ///
    /// Returns an empty AABB if the mesh has no vertices.
    fn bounds(&self) -> Aabb;
}
