//! Face-to-face and vertex-to-face adjacency.
//!
//! Edge `i` of a face is the edge opposite its vertex `i`, i.e. the edge
//! running from `face[(i + 1) % 3]` to `face[(i + 2) % 3]`. This matches the
//! barycentric coordinate that reaches zero when a point crosses that edge.

use hashbrown::HashMap;
use mesh_types::IndexedMesh;
use smallvec::SmallVec;

/// Neighbor lookup for the faces of a triangle mesh.
///
/// Built once from an immutable mesh. Boundary edges (and the surplus faces
/// around a non-manifold edge) have no neighbor.
#[derive(Debug, Clone)]
pub struct FaceAdjacency {
    /// For each face, the face across each of its three edges.
    neighbors: Vec<[Option<u32>; 3]>,
    /// For each vertex, the faces that reference it.
    vertex_faces: Vec<SmallVec<[u32; 8]>>,
}

impl FaceAdjacency {
    /// Build adjacency from a mesh.
    ///
    /// Face indices must already be validated against the vertex count.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: face indices are u32 like vertex indices
    pub fn from_mesh(mesh: &IndexedMesh) -> Self {
        let mut vertex_faces: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); mesh.vertices.len()];
        let mut neighbors = vec![[None; 3]; mesh.faces.len()];
        let mut open_edges: HashMap<(u32, u32), (u32, usize)> =
            HashMap::with_capacity(mesh.faces.len() * 3 / 2);

        for (f, face) in mesh.faces.iter().enumerate() {
            let f = f as u32;
            for &v in face {
                if let Some(list) = vertex_faces.get_mut(v as usize) {
                    list.push(f);
                }
            }

            for edge in 0..3 {
                let a = face[(edge + 1) % 3];
                let b = face[(edge + 2) % 3];
                let key = if a < b { (a, b) } else { (b, a) };

                match open_edges.remove(&key) {
                    Some((other, other_edge)) => {
                        neighbors[f as usize][edge] = Some(other);
                        neighbors[other as usize][other_edge] = Some(f);
                    }
                    None => {
                        open_edges.insert(key, (f, edge));
                    }
                }
            }
        }

        Self {
            neighbors,
            vertex_faces,
        }
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Face across edge `edge` (0..3) of `face`, if any.
    #[inline]
    #[must_use]
    pub fn neighbor(&self, face: usize, edge: usize) -> Option<usize> {
        self.neighbors
            .get(face)
            .and_then(|n| n.get(edge).copied().flatten())
            .map(|f| f as usize)
    }

    /// All existing edge neighbors of `face`.
    pub fn neighbors(&self, face: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors
            .get(face)
            .into_iter()
            .flat_map(|n| n.iter().filter_map(|f| f.map(|f| f as usize)))
    }

    /// Faces incident to `vertex`.
    #[inline]
    #[must_use]
    pub fn vertex_faces(&self, vertex: usize) -> &[u32] {
        self.vertex_faces.get(vertex).map_or(&[], |v| v.as_slice())
    }

    /// Local edge index of `a` that `b` lies across, if they share an edge.
    #[must_use]
    pub fn shared_edge(&self, a: usize, b: usize) -> Option<usize> {
        let n = self.neighbors.get(a)?;
        n.iter().position(|f| f.is_some_and(|f| f as usize == b))
    }

    /// Number of edges with no neighbor.
    #[must_use]
    pub fn boundary_edge_count(&self) -> usize {
        self.neighbors
            .iter()
            .flat_map(|n| n.iter())
            .filter(|f| f.is_none())
            .count()
    }
}
