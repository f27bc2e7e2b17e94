//! Reference surfaces.
//!
//! Closed, consistently oriented triangulations used to seed optimizers,
//! drive tests and benchmark the geodesic backends.

use crate::{IndexedMesh, Vertex};
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// Regular icosahedron inscribed in the unit sphere.
///
/// 12 vertices, 20 faces, outward CCW winding. Every edge has length
/// `4 / sqrt(10 + 2 sqrt(5)) ≈ 1.0515`.
///
/// # Example
///
/// ```
/// use mesh_types::{unit_icosahedron, MeshTopology};
///
/// let ico = unit_icosahedron();
/// assert_eq!(ico.vertex_count(), 12);
/// assert_eq!(ico.face_count(), 20);
/// ```
#[must_use]
pub fn unit_icosahedron() -> IndexedMesh {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ];

    let vertices = raw
        .iter()
        .map(|&[x, y, z]| Vertex::new(Point3::from(Vector3::new(x, y, z).normalize())))
        .collect();

    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    IndexedMesh::from_parts(vertices, faces)
}

/// Unit sphere approximation by repeated 1-to-4 subdivision of the icosahedron.
///
/// Level `n` has `10 * 4^n + 2` vertices and `20 * 4^n` faces. New vertices
/// are pushed out to the unit sphere.
///
/// # Example
///
/// ```
/// use mesh_types::{icosphere, MeshTopology};
///
/// let sphere = icosphere(2);
/// assert_eq!(sphere.vertex_count(), 162);
/// assert_eq!(sphere.face_count(), 320);
/// ```
#[must_use]
pub fn icosphere(subdivisions: u32) -> IndexedMesh {
    let mut mesh = unit_icosahedron();
    for _ in 0..subdivisions {
        mesh = subdivide_on_sphere(&mesh);
    }
    mesh
}

/// Axis-aligned ellipsoid centered at the origin with the given semi-axes.
#[must_use]
pub fn ellipsoid(radii: Vector3<f64>, subdivisions: u32) -> IndexedMesh {
    let mut mesh = icosphere(subdivisions);
    mesh.scale_axes(radii);
    mesh
}

/// Flat open grid in the `z = 0` plane with `+Z` normals.
///
/// `nx * ny` cells of size `spacing`, two triangles per cell, starting at the
/// origin.
///
/// # Example
///
/// ```
/// use mesh_types::{grid_plane, MeshTopology};
///
/// let grid = grid_plane(4, 3, 0.5);
/// assert_eq!(grid.vertex_count(), 20);
/// assert_eq!(grid.face_count(), 24);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
// Truncation: grid sizes are far below u32::MAX
pub fn grid_plane(nx: usize, ny: usize, spacing: f64) -> IndexedMesh {
    let mut mesh = IndexedMesh::with_capacity((nx + 1) * (ny + 1), nx * ny * 2);
    let stride = nx + 1;

    for j in 0..=ny {
        for i in 0..=nx {
            #[allow(clippy::cast_precision_loss)]
            let (x, y) = (i as f64 * spacing, j as f64 * spacing);
            mesh.vertices.push(Vertex {
                position: Point3::new(x, y, 0.0),
                normal: Some(Vector3::z()),
            });
        }
    }

    for j in 0..ny {
        for i in 0..nx {
            let v00 = (j * stride + i) as u32;
            let v10 = v00 + 1;
            let v01 = ((j + 1) * stride + i) as u32;
            let v11 = v01 + 1;
            mesh.faces.push([v00, v10, v11]);
            mesh.faces.push([v00, v11, v01]);
        }
    }

    mesh
}

#[allow(clippy::cast_possible_truncation)]
// Truncation: vertex indices are u32, meshes with >4B vertices unsupported
fn subdivide_on_sphere(mesh: &IndexedMesh) -> IndexedMesh {
    let mut vertices = mesh.vertices.clone();
    let mut faces = Vec::with_capacity(mesh.faces.len() * 4);
    let mut midpoints: HashMap<(u32, u32), u32> = HashMap::with_capacity(mesh.faces.len() * 3 / 2);

    let mut midpoint = |a: u32, b: u32, vertices: &mut Vec<Vertex>| -> u32 {
        let key = if a < b { (a, b) } else { (b, a) };
        *midpoints.entry(key).or_insert_with(|| {
            let pa = vertices[a as usize].position.coords;
            let pb = vertices[b as usize].position.coords;
            let mid = ((pa + pb) * 0.5).normalize();
            vertices.push(Vertex::new(Point3::from(mid)));
            (vertices.len() - 1) as u32
        })
    };

    for &[a, b, c] in &mesh.faces {
        let ab = midpoint(a, b, &mut vertices);
        let bc = midpoint(b, c, &mut vertices);
        let ca = midpoint(c, a, &mut vertices);
        faces.push([a, ab, ca]);
        faces.push([b, bc, ab]);
        faces.push([c, ca, bc]);
        faces.push([ab, bc, ca]);
    }

    IndexedMesh::from_parts(vertices, faces)
}
