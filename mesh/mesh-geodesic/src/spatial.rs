//! Nearest-vertex lookup over the static vertex set.

use hashbrown::HashMap;
use kiddo::{KdTree, SquaredEuclidean};
use mesh_types::IndexedMesh;
use nalgebra::{Point3, Rotation3};
use smallvec::SmallVec;
use tracing::debug;

/// Leaf bucket size of [`kiddo::KdTree`]. A bucket whose points all share
/// one coordinate on the split axis cannot be split.
const BUCKET: usize = 32;

/// Frames tried, in order, for the indexed coordinates. Grids, voxel
/// staircases and flat patches repeat coordinates along the mesh axes; in
/// a generically rotated frame distinct lattice points never share one.
const FRAMES: [(f64, f64, f64); 3] = [(0.61, 0.37, 0.89), (1.13, -0.52, 0.27), (-0.83, 0.71, 1.37)];

/// K-d tree over mesh vertex positions.
///
/// Coincident vertices collapse into one tree entry that expands back to
/// every vertex at that position. Distances are rotation invariant, so the
/// tree stores positions in the first frame where no axis value repeats a
/// full bucket's worth of times. If none qualifies, queries scan linearly.
pub struct VertexIndex {
    tree: Option<KdTree<f64, 3>>,
    frame: Rotation3<f64>,
    /// Distinct positions in the indexed frame, with the vertices at each.
    sites: Vec<([f64; 3], SmallVec<[usize; 2]>)>,
    len: usize,
}

impl std::fmt::Debug for VertexIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexIndex")
            .field("len", &self.len)
            .field("sites", &self.sites.len())
            .field("tree", &self.tree.is_some())
            .finish()
    }
}

impl VertexIndex {
    /// Index every vertex of `mesh`.
    #[must_use]
    pub fn from_mesh(mesh: &IndexedMesh) -> Self {
        Self::with_frames(mesh, &FRAMES)
    }

    fn with_frames(mesh: &IndexedMesh, frames: &[(f64, f64, f64)]) -> Self {
        let mut slot_of: HashMap<[u64; 3], usize> = HashMap::with_capacity(mesh.vertices.len());
        let mut positions: Vec<Point3<f64>> = Vec::new();
        let mut members: Vec<SmallVec<[usize; 2]>> = Vec::new();
        for (i, v) in mesh.vertices.iter().enumerate() {
            // +0.0 folds -0.0 into the same key
            let key = [v.position.x, v.position.y, v.position.z].map(|c| (c + 0.0).to_bits());
            let slot = *slot_of.entry(key).or_insert_with(|| {
                positions.push(v.position);
                members.push(SmallVec::new());
                positions.len() - 1
            });
            members[slot].push(i);
        }

        let frame = frames
            .iter()
            .map(|&(roll, pitch, yaw)| Rotation3::from_euler_angles(roll, pitch, yaw))
            .find(|frame| {
                let rotated: Vec<[f64; 3]> = positions.iter().map(|p| to_array(&(frame * p))).collect();
                longest_shared_run(&rotated) < BUCKET
            });

        let (frame, tree) = match frame {
            Some(frame) if !positions.is_empty() => {
                let mut tree: KdTree<f64, 3> = KdTree::with_capacity(positions.len());
                for (slot, p) in positions.iter().enumerate() {
                    tree.add(&to_array(&(frame * p)), slot as u64);
                }
                (frame, Some(tree))
            }
            Some(frame) => (frame, None),
            None => {
                debug!(
                    sites = positions.len(),
                    "Vertex coordinates repeat too often for a k-d tree, using linear scans"
                );
                (Rotation3::identity(), None)
            }
        };

        let sites = positions
            .iter()
            .zip(members)
            .map(|(p, m)| (to_array(&(frame * p)), m))
            .collect();
        Self {
            tree,
            frame,
            sites,
            len: mesh.vertices.len(),
        }
    }

    /// Number of indexed vertices.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether queries go through the k-d tree rather than a linear scan.
    #[inline]
    #[must_use]
    pub const fn is_tree_backed(&self) -> bool {
        self.tree.is_some()
    }

    /// Vertex closest to `point`, or `None` for an empty index.
    #[must_use]
    pub fn nearest(&self, point: &Point3<f64>) -> Option<usize> {
        self.nearest_sites(point, 1)
            .first()
            .and_then(|&slot| self.sites[slot].1.first().copied())
    }

    /// Up to `k` vertices closest to `point`, nearest first.
    #[must_use]
    pub fn k_nearest(&self, point: &Point3<f64>, k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        let mut out: Vec<usize> = self
            .nearest_sites(point, k)
            .into_iter()
            .flat_map(|slot| self.sites[slot].1.iter().copied())
            .collect();
        out.truncate(k);
        out
    }

    /// Slots of the `k` nearest distinct positions, nearest first.
    fn nearest_sites(&self, point: &Point3<f64>, k: usize) -> Vec<usize> {
        let query = to_array(&(self.frame * point));
        let k = k.min(self.sites.len());
        if k == 0 {
            return Vec::new();
        }
        if let Some(tree) = &self.tree {
            return tree
                .nearest_n::<SquaredEuclidean>(&query, k)
                .into_iter()
                .filter_map(|n| usize::try_from(n.item).ok())
                .collect();
        }

        let mut ranked: Vec<(f64, usize)> = self
            .sites
            .iter()
            .enumerate()
            .map(|(slot, (p, _))| {
                let d: f64 = p.iter().zip(query.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (d, slot)
            })
            .collect();
        ranked.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(k).map(|(_, slot)| slot).collect()
    }
}

fn to_array(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}

/// Largest number of points sharing one exact value on any axis.
fn longest_shared_run(points: &[[f64; 3]]) -> usize {
    (0..3)
        .map(|axis| {
            let mut values: Vec<f64> = points.iter().map(|p| p[axis]).collect();
            values.sort_unstable_by(f64::total_cmp);
            values
                .chunk_by(|a, b| a == b)
                .map(<[f64]>::len)
                .max()
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{Vertex, grid_plane, icosphere};

    /// Unit cubes stacked as a staircase, triangulated per voxel face.
    fn voxel_staircase(steps: usize, width: usize) -> IndexedMesh {
        let mut mesh = IndexedMesh::new();
        for s in 0..steps {
            for w in 0..width {
                for h in 0..=s {
                    #[allow(clippy::cast_precision_loss)]
                    let (x, y, z) = (s as f64, w as f64, h as f64);
                    let base = u32::try_from(mesh.vertices.len()).unwrap_or(u32::MAX);
                    for (dx, dy, dz) in [
                        (0.0, 0.0, 0.0),
                        (1.0, 0.0, 0.0),
                        (1.0, 1.0, 0.0),
                        (0.0, 1.0, 0.0),
                        (0.0, 0.0, 1.0),
                        (1.0, 0.0, 1.0),
                        (1.0, 1.0, 1.0),
                        (0.0, 1.0, 1.0),
                    ] {
                        mesh.vertices.push(Vertex::from_coords(x + dx, y + dy, z + dz));
                    }
                    for [a, b, c] in [[0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7], [0, 1, 5], [0, 5, 4]] {
                        mesh.faces.push([base + a, base + b, base + c]);
                    }
                }
            }
        }
        mesh
    }

    #[test]
    fn nearest_on_a_flat_grid() {
        // Every vertex shares z = 0 and rows share y
        let mesh = grid_plane(20, 20, 0.5);
        let index = VertexIndex::from_mesh(&mesh);
        assert_eq!(index.len(), 441);
        assert!(index.is_tree_backed());

        let hit = index.nearest(&Point3::new(2.1, 3.9, 0.3));
        // Column 4, row 8 of a 21-wide grid
        assert_eq!(hit, Some(8 * 21 + 4));
    }

    #[test]
    fn large_flat_grid_builds_a_tree() {
        let mesh = grid_plane(40, 40, 0.25);
        let index = VertexIndex::from_mesh(&mesh);
        assert_eq!(index.len(), 41 * 41);
        assert!(index.is_tree_backed());

        let q = Point3::new(7.3, 1.2, -0.5);
        let hits = index.k_nearest(&q, 4);
        // (7.25, 1.25) is the unique closest lattice point
        assert_eq!(hits.first().copied(), Some(5 * 41 + 29));
        let d = |i: usize| (mesh.vertices[i].position - q).norm();
        for pair in hits.windows(2) {
            assert!(d(pair[0]) <= d(pair[1]) + 1e-12);
        }
    }

    #[test]
    fn voxel_staircase_with_coincident_corners() {
        let mesh = voxel_staircase(8, 8);
        let index = VertexIndex::from_mesh(&mesh);
        assert_eq!(index.len(), mesh.vertices.len());

        // Interior lattice corners are shared by up to eight voxels
        let q = Point3::new(3.05, 4.02, 1.97);
        let hits = index.k_nearest(&q, 64);
        let corner = Point3::new(3.0, 4.0, 2.0);
        let at_corner: Vec<usize> = (0..mesh.vertices.len())
            .filter(|&i| mesh.vertices[i].position == corner)
            .collect();
        assert!(at_corner.len() > 1);
        assert!(at_corner.iter().all(|i| hits[..at_corner.len()].contains(i)));
        assert_eq!(
            index.nearest(&q).map(|i| mesh.vertices[i].position),
            Some(corner)
        );
    }

    #[test]
    fn coincident_vertices_share_one_site() {
        let mut mesh = IndexedMesh::new();
        for _ in 0..BUCKET {
            mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 1.0));
        }
        mesh.vertices.push(Vertex::from_coords(5.0, 0.0, 0.0));
        let index = VertexIndex::from_mesh(&mesh);
        assert!(index.is_tree_backed());
        assert_eq!(index.k_nearest(&Point3::origin(), 3), vec![0, 1, 2]);
        assert_eq!(index.nearest(&Point3::new(4.0, 0.0, 0.0)), Some(BUCKET));
    }

    #[test]
    fn linear_scan_matches_tree() {
        let mesh = grid_plane(12, 12, 0.5);
        let tree = VertexIndex::from_mesh(&mesh);
        // No frame qualifies, so every query scans
        let scan = VertexIndex::with_frames(&mesh, &[]);
        assert!(!scan.is_tree_backed());

        for q in [
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(3.3, 5.6, -1.0),
            Point3::new(6.2, 0.05, 0.0),
        ] {
            assert_eq!(scan.nearest(&q), tree.nearest(&q));
            assert_eq!(scan.k_nearest(&q, 3), tree.k_nearest(&q, 3));
        }
    }

    #[test]
    fn longest_run_counts_shared_axis_values() {
        let points = [[0.0, 1.0, 2.0], [0.0, 3.0, 2.0], [0.0, 1.0, 5.0], [1.0, 4.0, 6.0]];
        assert_eq!(longest_shared_run(&points), 3);
        assert_eq!(longest_shared_run(&[]), 0);
    }

    #[test]
    fn k_nearest_is_sorted_and_capped() {
        let mesh = icosphere(1);
        let index = VertexIndex::from_mesh(&mesh);
        let q = Point3::new(0.0, 0.0, 1.2);
        let hits = index.k_nearest(&q, 6);
        assert_eq!(hits.len(), 6);

        let d = |i: usize| (mesh.vertices[i].position - q).norm();
        for pair in hits.windows(2) {
            assert!(d(pair[0]) <= d(pair[1]) + 1e-12);
        }
        assert_eq!(index.nearest(&q), hits.first().copied());

        assert_eq!(index.k_nearest(&q, 1000).len(), mesh.vertices.len());
        assert!(index.k_nearest(&q, 0).is_empty());
    }

    #[test]
    fn empty_index() {
        let index = VertexIndex::from_mesh(&IndexedMesh::new());
        assert!(index.is_empty());
        assert_eq!(index.nearest(&Point3::origin()), None);
    }
}
