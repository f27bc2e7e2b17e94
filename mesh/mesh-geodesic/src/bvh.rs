//! Bounding volume hierarchy over mesh faces.
//!
//! Answers "which face is closest to this point" without walking the whole
//! mesh. Construction splits at the median face centroid along the longest
//! axis and runs the two halves on the rayon pool once a subtree is large
//! enough.

use crate::geometry::{Location, SurfaceGeometry};
use mesh_types::Aabb;
use nalgebra::Point3;
use smallvec::SmallVec;

/// Faces per leaf.
const MAX_LEAF_SIZE: usize = 8;

/// Subtrees at least this large are built in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// BVH node containing either leaf faces or child nodes.
#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        faces: SmallVec<[u32; MAX_LEAF_SIZE]>,
    },
    Internal {
        bbox: Aabb,
        left: Box<Self>,
        right: Box<Self>,
    },
}

impl BvhNode {
    const fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Face hierarchy with a nearest-surface-point query.
#[derive(Debug)]
pub struct FaceBvh {
    root: Option<BvhNode>,
    face_count: usize,
}

/// Running best candidate during a nearest-face search.
struct Nearest {
    location: Option<Location>,
    distance_sq: f64,
}

impl FaceBvh {
    /// Build the hierarchy over every face of `geometry`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: face indices are u32 like vertex indices
    pub fn build(geometry: &SurfaceGeometry) -> Self {
        let face_count = geometry.face_count();
        if face_count == 0 {
            return Self {
                root: None,
                face_count,
            };
        }

        let boxes: Vec<(u32, Aabb)> = (0..face_count)
            .map(|f| {
                let tri = geometry.triangle(f);
                (f as u32, Aabb::from_points(tri.vertices().iter()))
            })
            .collect();

        let indices: Vec<usize> = (0..boxes.len()).collect();
        let root = Self::build_recursive(&boxes, indices);

        Self {
            root: Some(root),
            face_count,
        }
    }

    fn build_recursive(boxes: &[(u32, Aabb)], mut indices: Vec<usize>) -> BvhNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand_to_include_box(&boxes[i].1);
        }

        if indices.len() <= MAX_LEAF_SIZE {
            return BvhNode::Leaf {
                bbox,
                faces: indices.iter().map(|&i| boxes[i].0).collect(),
            };
        }

        let axis = bbox.longest_axis();
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            let ca = boxes[a].1.center()[axis];
            let cb = boxes[b].1.center()[axis];
            ca.total_cmp(&cb)
        });
        let right_indices = indices.split_off(mid);
        let left_indices = indices;

        let (left, right) = if left_indices.len() + right_indices.len() >= PARALLEL_THRESHOLD {
            rayon::join(
                || Self::build_recursive(boxes, left_indices),
                || Self::build_recursive(boxes, right_indices),
            )
        } else {
            (
                Self::build_recursive(boxes, left_indices),
                Self::build_recursive(boxes, right_indices),
            )
        };

        BvhNode::Internal {
            bbox,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Number of faces in the hierarchy.
    #[inline]
    #[must_use]
    pub const fn face_count(&self) -> usize {
        self.face_count
    }

    /// Bounding box of the whole mesh.
    #[must_use]
    pub fn root_bbox(&self) -> Option<&Aabb> {
        self.root.as_ref().map(BvhNode::bbox)
    }

    /// Closest surface point to `point` over all faces.
    ///
    /// Returns `None` only for an empty hierarchy.
    #[must_use]
    pub fn nearest(&self, geometry: &SurfaceGeometry, point: &Point3<f64>) -> Option<Location> {
        let root = self.root.as_ref()?;
        let mut best = Nearest {
            location: None,
            distance_sq: f64::INFINITY,
        };
        Self::nearest_recursive(root, geometry, point, &mut best);
        best.location
    }

    fn nearest_recursive(
        node: &BvhNode,
        geometry: &SurfaceGeometry,
        point: &Point3<f64>,
        best: &mut Nearest,
    ) {
        match node {
            BvhNode::Leaf { faces, .. } => {
                for &f in faces {
                    let candidate = geometry.closest_in_face(f as usize, point);
                    let d2 = (candidate.point - point).norm_squared();
                    if d2 < best.distance_sq {
                        best.distance_sq = d2;
                        best.location = Some(candidate);
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                let dl = left.bbox().distance_squared(point);
                let dr = right.bbox().distance_squared(point);
                let (first, d_first, second, d_second) = if dl <= dr {
                    (left, dl, right, dr)
                } else {
                    (right, dr, left, dl)
                };
                if d_first < best.distance_sq {
                    Self::nearest_recursive(first, geometry, point, best);
                }
                if d_second < best.distance_sq {
                    Self::nearest_recursive(second, geometry, point, best);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{grid_plane, icosphere};

    fn brute_force(geometry: &SurfaceGeometry, point: &Point3<f64>) -> f64 {
        (0..geometry.face_count())
            .map(|f| (geometry.closest_in_face(f, point).point - point).norm())
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn matches_brute_force_on_sphere() {
        let geometry = SurfaceGeometry::new(icosphere(3));
        assert!(geometry.is_ok());
        let Ok(geometry) = geometry else { return };
        let bvh = FaceBvh::build(&geometry);
        assert_eq!(bvh.face_count(), 1280);

        let queries = [
            Point3::new(0.3, -0.2, 0.1),
            Point3::new(2.0, 1.0, -1.5),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(-0.7, 0.7, 0.05),
        ];
        for q in &queries {
            let hit = bvh.nearest(&geometry, q);
            assert!(hit.is_some());
            if let Some(hit) = hit {
                assert_relative_eq!((hit.point - q).norm(), brute_force(&geometry, q), epsilon = 1e-12);
                let bary_point = geometry.triangle(hit.face).point_at(&hit.bary);
                assert_relative_eq!(bary_point, hit.point, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn projects_onto_plane() {
        let geometry = SurfaceGeometry::new(grid_plane(10, 10, 0.1));
        let Ok(geometry) = geometry else { return };
        let bvh = FaceBvh::build(&geometry);
        let hit = bvh.nearest(&geometry, &Point3::new(0.43, 0.57, 0.8));
        assert!(hit.is_some());
        if let Some(hit) = hit {
            assert_relative_eq!(hit.point, Point3::new(0.43, 0.57, 0.0), epsilon = 1e-12);
        }

        let root = bvh.root_bbox();
        assert!(root.is_some_and(|b| (b.max.x - 1.0).abs() < 1e-12));
    }
}
