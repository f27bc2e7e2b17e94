//! Straight-line marching across faces.
//!
//! A displacement is consumed face by face: inside the current face the point
//! moves in a straight line; when the line leaves through an edge the rest of
//! the displacement is rotated about that edge into the neighbor's plane and
//! the march continues there. Total path length equals the length of the
//! displacement projected onto the start face.

use crate::geometry::{
    Location, SurfaceGeometry, barycentric_on_edge, clamp_barycentric, exit_edge,
    is_barycentric_valid, project_vector_to_face, rotate_vector_to_face,
};
use crate::params::SurfaceParams;
use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;
use tracing::trace;

/// Barycentric coordinates at or below this put the start on an edge.
const ON_EDGE: f64 = 1e-12;

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkTermination {
    /// The whole displacement was consumed.
    Completed,
    /// The path left the mesh through a boundary edge.
    Boundary,
    /// A degenerate face or a fold-back edge made the next step undefined.
    Degenerate,
    /// The face-crossing cap was reached.
    StepLimit,
}

/// Result of [`walk_on_faces`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkOutcome {
    /// Final position on the surface.
    pub point: Point3<f64>,
    /// Face containing `point`.
    pub face: usize,
    /// Barycentrics of `point` in `face`.
    pub bary: [f64; 3],
    /// Number of edges crossed.
    pub steps: usize,
    /// Why the walk stopped.
    pub termination: WalkTermination,
}

impl WalkOutcome {
    fn at(location: &Location, steps: usize, termination: WalkTermination) -> Self {
        Self {
            point: location.point,
            face: location.face,
            bary: location.bary,
            steps,
            termination,
        }
    }

    /// Where the walk ended, as a location.
    #[must_use]
    pub const fn location(&self) -> Location {
        Location {
            face: self.face,
            bary: self.bary,
            point: self.point,
        }
    }
}

/// Move `start` by `displacement` along the surface.
///
/// A start on an edge or vertex first moves to the incident face whose
/// corner opens toward the displacement. The displacement is then projected
/// onto the start face. Never produces a non-finite point: every early exit
/// returns the last position reached.
#[must_use]
pub fn walk_on_faces(
    geometry: &SurfaceGeometry,
    start: &Location,
    displacement: &Vector3<f64>,
    params: &SurfaceParams,
) -> WalkOutcome {
    let mut here = Location {
        bary: clamp_barycentric(&start.bary),
        ..*start
    };
    here.point = geometry.triangle(here.face).point_at(&here.bary);
    if displacement.norm() > params.walk_epsilon {
        here = entry_face(geometry, here, displacement);
    }

    let mut remaining = project_vector_to_face(&geometry.face_normal(here.face), displacement);
    if !remaining.iter().all(|c| c.is_finite()) {
        return WalkOutcome::at(&here, 0, WalkTermination::Degenerate);
    }

    for step in 0..params.max_walk_steps {
        if remaining.norm() <= params.walk_epsilon {
            return WalkOutcome::at(&here, step, WalkTermination::Completed);
        }

        let tri = geometry.triangle(here.face);
        let target = here.point + remaining;
        let Some(target_bary) = tri.barycentric(&target) else {
            trace!(face = here.face, "Walk stopped on a degenerate face");
            return WalkOutcome::at(&here, step, WalkTermination::Degenerate);
        };

        let exit = if is_barycentric_valid(&target_bary, params.barycentric_epsilon) {
            None
        } else {
            exit_edge(&here.bary, &target_bary)
        };
        let Some((edge, t)) = exit else {
            let bary = clamp_barycentric(&target_bary);
            let end = Location {
                face: here.face,
                bary,
                point: tri.point_at(&bary),
            };
            return WalkOutcome::at(&end, step, WalkTermination::Completed);
        };

        let crossing_bary = barycentric_on_edge(&here.bary, &target_bary, t, edge);
        let crossing = Location {
            face: here.face,
            bary: crossing_bary,
            point: tri.point_at(&crossing_bary),
        };

        let Some(next) = geometry.adjacency().neighbor(here.face, edge) else {
            trace!(face = here.face, edge, "Walk reached a boundary edge");
            return WalkOutcome::at(&crossing, step, WalkTermination::Boundary);
        };

        let leftover = target - crossing.point;
        let rotated = rotate_vector_to_face(
            &geometry.face_normal(here.face),
            &geometry.face_normal(next),
            &leftover,
        );
        let next_bary = geometry
            .triangle(next)
            .barycentric(&crossing.point)
            .map(|b| clamp_barycentric(&b));
        let (Some(rotated), Some(next_bary)) = (rotated, next_bary) else {
            trace!(from = here.face, to = next, "Walk stopped at a fold");
            return WalkOutcome::at(&crossing, step, WalkTermination::Degenerate);
        };

        here = Location {
            face: next,
            bary: next_bary,
            point: geometry.triangle(next).point_at(&next_bary),
        };
        remaining = rotated;
    }

    trace!(steps = params.max_walk_steps, "Walk hit the step limit");
    WalkOutcome::at(&here, params.max_walk_steps, WalkTermination::StepLimit)
}

/// Re-seat a start lying on an edge or vertex in the incident face that
/// the displacement enters.
///
/// Among faces whose corner or side contains the projected direction, the one
/// keeping most of the displacement wins. Interior starts are returned as is.
fn entry_face(geometry: &SurfaceGeometry, here: Location, displacement: &Vector3<f64>) -> Location {
    let on_edge: SmallVec<[usize; 3]> = (0..3).filter(|&i| here.bary[i] <= ON_EDGE).collect();
    let adjacency = geometry.adjacency();
    let candidates: SmallVec<[usize; 8]> = match on_edge.as_slice() {
        [edge] => std::iter::once(here.face)
            .chain(adjacency.neighbor(here.face, *edge))
            .collect(),
        [a, b] => {
            let corner = 3 - a - b;
            let vertex = geometry.face(here.face)[corner] as usize;
            adjacency.vertex_faces(vertex).iter().map(|&f| f as usize).collect()
        }
        _ => return here,
    };

    let mut best: Option<(f64, Location)> = None;
    for face in candidates {
        let tri = geometry.triangle(face);
        let along = project_vector_to_face(&geometry.face_normal(face), displacement);
        let kept = along.norm_squared();
        if kept <= f64::MIN_POSITIVE {
            continue;
        }
        // One mean edge ahead along the direction
        let ahead = here.point + along * (geometry.mean_edge_length() / kept.sqrt());
        let (Some(from), Some(to)) = (tri.barycentric(&here.point), tri.barycentric(&ahead)) else {
            continue;
        };
        // Coordinates already at zero must not decrease
        let enters = (0..3).all(|i| from[i] > ON_EDGE || to[i] >= from[i] - ON_EDGE);
        if enters && best.as_ref().is_none_or(|(score, _)| kept > *score) {
            let bary = clamp_barycentric(&from);
            best = Some((
                kept,
                Location {
                    face,
                    bary,
                    point: tri.point_at(&bary),
                },
            ));
        }
    }
    best.map_or(here, |(_, location)| location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{grid_plane, icosphere, unit_icosahedron};

    fn geometry(mesh: mesh_types::IndexedMesh) -> SurfaceGeometry {
        match SurfaceGeometry::new(mesh) {
            Ok(g) => g,
            Err(e) => panic!("{e}"),
        }
    }

    fn start_at(geometry: &SurfaceGeometry, face: usize, bary: [f64; 3]) -> Location {
        Location {
            face,
            bary,
            point: geometry.triangle(face).point_at(&bary),
        }
    }

    #[test]
    fn zero_displacement_stays_put() {
        let g = geometry(grid_plane(3, 3, 1.0));
        let start = start_at(&g, 4, [0.2, 0.5, 0.3]);
        let out = walk_on_faces(&g, &start, &Vector3::zeros(), &SurfaceParams::default());
        assert_eq!(out.termination, WalkTermination::Completed);
        assert_eq!(out.steps, 0);
        assert_eq!(out.face, 4);
        assert_relative_eq!(out.point, start.point, epsilon = 1e-15);
    }

    #[test]
    fn crosses_many_faces_on_a_plane() {
        let g = geometry(grid_plane(10, 10, 1.0));
        let start = start_at(&g, 0, [0.6, 0.3, 0.1]);
        let d = Vector3::new(6.3, 2.9, 0.0);
        let out = walk_on_faces(&g, &start, &d, &SurfaceParams::default());
        assert_eq!(out.termination, WalkTermination::Completed);
        assert!(out.steps > 5);
        assert_relative_eq!(out.point, start.point + d, epsilon = 1e-9);
        assert!(g.contains(out.face, &out.point, 1e-9, 0.5).is_some());
    }

    #[test]
    fn out_of_plane_component_is_dropped() {
        let g = geometry(grid_plane(4, 4, 1.0));
        let start = start_at(&g, 10, [1.0 / 3.0; 3]);
        let out = walk_on_faces(&g, &start, &Vector3::new(0.5, 0.25, 7.0), &SurfaceParams::default());
        assert_relative_eq!(out.point, start.point + Vector3::new(0.5, 0.25, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn stops_on_boundary() {
        let g = geometry(grid_plane(2, 2, 1.0));
        let start = start_at(&g, 0, [0.6, 0.3, 0.1]);
        let out = walk_on_faces(&g, &start, &Vector3::new(10.0, 0.0, 0.0), &SurfaceParams::default());
        assert_eq!(out.termination, WalkTermination::Boundary);
        assert_relative_eq!(out.point.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(out.point.y, start.point.y, epsilon = 1e-9);
    }

    #[test]
    fn honors_step_limit() {
        let g = geometry(grid_plane(10, 10, 1.0));
        let start = start_at(&g, 0, [0.6, 0.3, 0.1]);
        let params = SurfaceParams::default().with_max_walk_steps(2);
        let out = walk_on_faces(&g, &start, &Vector3::new(8.0, 7.0, 0.0), &params);
        assert_eq!(out.termination, WalkTermination::StepLimit);
        assert_eq!(out.steps, 2);
        assert!(out.point.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn vertex_start_enters_each_fan_face() {
        let g = geometry(unit_icosahedron());
        let params = SurfaceParams::default();
        let fan: Vec<usize> = g.adjacency().vertex_faces(0).iter().map(|&f| f as usize).collect();
        assert_eq!(fan.len(), 5);

        let seat = fan[0];
        let corner = g.face(seat).iter().position(|&v| v == 0).unwrap_or(0);
        let mut bary = [0.0; 3];
        bary[corner] = 1.0;
        let start = start_at(&g, seat, bary);

        for &target in &fan {
            let tri = g.triangle(target);
            let half_edge = 0.5 * tri.edge_lengths()[0];
            let d = (tri.centroid() - start.point).normalize() * half_edge;
            let out = walk_on_faces(&g, &start, &d, &params);

            assert_eq!(out.termination, WalkTermination::Completed);
            assert_eq!(out.face, target);
            assert_eq!(out.steps, 0);
            assert_relative_eq!((out.point - start.point).norm(), half_edge, epsilon = 1e-9);
        }
    }

    #[test]
    fn edge_start_enters_the_far_face() {
        let g = geometry(icosphere(2));
        let face = 40;
        let Some(next) = g.adjacency().neighbor(face, 0) else {
            panic!("closed surface has no boundary")
        };
        // Midpoint of edge 0, the side opposite corner 0
        let start = start_at(&g, face, [0.0, 0.5, 0.5]);
        let toward = g.triangle(next).centroid() - start.point;
        let d = toward * 0.5;
        let out = walk_on_faces(&g, &start, &d, &SurfaceParams::default());

        assert_eq!(out.face, next);
        assert_eq!(out.steps, 0);
        assert_relative_eq!(out.point, start.point + d, epsilon = 1e-9);
    }

    #[test]
    fn sphere_walk_stays_on_surface() {
        let g = geometry(icosphere(3));
        let start = start_at(&g, 100, [0.3, 0.3, 0.4]);
        let n = g.face_normal(100);
        let tangent = n.cross(&Vector3::new(0.3, -0.5, 0.8)).normalize() * 1.2;
        let out = walk_on_faces(&g, &start, &tangent, &SurfaceParams::default());

        assert_eq!(out.termination, WalkTermination::Completed);
        assert!(out.steps > 0);
        // On the mesh, so just inside the unit sphere
        let r = out.point.coords.norm();
        assert!(r > 0.97 && r <= 1.0 + 1e-9);
        // Arc length walked cannot be shorter than the chord
        let chord = (out.point - start.point).norm();
        assert!(chord <= 1.2 + 1e-9);
        assert!(chord > 0.9);
    }
}
