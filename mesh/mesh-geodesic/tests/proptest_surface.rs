//! Property-based tests for surface queries.
//!
//! Backends are built once and shared; every case queries random points.
//!
//! Run with: cargo test -p mesh-geodesic -- proptest

use mesh_geodesic::{MeshBackend, SurfaceParams, TriMeshBackend, is_barycentric_valid};
use mesh_types::{grid_plane, icosphere};
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use std::sync::LazyLock;

static SPHERE: LazyLock<TriMeshBackend> = LazyLock::new(|| {
    match TriMeshBackend::new(icosphere(2), SurfaceParams::default()) {
        Ok(b) => b,
        Err(e) => panic!("{e}"),
    }
});

static PLANE: LazyLock<TriMeshBackend> = LazyLock::new(|| {
    match TriMeshBackend::new(grid_plane(10, 10, 1.0), SurfaceParams::default()) {
        Ok(b) => b,
        Err(e) => panic!("{e}"),
    }
});

// =============================================================================
// Strategies
// =============================================================================

/// Generate an arbitrary point in a box around the unit sphere.
fn arb_point() -> impl Strategy<Value = Point3<f64>> {
    prop::array::uniform3(-2.0..2.0f64).prop_map(|[x, y, z]| Point3::new(x, y, z))
}

/// Generate a point on the unit sphere, away from the origin singularity.
fn arb_sphere_point() -> impl Strategy<Value = Point3<f64>> {
    prop::array::uniform3(-1.0..1.0f64)
        .prop_filter("too close to origin", |c| Vector3::from(*c).norm() > 0.1)
        .prop_map(|c| Point3::from(Vector3::from(c).normalize()))
}

/// Generate a point strictly inside the 10x10 plane.
fn arb_plane_point() -> impl Strategy<Value = Point3<f64>> {
    (0.5..9.5f64, 0.5..9.5f64).prop_map(|(x, y)| Point3::new(x, y, 0.0))
}

fn arb_vector() -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-1.0..1.0f64).prop_map(Vector3::from)
}

fn distance(backend: &TriMeshBackend, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    match backend.compute_distance(a, None, b, None, false) {
        Ok(sample) => sample.distance,
        Err(e) => panic!("{e}"),
    }
}

// =============================================================================
// Property Tests: Location
// =============================================================================

proptest! {
    /// Snapping lands on a face with valid barycentrics.
    #[test]
    fn snap_has_valid_barycentrics(p in arb_point()) {
        let location = SPHERE.locate(&p, None);
        prop_assert!(location.is_ok());
        let location = location.unwrap();

        prop_assert!(is_barycentric_valid(&location.bary, 1e-9));
        let rebuilt = SPHERE.geometry().triangle(location.face).point_at(&location.bary);
        prop_assert!((rebuilt - location.point).norm() < 1e-9);

        let snapped = SPHERE.snap_to_mesh(&p, None).unwrap();
        prop_assert!((snapped - location.point).norm() < 1e-12);
        // Faces of a level-2 icosphere sit just inside the unit sphere
        let r = snapped.coords.norm();
        prop_assert!(r > 0.9 && r <= 1.0 + 1e-9, "radius {}", r);
    }

    /// Projected vectors are orthogonal to the face normal.
    #[test]
    fn tangent_is_orthogonal_to_normal(p in arb_sphere_point(), v in arb_vector()) {
        let tangent = SPHERE.project_vector_to_surface_tangent(&p, None, &v).unwrap();
        let face = SPHERE.locate(&p, None).unwrap().face;
        prop_assert!(tangent.dot(&SPHERE.face_normal(face)).abs() < 1e-12);
    }

    /// On a plane the sampled normal is exact, so projection is orthogonal to it.
    #[test]
    fn tangent_is_orthogonal_to_sampled_normal(p in arb_plane_point(), v in arb_vector()) {
        let tangent = PLANE.project_vector_to_surface_tangent(&p, None, &v).unwrap();
        let normal = PLANE.sample_normal_at_point(&p, None).unwrap();
        prop_assert!(tangent.dot(&normal).abs() < 1e-12);
    }
}

// =============================================================================
// Property Tests: Distance
// =============================================================================

proptest! {
    /// Distance from a point to itself is zero.
    #[test]
    fn self_distance_is_zero(p in arb_sphere_point()) {
        prop_assert!(distance(&SPHERE, &p, &p).abs() < 1e-12);
    }

    /// Distance is symmetric up to discretization error.
    #[test]
    fn distance_is_symmetric(a in arb_sphere_point(), b in arb_sphere_point()) {
        let ab = distance(&SPHERE, &a, &b);
        let ba = distance(&SPHERE, &b, &a);
        prop_assert!((ab - ba).abs() <= 0.1 * ab.max(ba) + 0.05, "{} vs {}", ab, ba);
    }

    /// Triangle inequality holds up to discretization error.
    #[test]
    fn triangle_inequality(
        a in arb_sphere_point(),
        b in arb_sphere_point(),
        c in arb_sphere_point(),
    ) {
        let ac = distance(&SPHERE, &a, &c);
        let ab = distance(&SPHERE, &a, &b);
        let bc = distance(&SPHERE, &b, &c);
        prop_assert!(ac <= 1.1 * (ab + bc) + 0.05, "{} > {} + {}", ac, ab, bc);
    }

    /// Distances are bounded by half a great circle, with slack.
    #[test]
    fn distance_is_bounded(a in arb_sphere_point(), b in arb_sphere_point()) {
        let d = distance(&SPHERE, &a, &b);
        prop_assert!(d.is_finite() && d >= 0.0);
        prop_assert!(d <= 1.2 * std::f64::consts::PI);
    }
}

// =============================================================================
// Property Tests: Walk
// =============================================================================

proptest! {
    /// A zero-length walk returns the snapped start point.
    #[test]
    fn zero_walk_is_identity(p in arb_point()) {
        let snapped = SPHERE.snap_to_mesh(&p, None).unwrap();
        let walked = SPHERE.geodesic_walk(&p, None, &Vector3::zeros()).unwrap();
        prop_assert!((walked - snapped).norm() < 1e-12);
    }

    /// Splitting a walk into pieces on a flat region changes nothing.
    #[test]
    fn small_walks_compose_on_plane(
        p in (3.5..6.5f64, 3.5..6.5f64).prop_map(|(x, y)| Point3::new(x, y, 0.0)),
        v in prop::array::uniform2(-3.0..3.0f64),
        pieces in 2usize..12,
    ) {
        let v = Vector3::new(v[0], v[1], 0.0);
        let whole = PLANE.geodesic_walk(&p, None, &v).unwrap();

        #[allow(clippy::cast_precision_loss)]
        let piece = v / pieces as f64;
        let mut stepped = p;
        for _ in 0..pieces {
            stepped = PLANE.geodesic_walk(&stepped, Some(1), &piece).unwrap();
        }
        prop_assert!((whole - stepped).norm() < 1e-9);
    }

    /// Walks never leave the surface or produce NaN.
    #[test]
    fn walks_stay_on_sphere(p in arb_sphere_point(), v in arb_vector()) {
        let end = SPHERE.geodesic_walk(&p, None, &(v * 3.0)).unwrap();
        let r = end.coords.norm();
        prop_assert!(r.is_finite());
        prop_assert!(r > 0.9 && r <= 1.0 + 1e-9, "radius {}", r);
    }
}
