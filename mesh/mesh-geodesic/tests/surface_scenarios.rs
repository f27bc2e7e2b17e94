//! End-to-end scenarios on reference surfaces.
//!
//! Run with: cargo test -p mesh-geodesic --test surface_scenarios

use approx::assert_relative_eq;
use mesh_geodesic::{
    MeshBackend, PolyMeshBackend, SurfaceParams, TriMeshBackend, is_barycentric_valid,
};
use mesh_types::{ellipsoid, grid_plane, icosphere, unit_icosahedron};
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

fn trimesh(mesh: mesh_types::IndexedMesh) -> TriMeshBackend {
    TriMeshBackend::new(mesh, SurfaceParams::default()).unwrap()
}

// =============================================================================
// Icosahedron
// =============================================================================

#[test]
fn icosahedron_half_edge_walk_from_vertex() {
    let backend = trimesh(unit_icosahedron());
    let vertex = backend.mesh().vertices[0].position;

    let start = backend.locate(&vertex, Some(0)).unwrap();
    assert!(backend.geometry().face(start.face).contains(&0));

    // Half an edge along the tangent of every face around the vertex
    let fan: Vec<usize> = backend
        .geometry()
        .adjacency()
        .vertex_faces(0)
        .iter()
        .map(|&f| f as usize)
        .collect();
    assert_eq!(fan.len(), 5);
    for face in fan {
        let tri = backend.geometry().triangle(face);
        let half_edge = 0.5 * tri.edge_lengths()[0];
        let direction = (tri.centroid() - vertex).normalize();
        let end = backend
            .geodesic_walk(&vertex, None, &(direction * half_edge))
            .unwrap();

        // The centroid sits e/sqrt(3) from a corner, so the walk stops inside
        let bary = tri.barycentric(&end).unwrap();
        assert!(is_barycentric_valid(&bary, 1e-9), "face {face}");
        assert_relative_eq!((end - vertex).norm(), half_edge, epsilon = 1e-9);
        assert_eq!(backend.locate(&end, None).unwrap().face, face);
    }
}

#[test]
fn icosahedron_concurrent_particles_on_one_face() {
    let backend = trimesh(unit_icosahedron());
    let face = 7;
    let tri = *backend.geometry().triangle(face);
    let normal = backend.face_normal(face);
    let starts = [
        tri.point_at(&[0.5, 0.3, 0.2]),
        tri.point_at(&[0.2, 0.3, 0.5]),
    ];

    std::thread::scope(|s| {
        for (particle, start) in starts.iter().enumerate() {
            let backend = &backend;
            s.spawn(move || {
                let toward_centroid = tri.centroid() - *start;
                let mut p = *start;
                for i in 0..200 {
                    // Oscillate around the start without leaving the face
                    let sign = if i % 2 == 0 { 0.1 } else { -0.1 };
                    p = backend
                        .geodesic_walk(&p, Some(particle), &(toward_centroid * sign))
                        .unwrap();
                    let location = backend.locate(&p, Some(particle)).unwrap();
                    assert_eq!(location.face, face);
                    assert!(is_barycentric_valid(&location.bary, 1e-9));
                }
                assert!((p - *start).norm() < 1e-9);
            });
        }
    });

    assert_eq!(backend.tracked_particles(), 2);
    for (particle, start) in starts.iter().enumerate() {
        let location = backend.locate(start, Some(particle)).unwrap();
        assert_eq!(location.face, face);
        assert!((location.point - *start).dot(&normal).abs() < 1e-12);
    }
}

// =============================================================================
// Sphere geodesics
// =============================================================================

#[test]
fn sphere_antipodal_distance_is_half_circumference() {
    let backend = trimesh(icosphere(3));
    let north = Point3::new(0.0, 0.0, 1.0);
    let south = Point3::new(0.0, 0.0, -1.0);

    let sample = backend
        .compute_distance(&north, Some(0), &south, Some(1), true)
        .unwrap();
    assert!(
        (sample.distance - PI).abs() < 0.15 * PI,
        "antipodal distance {}",
        sample.distance
    );
    // Markedly above the chord through the center
    assert!(sample.distance > 2.5);
    assert!(sample.gradient.is_some());
}

#[test]
fn sphere_quarter_arc() {
    let backend = trimesh(icosphere(3));
    let a = Point3::new(1.0, 0.0, 0.0);
    let b = Point3::new(0.0, 1.0, 0.0);
    let d = backend
        .compute_distance(&a, None, &b, None, false)
        .unwrap()
        .distance;
    assert!((d - PI / 2.0).abs() < 0.15 * PI / 2.0, "quarter arc {d}");
    assert!(d > std::f64::consts::SQRT_2);
}

#[test]
fn sphere_gradient_is_tangent_and_points_away() {
    let backend = trimesh(icosphere(3));
    let a = Point3::from(Vector3::new(0.6, 0.0, 0.8).normalize());
    let b = Point3::new(0.0, 0.0, -1.0);
    let sample = backend.compute_distance(&a, None, &b, None, true).unwrap();
    let gradient = sample.gradient.unwrap();

    assert_relative_eq!(gradient.norm(), 1.0, epsilon = 1e-9);
    let face = backend.locate(&a, None).unwrap().face;
    assert!(gradient.dot(&backend.face_normal(face)).abs() < 1e-9);
    // Moving along the gradient from near the north pole climbs toward it
    assert!(gradient.z > 0.0);
}

#[test]
fn cache_reuses_fields_across_queries() {
    let params = SurfaceParams::default().with_cache_capacity(6);
    let backend = TriMeshBackend::new(icosphere(2), params).unwrap();
    let a = Point3::new(0.0, 0.0, 1.0);
    for target in [
        Point3::new(0.0, 0.0, -1.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, -1.0, 0.0),
    ] {
        backend
            .compute_distance(&a, None, &target, None, false)
            .unwrap();
    }
    let stats = backend.cache_stats();
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 6);
    assert!(backend.cached_sources().len() <= 6);
}

// =============================================================================
// Walks
// =============================================================================

#[test]
fn small_walks_match_one_large_walk_on_plane() {
    let backend = trimesh(grid_plane(20, 20, 0.5));
    let start = Point3::new(2.1, 3.3, 0.0);
    let total = Vector3::new(4.4, 3.7, 0.0);

    let once = backend.geodesic_walk(&start, None, &total).unwrap();
    let mut p = start;
    for _ in 0..37 {
        p = backend
            .geodesic_walk(&p, Some(9), &(total / 37.0))
            .unwrap();
    }
    assert_relative_eq!(once, p, epsilon = 1e-9);
    assert_relative_eq!(once, start + total, epsilon = 1e-9);
}

#[test]
fn ellipsoid_walk_stays_on_surface() {
    let radii = Vector3::new(2.0, 1.0, 0.5);
    let backend = trimesh(ellipsoid(radii, 3));
    let start = Point3::new(2.0, 0.0, 0.0);
    let end = backend
        .geodesic_walk(&start, Some(0), &Vector3::new(0.0, 1.5, 0.4))
        .unwrap();

    let implicit = (end.x / radii.x).powi(2) + (end.y / radii.y).powi(2) + (end.z / radii.z).powi(2);
    assert!(implicit > 0.95 && implicit <= 1.0 + 1e-9, "implicit {implicit}");
    assert!(end.y > 0.3);
}

#[test]
fn light_backend_walk_approximates_full_walk() {
    let mesh = icosphere(3);
    let full = trimesh(mesh.clone());
    let light = PolyMeshBackend::new(mesh, SurfaceParams::default()).unwrap();

    let start = Point3::from(Vector3::new(0.2, 0.3, 0.9).normalize());
    let normal = full.sample_normal_at_point(&start, None).unwrap();
    let step = normal.cross(&Vector3::x()).normalize() * 0.8;

    let a = full.geodesic_walk(&start, None, &step).unwrap();
    let b = light.geodesic_walk(&start, None, &step).unwrap();
    assert!((a - b).norm() < 0.1, "full {a} vs light {b}");
}
