use std::sync::Arc;
use std::thread;

use cpom_engine::ProjectionEngine;
use cpom_engine::geom::{
    AngleTolerance, BuildQuality, BvhBuildOptions, MeshIndex, Point3, ProjectionResult, Triangle,
    TriangleSet, Vec3, Winding, closest_point_on_triangle, evaluate_bindings, from_bytes, to_bytes,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_point(rng: &mut StdRng, extent: f64) -> Point3 {
    Point3::new(
        rng.random_range(-extent..extent),
        rng.random_range(-extent..extent),
        rng.random_range(-extent..extent),
    )
}

fn random_unit(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = random_point(rng, 1.0).to_vec3();
        if let Some(n) = v.normalized().filter(|_| v.length() <= 1.0) {
            return n;
        }
    }
}

fn random_mesh(seed: u64, count: usize) -> Vec<Triangle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let a = random_point(&mut rng, 5.0);
            let b = a + random_point(&mut rng, 0.8).to_vec3();
            let c = a + random_point(&mut rng, 0.8).to_vec3();
            Triangle::new(a, b, c)
        })
        .collect()
}

/// Exhaustive reference: smallest distance over all triangles passing the filter.
fn brute_force(set: &TriangleSet, point: Point3, normal: Vec3, tolerance: AngleTolerance) -> Option<f64> {
    let cos_tol = tolerance.cos_threshold();
    let normal = normal.normalized_or_zero();
    set.triangles()
        .iter()
        .zip(set.normals())
        .filter(|(_, n)| normal.dot(**n) >= cos_tol)
        .map(|(tri, _)| closest_point_on_triangle(point, tri).0.distance_squared_to(point))
        .min_by(f64::total_cmp)
}

#[test]
fn query_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(2024);
    for quality in [BuildQuality::Low, BuildQuality::Medium, BuildQuality::High] {
        let options = BvhBuildOptions {
            quality,
            ..Default::default()
        };
        let index = MeshIndex::build(TriangleSet::new(random_mesh(1, 800)), &options);

        for _ in 0..300 {
            let point = random_point(&mut rng, 7.0);
            let normal = random_unit(&mut rng);
            let tolerance = AngleTolerance::from_radians(rng.random_range(0.0..3.5)).expect("valid");

            let result = index.closest_point(point, normal, tolerance);
            match brute_force(index.triangles(), point, normal, tolerance) {
                Some(expected) => {
                    let t = result.triangle.expect("a candidate exists");
                    assert!((result.distance_squared - expected).abs() <= 1e-9 * expected.max(1.0));
                    let normal_t = index.triangles().normals()[t];
                    assert!(normal.normalized_or_zero().dot(normal_t) >= tolerance.cos_threshold());
                }
                None => assert!(!result.is_match()),
            }
        }
    }
}

#[test]
fn unconstrained_query_is_plain_closest_point() {
    let mut rng = StdRng::seed_from_u64(7);
    let triangles = random_mesh(2, 400);
    let index = MeshIndex::build(TriangleSet::new(triangles.clone()), &BvhBuildOptions::default());

    for _ in 0..200 {
        let point = random_point(&mut rng, 8.0);
        let normal = random_unit(&mut rng);
        let result = index.closest_point(point, normal, AngleTolerance::unconstrained());

        let expected = triangles
            .iter()
            .map(|tri| closest_point_on_triangle(point, tri).0.distance_squared_to(point))
            .fold(f64::INFINITY, f64::min);
        assert!(result.is_match());
        assert!((result.distance_squared - expected).abs() <= 1e-9 * expected.max(1.0));
    }
}

#[test]
fn barycentrics_rebuild_projected_points() {
    let mut rng = StdRng::seed_from_u64(99);
    let index = MeshIndex::build(TriangleSet::new(random_mesh(3, 300)), &BvhBuildOptions::default());

    let points: Vec<Point3> = (0..500).map(|_| random_point(&mut rng, 6.0)).collect();
    let normals: Vec<Vec3> = (0..500).map(|_| random_unit(&mut rng)).collect();
    let tolerance = AngleTolerance::from_degrees(75.0).expect("valid");
    let bindings = index.bind_points(&points, &normals, tolerance).expect("same lengths");

    for binding in bindings.iter().filter(|b| b.is_match()) {
        let bary = binding.barycentric;
        assert!((bary.sum() - 1.0).abs() < 1e-9);
        assert!(bary.to_array().iter().all(|w| (-1e-9..=1.0 + 1e-9).contains(w)));

        let tri = index.triangles().triangles()[binding.triangle.expect("matched")];
        let rebuilt = binding.evaluate(&tri).expect("matched");
        assert!(rebuilt.distance_to(binding.point) < 1e-7);
    }
}

#[test]
fn bindings_follow_a_translated_mesh() {
    let mut rng = StdRng::seed_from_u64(5);
    let positions: Vec<Point3> = (0..60).map(|_| random_point(&mut rng, 4.0)).collect();
    let indices: Vec<u32> = (0..40)
        .flat_map(|_| {
            [
                rng.random_range(0..60u32),
                rng.random_range(0..60u32),
                rng.random_range(0..60u32),
            ]
        })
        .collect();
    let set = TriangleSet::from_indexed(&positions, &indices, Winding::CounterClockwise).expect("valid mesh");
    let index = MeshIndex::build(set, &BvhBuildOptions::default());

    let points: Vec<Point3> = (0..100).map(|_| random_point(&mut rng, 5.0)).collect();
    let normals = vec![Vec3::Z; points.len()];
    let bindings = index
        .bind_points(&points, &normals, AngleTolerance::unconstrained())
        .expect("same lengths");

    let offset = Vec3::new(1.0, -2.0, 3.0);
    let moved: Vec<Point3> = positions.iter().map(|p| *p + offset).collect();
    for (binding, evaluated) in bindings.iter().zip(evaluate_bindings(&bindings, &moved, &indices)) {
        let evaluated = evaluated.expect("unconstrained queries always match");
        assert!(evaluated.distance_to(binding.point + offset) < 1e-9);
    }
}

#[test]
fn shared_index_answers_concurrent_queries() {
    let index = Arc::new(MeshIndex::build(
        TriangleSet::new(random_mesh(4, 1000)),
        &BvhBuildOptions::default(),
    ));
    let tolerance = AngleTolerance::from_degrees(90.0).expect("valid");

    let mut rng = StdRng::seed_from_u64(77);
    let queries: Arc<Vec<(Point3, Vec3)>> = Arc::new(
        (0..400)
            .map(|_| (random_point(&mut rng, 6.0), random_unit(&mut rng)))
            .collect(),
    );
    let expected: Vec<ProjectionResult> = queries
        .iter()
        .map(|(p, n)| index.closest_point(*p, *n, tolerance))
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            let queries = Arc::clone(&queries);
            thread::spawn(move || {
                queries
                    .iter()
                    .map(|(p, n)| index.closest_point(*p, *n, tolerance))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("query thread"), expected);
    }
}

#[test]
fn persisted_hierarchy_gives_identical_answers() {
    let triangles = random_mesh(6, 600);
    let index = MeshIndex::build(TriangleSet::new(triangles.clone()), &BvhBuildOptions::default());
    let bvh = from_bytes(&to_bytes(index.bvh())).expect("round trip");
    assert_eq!(&bvh, index.bvh());

    let restored = MeshIndex::from_parts(TriangleSet::new(triangles), bvh).expect("matching parts");
    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..100 {
        let point = random_point(&mut rng, 6.0);
        let normal = random_unit(&mut rng);
        let tolerance = AngleTolerance::default();
        assert_eq!(
            restored.closest_point(point, normal, tolerance),
            index.closest_point(point, normal, tolerance)
        );
    }
}

#[test]
fn rebuild_swaps_in_new_index() {
    let old = Arc::new(MeshIndex::build(TriangleSet::new(random_mesh(9, 50)), &BvhBuildOptions::low()));
    let reader = Arc::clone(&old);

    let new = Arc::new(old.rebuild(TriangleSet::new(random_mesh(10, 80))));
    assert_eq!(new.options(), &BvhBuildOptions::low());
    assert_eq!(new.triangles().len(), 80);
    assert_eq!(reader.triangles().len(), 50);
    reader.bvh().validate().expect("old index still valid");
}

#[test]
fn engine_facade_round_trip() {
    let mut engine = ProjectionEngine::new();
    engine
        .load_mesh(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
        )
        .expect("valid mesh");
    assert!(engine.is_loaded());
    assert_eq!(engine.triangle_count(), 1);

    let index = engine.index().expect("loaded");
    let result = index.closest_point(
        Point3::new(0.25, 0.25, 5.0),
        Vec3::Z,
        AngleTolerance::from_radians(std::f64::consts::FRAC_PI_2).expect("valid"),
    );
    assert_eq!(result.triangle, Some(0));
    assert_eq!(index.diagnostics().node_count, 1);
}
