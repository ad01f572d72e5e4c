
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{Point3, Triangle};

/// `count` small random triangles scattered in a 20-unit cube.
pub(super) fn random_triangles(seed: u64, count: usize) -> Vec<Triangle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let base = Point3::new(
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
            );
            let mut corner = || {
                base + crate::geom::Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                )
            };
            Triangle::new(base, corner(), corner())
        })
        .collect()
}

pub(super) fn unit_triangle() -> Triangle {
    Triangle::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    )
}
