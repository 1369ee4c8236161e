use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rgbd_camera::{triangulate, CalibrationRecord, CameraModel};
use std::hint::black_box;

fn posed_camera(rvec: [f64; 3], tvec: [f64; 3]) -> CameraModel {
    let mut camera = CameraModel::new(
        &[[613.0, 0.0, 638.2], [0.0, 612.5, 367.9], [0.0, 0.0, 1.0]],
        &[0.52, -2.61, 0.0007, -0.0002, 1.47, 0.40, -2.44, 1.40],
    )
    .unwrap();
    camera
        .import_calibration(&CalibrationRecord {
            rotation_vector: Some(rvec),
            translation_vector: Some(tvec),
            ..Default::default()
        })
        .unwrap();
    camera
}

fn random_points(n: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.2..0.2),
            ]
        })
        .collect()
}

fn bench_camera(c: &mut Criterion) {
    let left = posed_camera([0.05, 0.3, 0.0], [-0.3, 0.05, 1.4]);
    let right = posed_camera([-0.05, -0.3, 0.02], [0.3, -0.02, 1.5]);

    let mut group = c.benchmark_group("Camera");
    for &n in &[100usize, 1000, 10000] {
        let points = random_points(n, 0);
        let x1 = left.project_points(&points).unwrap();
        let x2 = right.project_points(&points).unwrap();
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("project_points", n), &points, |b, p| {
            b.iter(|| black_box(left.project_points(p)))
        });

        group.bench_with_input(BenchmarkId::new("triangulate", n), &n, |b, _| {
            b.iter(|| black_box(triangulate(&left, &right, &x1, &x2)))
        });
    }

    for &(h, w) in &[(240usize, 320usize), (720, 1280)] {
        let cloud = Array3::<f64>::from_elem((h, w, 3), 1000.0);
        group.bench_with_input(
            BenchmarkId::new("transform_to_reference_frame", format!("{h}x{w}")),
            &cloud,
            |b, cloud| b.iter(|| black_box(left.transform_array_to_reference_frame(cloud.view()))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_camera);
criterion_main!(benches);
