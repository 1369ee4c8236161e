use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rgbd_geometry::distortion::{project_point, CameraIntrinsic, PolynomialDistortion};
use rgbd_geometry::linalg::array33_to_dmat3;
use rgbd_geometry::rotation::rotation_vector_to_matrix;
use rgbd_pnp::{solve_pnp, PnPMethod};

type PnpDataset = (Vec<[f64; 3]>, Vec<[f64; 2]>);

fn generate_dataset(num_points: usize, planar: bool, noise_px: f64, seed: u64) -> PnpDataset {
    let intr = CameraIntrinsic::new(800.0, 800.0, 640.0, 480.0);
    let r = array33_to_dmat3(&rotation_vector_to_matrix(&[0.1, -0.2, 0.05]));
    let t = DVec3::new(0.2, -0.1, 3.0);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = Vec::with_capacity(num_points);
    let mut image = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let p = [
            rng.random_range(-0.5..0.5),
            rng.random_range(-0.5..0.5),
            if planar { 0.0 } else { rng.random_range(-0.5..0.5) },
        ];
        let pc = r * DVec3::from(p) + t;
        let uv = project_point(&pc.to_array(), &intr, &PolynomialDistortion::none());
        world.push(p);
        image.push([
            uv[0] + rng.random_range(-noise_px..noise_px),
            uv[1] + rng.random_range(-noise_px..noise_px),
        ]);
    }
    (world, image)
}

fn bench_solve_pnp(c: &mut Criterion) {
    let intr = CameraIntrinsic::new(800.0, 800.0, 640.0, 480.0);
    for (name, planar) in [("pnp_general", false), ("pnp_planar", true)] {
        let mut group = c.benchmark_group(name);
        for &n in &[4usize, 8, 32, 128, 512] {
            let (world, image) = generate_dataset(n, planar, 0.5, 42);
            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| {
                    let res = solve_pnp(&world, &image, &intr, None, PnPMethod::default());
                    std::hint::black_box(res)
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_solve_pnp);
criterion_main!(benches);
