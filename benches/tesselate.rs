use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{ArrayD, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use ifem_vtk::writer::MeshState;
use ifem_vtk::{PatchId, SplinePatch, Tesselate};

/// open uniform knot vector for `n` control points of the given order
fn knot_vector(n: usize, order: usize) -> Vec<f64> {
    let spans = n - order + 1;
    let mut knots = vec![0.0; order];
    knots.extend((1..spans).map(|i| i as f64 / spans as f64));
    knots.extend(std::iter::repeat(1.0).take(order));
    knots
}

fn volume(n: usize) -> SplinePatch {
    let coefs: ArrayD<f64> = ArrayD::random(IxDyn(&[n, n, n, 3]), Uniform::new(0., 10.));
    SplinePatch::new(vec![knot_vector(n, 4); 3], vec![4; 3], coefs, false).unwrap()
}

fn tesselate_and_assemble(patch: &SplinePatch) {
    let mesh = patch.tesselate().unwrap();
    let mut state = MeshState::default();
    state.update_geometry(mesh, PatchId(0));
    black_box(state.assemble().unwrap());
}

fn tesselate_bench(c: &mut Criterion) {
    let small = volume(10);
    c.bench_function("tesselate cubic volume 10", |b| {
        b.iter(|| black_box(&small).tesselate().unwrap())
    });

    let large = volume(30);
    c.bench_function("tesselate cubic volume 30", |b| {
        b.iter(|| black_box(&large).tesselate().unwrap())
    });

    c.bench_function("tesselate and assemble 30", |b| {
        b.iter(|| tesselate_and_assemble(black_box(&large)))
    });
}

criterion_group!(benches, tesselate_bench);
criterion_main!(benches);
