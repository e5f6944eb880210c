//! Benchmarks for the vector engine's hot paths: normalization, scalar/
//! binary/product quantization, and PQ-ranked search.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use vexfs_core::vector::{
    batch_normalize, binary_quantize, l2_normalize, pq_search, product_quantize, scalar_quantize, PqConfig, ScalarQuantizeKind,
    SimdCapabilities, VectorStats,
};
use vexfs_core::shared::clock::SystemClock;

const D: usize = 128;

fn make_input(n: usize) -> Vec<f32> {
    (0..D * n).map(|i| ((i % 97) as f32) - 48.0).collect()
}

fn bench_l2_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_normalize");
    for &n in &[16usize, 128, 512] {
        let input = make_input(n);
        let mut output = vec![0.0f32; D * n];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| l2_normalize(&input, &mut output, D, n).unwrap());
        });
    }
    group.finish();
}

fn bench_batch_normalize(c: &mut Criterion) {
    let stats = VectorStats::default();
    let clock = SystemClock::new();
    let mut group = c.benchmark_group("batch_normalize");
    for &n in &[16usize, 128] {
        let input = make_input(n);
        let mut output = vec![0.0f32; D * n];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| batch_normalize(&stats, &clock, &input, &mut output, D, n, 512).unwrap());
        });
    }
    group.finish();
}

fn bench_scalar_quantize(c: &mut Criterion) {
    let n = 256;
    let input = make_input(n);
    let mut output = vec![0i32; D * n];
    c.bench_function("scalar_quantize_int8", |b| {
        b.iter(|| scalar_quantize(&input, &mut output, D, n, ScalarQuantizeKind::Int8, 1.0, 0.0).unwrap());
    });
}

fn bench_binary_quantize(c: &mut Criterion) {
    let n = 256;
    let input = make_input(n);
    let mut output = vec![0u8; D.div_ceil(8) * n];
    c.bench_function("binary_quantize", |b| {
        b.iter(|| binary_quantize(&input, &mut output, D, n, 0.0).unwrap());
    });
}

fn bench_product_quantize(c: &mut Criterion) {
    let n = 256;
    let cfg = PqConfig {
        subspaces: 8,
        centroids: 16,
        training_iterations: 4,
    };
    let input = make_input(n);
    let mut codes = vec![0u8; cfg.subspaces * n];
    c.bench_function("product_quantize_untrained", |b| {
        b.iter(|| product_quantize(&input, &mut codes, D, n, &cfg, None).unwrap());
    });
}

fn bench_pq_search(c: &mut Criterion) {
    let n = 1024;
    let cfg = PqConfig {
        subspaces: 8,
        centroids: 16,
        training_iterations: 4,
    };
    let input = make_input(n);
    let mut codes = vec![0u8; cfg.subspaces * n];
    product_quantize(&input, &mut codes, D, n, &cfg, None).unwrap();
    let codebooks = vec![0.0f32; cfg.subspaces * cfg.centroids * (D / cfg.subspaces)];
    let query = make_input(1);
    c.bench_function("pq_search_top10_of_1024", |b| {
        b.iter(|| pq_search(&query, &codes, &codebooks, &cfg, D, n, 10).unwrap());
    });
}

fn bench_simd_detect(c: &mut Criterion) {
    c.bench_function("simd_capabilities_detect", |b| {
        b.iter(SimdCapabilities::detect);
    });
}

criterion_group!(
    benches,
    bench_l2_normalize,
    bench_batch_normalize,
    bench_scalar_quantize,
    bench_binary_quantize,
    bench_product_quantize,
    bench_pq_search,
    bench_simd_detect,
);
criterion_main!(benches);
