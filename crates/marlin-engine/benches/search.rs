//! Criterion benchmarks for the Marlin search engine
//!
//! Run with: cargo bench -p marlin-engine
//! HTML reports: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use marlin_core::Bound;
use marlin_engine::{Engine, EngineConfig, FeedForwardNetwork, Layer, LinearLayer};

/// Deterministic width × depth ReLU network with alternating-sign weights.
fn make_network(inputs: usize, width: usize, depth: usize) -> FeedForwardNetwork {
    let mut net = FeedForwardNetwork::new(inputs);
    let mut fan_in = inputs;
    for layer in 0..depth {
        let weights = (0..width)
            .map(|i| {
                (0..fan_in)
                    .map(|j| {
                        let sign = if (i + j + layer) % 2 == 0 { 1.0 } else { -1.0 };
                        sign * (1.0 + ((i * 7 + j * 3) % 5) as f64) / 5.0
                    })
                    .collect()
            })
            .collect();
        let bias = (0..width).map(|i| ((i % 3) as f64 - 1.0) * 0.1).collect();
        net.add_layer(Layer::Linear(LinearLayer::new(weights, bias).unwrap()))
            .unwrap();
        net.add_layer(Layer::Relu).unwrap();
        fan_in = width;
    }
    let out = vec![(0..fan_in).map(|j| if j % 2 == 0 { 1.0 } else { -1.0 }).collect()];
    net.add_layer(Layer::Linear(LinearLayer::new(out, vec![0.0]).unwrap()))
        .unwrap();
    net
}

// ============================================================================
// Root propagation
// ============================================================================

fn bench_calculate_bounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bounds/ReLU");
    let engine = Engine::default();

    for (width, depth) in [(4, 2), (8, 2), (8, 4)] {
        let net = make_network(2, width, depth);
        let encoded = net.encode(&[Bound::new(-1.0, 1.0); 2]).unwrap();
        group.bench_with_input(
            BenchmarkId::new("calculate_bounds", format!("{width}x{depth}")),
            &encoded.query,
            |b, query| b.iter(|| engine.calculate_bounds(black_box(query))),
        );
    }
    group.finish();
}

// ============================================================================
// Full search
// ============================================================================

fn bench_output_bound(c: &mut Criterion) {
    let mut group = c.benchmark_group("Search/OutputBound");
    group.sample_size(20);
    let engine = Engine::new(EngineConfig::default().with_max_nodes(50_000));

    for (width, depth) in [(4, 2), (6, 2), (4, 3)] {
        let net = make_network(2, width, depth);
        group.bench_with_input(
            BenchmarkId::new("output_bound", format!("{width}x{depth}")),
            &net,
            |b, net| {
                b.iter(|| {
                    let mut encoded = net.encode(&[Bound::new(-1.0, 1.0); 2]).unwrap();
                    let y = encoded.outputs[0];
                    // Push the output above anything the network can reach.
                    encoded
                        .query
                        .add_inequality(&[y], &[-1.0], -1e3, true)
                        .unwrap();
                    engine.solve(black_box(&encoded.query))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_calculate_bounds, bench_output_bound);
criterion_main!(benches);
