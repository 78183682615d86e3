//! Verify a toy ReLU network and print the verdicts
//!
//! Run with: RUST_LOG=marlin_engine=debug cargo run -p marlin-engine --example toy_network

use marlin_core::Bound;
use marlin_engine::{
    Engine, EngineConfig, FeedForwardNetwork, Layer, LinearLayer, RobustnessOutcome,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // y = relu(x) - relu(-x), i.e. the identity through two units
    let net = FeedForwardNetwork::new(1)
        .with_layer(Layer::Linear(LinearLayer::new(
            vec![vec![1.0], vec![-1.0]],
            vec![0.0, 0.0],
        )?))?
        .with_layer(Layer::Relu)?
        .with_layer(Layer::Linear(LinearLayer::new(vec![vec![1.0, -1.0]], vec![0.0])?))?;

    let engine = Engine::new(EngineConfig::default());

    for threshold in [0.75, 1.5] {
        let mut encoded = net.encode(&[Bound::new(-1.0, 1.0)])?;
        let y = encoded.outputs[0];
        encoded.query.set_lower_bound(y, threshold);
        let outcome = engine.solve(&encoded.query)?;
        println!(
            "y >= {threshold}: {} ({} nodes)",
            outcome.verdict.exit_code(),
            outcome.stats.nodes
        );
        if let Some(assignment) = outcome.verdict.assignment() {
            println!("  x = {:?}, y = {:?}", assignment.input_values(), assignment.output_values());
        }
    }

    match engine.local_robustness(&net, &[0.5], 0.25, 0, None)? {
        RobustnessOutcome::Robust => println!("single output: trivially robust"),
        other => println!("robustness: {other:?}"),
    }
    Ok(())
}
