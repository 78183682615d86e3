//! Property-based soundness of the search on random small networks.
//!
//! For a random network, input box and point inside the box, the point's
//! forward value is a witness: asking for an output at least that large must
//! never be answered UNSAT, and any SAT answer must be a real solution.

use marlin_core::Bound;
use marlin_engine::{
    Engine, EngineConfig, FeedForwardNetwork, Layer, LinearLayer, MaxPoolLayer, Verdict,
};
use proptest::prelude::*;

const TOL: f64 = 1e-6;

fn weights(rows: usize, cols: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-2.0..2.0f64, cols), rows)
}

fn network() -> impl Strategy<Value = FeedForwardNetwork> {
    (weights(3, 2), prop::collection::vec(-1.0..1.0f64, 3), weights(1, 3), -1.0..1.0f64).prop_map(
        |(w1, b1, w2, b2)| {
            FeedForwardNetwork::new(2)
                .with_layer(Layer::Linear(LinearLayer::new(w1, b1).unwrap()))
                .unwrap()
                .with_layer(Layer::Relu)
                .unwrap()
                .with_layer(Layer::Linear(LinearLayer::new(w2, vec![b2]).unwrap()))
                .unwrap()
        },
    )
}

fn activation() -> impl Strategy<Value = Layer> {
    prop_oneof![
        Just(Layer::Relu),
        (0.05..0.95f64).prop_map(|slope| Layer::LeakyRelu { slope }),
        Just(Layer::Abs),
        Just(Layer::Sign),
    ]
}

/// 2 → 4 → activation → pairwise max → 1.
fn mixed_network() -> impl Strategy<Value = FeedForwardNetwork> {
    (
        weights(4, 2),
        prop::collection::vec(-1.0..1.0f64, 4),
        activation(),
        weights(1, 2),
        -1.0..1.0f64,
    )
        .prop_map(|(w1, b1, act, w2, b2)| {
            FeedForwardNetwork::new(2)
                .with_layer(Layer::Linear(LinearLayer::new(w1, b1).unwrap()))
                .unwrap()
                .with_layer(act)
                .unwrap()
                .with_layer(Layer::MaxPool(MaxPoolLayer::strided(4, 2).unwrap()))
                .unwrap()
                .with_layer(Layer::Linear(LinearLayer::new(w2, vec![b2]).unwrap()))
                .unwrap()
        })
}

/// Box `[c - r, c + r]` per input and a point inside it, as fractions of `r`.
fn region() -> impl Strategy<Value = (Vec<Bound>, Vec<f64>)> {
    prop::collection::vec((-1.0..1.0f64, 0.05..1.0f64, -1.0..=1.0f64), 2).prop_map(|dims| {
        let bounds = dims.iter().map(|&(c, r, _)| Bound::new(c - r, c + r)).collect();
        let point = dims.iter().map(|&(c, r, t)| c + t * r).collect();
        (bounds, point)
    })
}

/// Ask for an output at least the witness value and check the answer
/// against the forward pass.
fn check_witness(
    net: &FeedForwardNetwork,
    bounds: &[Bound],
    point: &[f64],
) -> Result<(), TestCaseError> {
    let witness = net.evaluate(point).unwrap()[0];
    let mut encoded = net.encode(bounds).unwrap();
    let output = encoded.outputs[0];
    // output ≥ witness - margin
    encoded
        .query
        .add_inequality(&[output], &[-1.0], -(witness - 1e-4), true)
        .unwrap();

    let engine = Engine::new(EngineConfig::default().with_max_nodes(10_000));
    let outcome = engine.solve(&encoded.query).unwrap();
    prop_assert!(
        !outcome.verdict.is_unsat(),
        "witness {point:?} with output {witness} refuted"
    );

    if let Verdict::Sat(assignment) = outcome.verdict {
        let input = assignment.input_values();
        for (x, b) in input.iter().zip(bounds) {
            prop_assert!(*x >= b.lower - TOL && *x <= b.upper + TOL);
        }
        let forward = net.evaluate(&input).unwrap()[0];
        let claimed = assignment.output_values()[0];
        prop_assert!(
            (forward - claimed).abs() < 1e-5,
            "solver output {claimed} but network gives {forward}"
        );
        prop_assert!(claimed >= witness - 1e-4 - TOL);
    }
    Ok(())
}

fn check_bounds(
    net: &FeedForwardNetwork,
    bounds: &[Bound],
    point: &[f64],
) -> Result<(), TestCaseError> {
    let encoded = net.encode(bounds).unwrap();
    let computed = Engine::default().calculate_bounds(&encoded.query).unwrap();
    let all = computed.bounds().expect("a box is never infeasible");
    let y = net.evaluate(point).unwrap()[0];
    let out = all[encoded.outputs[0].index()];
    prop_assert!(
        out.lower - TOL <= y && y <= out.upper + TOL,
        "{y} outside [{}, {}]",
        out.lower,
        out.upper
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn witness_is_never_refuted(net in network(), (bounds, point) in region()) {
        check_witness(&net, &bounds, &point)?;
    }

    #[test]
    fn bounds_contain_every_forward_value(net in network(), (bounds, point) in region()) {
        check_bounds(&net, &bounds, &point)?;
    }

    #[test]
    fn witness_is_never_refuted_for_any_activation(net in mixed_network(), (bounds, point) in region()) {
        check_witness(&net, &bounds, &point)?;
    }

    #[test]
    fn bounds_contain_forward_value_for_any_activation(net in mixed_network(), (bounds, point) in region()) {
        check_bounds(&net, &bounds, &point)?;
    }
}

/// A sign unit whose pre-activation is exactly zero at the witness.
#[test]
fn sign_at_zero_pre_activation_matches_forward_pass() {
    let net = FeedForwardNetwork::new(2)
        .with_layer(Layer::Linear(
            LinearLayer::new(vec![vec![1.0, -1.0]], vec![0.0]).unwrap(),
        ))
        .unwrap()
        .with_layer(Layer::Sign)
        .unwrap()
        .with_layer(Layer::Linear(LinearLayer::new(vec![vec![-1.0]], vec![0.0]).unwrap()))
        .unwrap();
    // x0 = x1 gives sign(0) = 1, so the output is -1 there and the best
    // reachable output on the diagonal is -1.
    let bounds = [Bound::new(0.5, 0.5), Bound::new(0.5, 0.5)];
    assert_eq!(net.evaluate(&[0.5, 0.5]).unwrap(), vec![-1.0]);
    check_witness(&net, &bounds, &[0.5, 0.5]).unwrap();

    let mut encoded = net.encode(&bounds).unwrap();
    let output = encoded.outputs[0];
    encoded.query.set_lower_bound(output, 0.0);
    let verdict = Engine::default().solve(&encoded.query).unwrap().verdict;
    assert_eq!(verdict, Verdict::Unsat);
}
