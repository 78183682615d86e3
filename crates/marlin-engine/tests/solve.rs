//! End-to-end queries through [`Engine::solve`].

use marlin_core::{Equation, MarlinError, Relation, VarId};
use marlin_engine::{
    BoundsOutcome, Engine, EngineConfig, InputQuery, PivotRule, UnknownReason, Verdict,
};

const TOL: f64 = 1e-6;

fn solve(query: &InputQuery) -> Verdict {
    Engine::default().solve(query).unwrap().verdict
}

/// y = relu(x), x ∈ [-1, 1], y ≥ `threshold`.
fn toy_relu(threshold: f64) -> InputQuery {
    let mut q = InputQuery::new();
    let x = q.new_variable();
    let y = q.new_variable();
    q.add_relu(x, y);
    q.set_lower_bound(x, -1.0);
    q.set_upper_bound(x, 1.0);
    q.set_lower_bound(y, threshold);
    q.mark_input(x);
    q.mark_output(y);
    q
}

/// y = relu(x) + relu(-x) through two units, property y ≥ 0.5.
fn two_units() -> InputQuery {
    let mut q = InputQuery::with_variables(5);
    let (x, u, a, b, y) = (VarId(0), VarId(1), VarId(2), VarId(3), VarId(4));
    q.add_equality(&[x, u], &[1.0, 1.0], 0.0, false).unwrap();
    q.add_relu(x, a);
    q.add_relu(u, b);
    q.add_equality(&[a, b, y], &[1.0, 1.0, -1.0], 0.0, false)
        .unwrap();
    q.add_inequality(&[y], &[-1.0], -0.5, true).unwrap();
    q.set_lower_bound(x, -1.0);
    q.set_upper_bound(x, 1.0);
    q.mark_input(x);
    q.mark_output(y);
    q
}

#[test]
fn relu_reachable_output_is_sat() {
    let verdict = solve(&toy_relu(0.75));
    let assignment = verdict.assignment().expect("expected sat");
    let x = assignment.value(VarId(0));
    let y = assignment.value(VarId(1));
    assert!(x > 0.5, "x = {x}");
    assert!((y - x.max(0.0)).abs() < TOL);
    assert!(y >= 0.75 - TOL);
}

#[test]
fn relu_unreachable_output_is_unsat() {
    assert_eq!(solve(&toy_relu(1.5)), Verdict::Unsat);
}

#[test]
fn split_query_is_sat_under_both_pivot_rules() {
    for rule in [PivotRule::Bland, PivotRule::Dantzig] {
        let engine = Engine::new(EngineConfig::default().with_pivot_rule(rule));
        let outcome = engine.solve(&two_units()).unwrap();
        let assignment = outcome.verdict.assignment().expect("expected sat");
        assert!(assignment.value(VarId(0)).abs() >= 0.5 - TOL);
        assert!(assignment.value(VarId(4)) >= 0.5 - TOL);
    }
}

#[test]
fn split_query_becomes_unsat_with_narrow_input() {
    let mut q = two_units();
    q.set_lower_bound(VarId(0), -0.25);
    q.set_upper_bound(VarId(0), 0.25);
    assert_eq!(solve(&q), Verdict::Unsat);
}

#[test]
fn search_is_deterministic() {
    let engine = Engine::default();
    let first = engine.solve(&two_units()).unwrap();
    let second = engine.solve(&two_units()).unwrap();
    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.stats.nodes, second.stats.nodes);
    assert_eq!(first.stats.backtracks, second.stats.backtracks);
    assert_eq!(first.stats.pivots, second.stats.pivots);
}

#[test]
fn max_selects_the_only_viable_input() {
    // y = max(x0, x1, x2), x0, x1 ≤ 0.5, y ≥ 0.9
    let mut q = InputQuery::with_variables(4);
    let xs = vec![VarId(0), VarId(1), VarId(2)];
    let y = VarId(3);
    q.add_max(xs.clone(), y);
    for &x in &xs {
        q.set_lower_bound(x, 0.0);
        q.set_upper_bound(x, 1.0);
    }
    q.set_upper_bound(VarId(0), 0.5);
    q.set_upper_bound(VarId(1), 0.5);
    q.set_lower_bound(y, 0.9);

    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(2)) >= 0.9 - TOL);
    let max = xs.iter().map(|&x| a.value(x)).fold(f64::NEG_INFINITY, f64::max);
    assert!((a.value(y) - max).abs() < TOL);
}

#[test]
fn max_with_three_way_split() {
    // y = max(x0, x1, x2) with x0 + x1 + x2 = 1.5 forces y ≥ 0.5.
    let mut q = InputQuery::with_variables(4);
    let xs = [VarId(0), VarId(1), VarId(2)];
    q.add_max(xs.to_vec(), VarId(3));
    q.add_equality(&xs, &[1.0, 1.0, 1.0], 1.5, false).unwrap();
    for &x in &xs {
        q.set_lower_bound(x, 0.0);
        q.set_upper_bound(x, 1.0);
    }
    q.set_upper_bound(VarId(3), 0.45);
    assert_eq!(solve(&q), Verdict::Unsat);

    q.set_upper_bound(VarId(3), 0.55);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    let max = xs.iter().map(|&x| a.value(x)).fold(f64::NEG_INFINITY, f64::max);
    assert!((a.value(VarId(3)) - max).abs() < TOL);
}

#[test]
fn abs_reaches_negative_side() {
    let mut q = InputQuery::with_variables(2);
    q.add_abs(VarId(0), VarId(1));
    q.set_lower_bound(VarId(0), -2.0);
    q.set_upper_bound(VarId(0), 1.0);
    q.set_lower_bound(VarId(1), 1.5);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(0)) <= -1.5 + TOL);
    assert!((a.value(VarId(1)) - a.value(VarId(0)).abs()).abs() < TOL);
}

#[test]
fn sign_conflicts_with_input_side() {
    // sign(x) = 1 but x ≤ -0.1
    let mut q = InputQuery::with_variables(2);
    q.add_sign(VarId(0), VarId(1));
    q.set_lower_bound(VarId(0), -1.0);
    q.set_upper_bound(VarId(0), -0.1);
    q.set_lower_bound(VarId(1), 0.5);
    assert_eq!(solve(&q), Verdict::Unsat);

    q.set_upper_bound(VarId(0), 1.0);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(0)) >= -TOL);
    assert!((a.value(VarId(1)) - 1.0).abs() < TOL);
}

/// y = sign(-relu(x)), x ∈ [-1, 1], y ≤ -0.5.
fn sign_after_relu() -> InputQuery {
    let mut q = InputQuery::with_variables(4);
    let (x, r, b, y) = (VarId(0), VarId(1), VarId(2), VarId(3));
    q.add_relu(x, r);
    // b = -r
    q.add_equality(&[b, r], &[1.0, 1.0], 0.0, false).unwrap();
    q.add_sign(b, y);
    q.set_lower_bound(x, -1.0);
    q.set_upper_bound(x, 1.0);
    q.add_inequality(&[y], &[1.0], -0.5, true).unwrap();
    q.mark_input(x);
    q.mark_output(y);
    q
}

#[test]
fn sign_of_zero_is_positive() {
    // Non-positive x gives b = 0, and sign(0) = 1.
    let mut q = sign_after_relu();
    q.set_upper_bound(VarId(0), 0.0);
    assert_eq!(solve(&q), Verdict::Unsat);

    // Positive x gives b < 0, so a negative sign is reachable there only.
    let verdict = solve(&sign_after_relu());
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(0)) > 0.0);
    assert!(a.value(VarId(2)) < 0.0);
    assert!((a.value(VarId(3)) + 1.0).abs() < TOL);
}

#[test]
fn sign_output_matches_zero_convention_at_boundary() {
    // y = sign(x) with x pinned to 0 can only be 1.
    let mut q = InputQuery::with_variables(2);
    q.add_sign(VarId(0), VarId(1));
    q.set_lower_bound(VarId(0), 0.0);
    q.set_upper_bound(VarId(0), 0.0);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!((a.value(VarId(1)) - 1.0).abs() < TOL);

    q.set_upper_bound(VarId(1), -0.5);
    assert_eq!(solve(&q), Verdict::Unsat);
}

#[test]
fn leaky_relu_negative_slope() {
    // y = leaky(x, 0.1), y ≤ -0.05 needs x ≤ -0.5
    let mut q = InputQuery::with_variables(2);
    q.add_leaky_relu(VarId(0), VarId(1), 0.1);
    q.set_lower_bound(VarId(0), -1.0);
    q.set_upper_bound(VarId(0), 1.0);
    q.set_upper_bound(VarId(1), -0.05);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(0)) <= -0.5 + TOL);

    q.set_lower_bound(VarId(0), -0.4);
    assert_eq!(solve(&q), Verdict::Unsat);
}

#[test]
fn disjunction_excludes_middle() {
    // (x ≤ -0.5) ∨ (x + y ≥ 0.5)
    let mut q = InputQuery::with_variables(2);
    q.add_disjunction(vec![
        vec![Equation::from_terms(&[VarId(0)], &[1.0], -0.5, Relation::Le)],
        vec![Equation::from_terms(
            &[VarId(0), VarId(1)],
            &[1.0, 1.0],
            0.5,
            Relation::Ge,
        )],
    ]);
    q.set_lower_bound(VarId(0), -0.25);
    q.set_upper_bound(VarId(0), 0.25);
    q.set_lower_bound(VarId(1), 0.0);
    q.set_upper_bound(VarId(1), 0.2);
    assert_eq!(solve(&q), Verdict::Unsat);

    q.set_upper_bound(VarId(1), 0.3);
    let verdict = solve(&q);
    let a = verdict.assignment().expect("expected sat");
    assert!(a.value(VarId(0)) + a.value(VarId(1)) >= 0.5 - TOL);
}

#[test]
fn exhausted_pivot_budget_is_unknown_not_unsat() {
    // x + y ≥ 1 over the unit box: the starting point is infeasible, so the
    // tableau has to pivot at least once.
    let mut q = InputQuery::with_variables(2);
    q.add_inequality(&[VarId(0), VarId(1)], &[-1.0, -1.0], -1.0, true)
        .unwrap();
    for v in [VarId(0), VarId(1)] {
        q.set_lower_bound(v, 0.0);
        q.set_upper_bound(v, 1.0);
    }

    let starved = Engine::new(EngineConfig::default().with_max_pivots(0));
    let outcome = starved.solve(&q).unwrap();
    assert_eq!(outcome.verdict, Verdict::Unknown(UnknownReason::Numerical));
    assert!(outcome.stats.numerical_prunes > 0);
    assert_eq!(outcome.verdict.exit_code(), "UNKNOWN");

    assert!(solve(&q).is_sat());
}

#[test]
fn malformed_query_is_an_error() {
    let mut q = InputQuery::with_variables(1);
    q.add_relu(VarId(0), VarId(7));
    let err = Engine::default().solve(&q).unwrap_err();
    assert!(err.is_malformed_problem());
    assert!(matches!(err, MarlinError::VariableOutOfRange { var: 7, .. }));
}

#[test]
fn abort_before_solve_is_interrupted() {
    let engine = Engine::default();
    engine.abort_handle().abort();
    let outcome = engine.solve(&two_units()).unwrap();
    assert_eq!(outcome.verdict, Verdict::Unknown(UnknownReason::Interrupted));
    assert_eq!(outcome.verdict.exit_code(), "QUIT_REQUESTED");
}

#[test]
fn calculate_bounds_through_relu() {
    // z = 2·relu(x) - 1
    let mut q = InputQuery::with_variables(3);
    q.add_relu(VarId(0), VarId(1));
    q.add_equality(&[VarId(1), VarId(2)], &[2.0, -1.0], 1.0, false)
        .unwrap();
    q.set_lower_bound(VarId(0), -1.0);
    q.set_upper_bound(VarId(0), 1.0);

    let outcome = Engine::default().calculate_bounds(&q).unwrap();
    let bounds = outcome.bounds().expect("feasible");
    assert!((bounds[1].lower - 0.0).abs() < TOL);
    assert!((bounds[1].upper - 1.0).abs() < TOL);
    assert!((bounds[2].lower + 1.0).abs() < TOL);
    assert!((bounds[2].upper - 1.0).abs() < TOL);

    q.set_lower_bound(VarId(2), 1.5);
    assert_eq!(
        Engine::default().calculate_bounds(&q).unwrap(),
        BoundsOutcome::Infeasible
    );
}

#[test]
fn saved_query_solves_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two_units.json");
    let query = two_units();
    query.save(&path).unwrap();
    let loaded = InputQuery::load(&path).unwrap();
    assert_eq!(loaded, query);
    assert_eq!(solve(&loaded), solve(&query));
}

#[test]
fn cleared_property_is_sat() {
    let mut q = toy_relu(1.5);
    assert_eq!(solve(&q), Verdict::Unsat);
    q.clear_property();
    assert!(solve(&q).is_sat());
}
