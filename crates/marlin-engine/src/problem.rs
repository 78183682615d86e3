//! Preprocessing: lower an [`InputQuery`] into the form the search works on.
//!
//! Every linear equation `Σ aᵢxᵢ ⋈ c` becomes a definition row `s = Σ aᵢxᵢ`
//! for a fresh slack variable `s` whose bounds encode the relation. Every
//! equality a case split needs (`f = b`, `f = xᵢ`, ...) gets an auxiliary
//! variable defined the same way, so that splits only ever tighten bounds.
//!
//! Variable layout: query variables first, then auxiliaries in constraint
//! order, then slacks in equation order.

use marlin_core::{BoundStore, Equation, Relation, Result, Tightening, Tolerance, VarId};
use marlin_pwl::{Abs, Disjunction, LeakyRelu, Max, PiecewiseLinear, PwlConstraint, Relu, Sign};
use marlin_simplex::Row;
use tracing::debug;

use crate::query::{ConstraintDef, InputQuery};

struct Allocator {
    next: usize,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Allocator {
    fn fresh(&mut self, lower: f64, upper: f64) -> VarId {
        let var = VarId(self.next);
        self.next += 1;
        self.lower.push(lower);
        self.upper.push(upper);
        var
    }
}

/// The preprocessed problem. Immutable during search.
#[derive(Debug, Clone)]
pub struct Problem {
    query: InputQuery,
    num_vars: usize,
    definitions: Vec<Row>,
    constraints: Vec<PwlConstraint>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    equation_watchers: Vec<Vec<usize>>,
    constraint_watchers: Vec<Vec<usize>>,
    tolerance: Tolerance,
}

impl Problem {
    /// Validate and preprocess `query`.
    pub fn from_query(query: &InputQuery, tolerance: Tolerance) -> Result<Self> {
        query.validate()?;
        let n = query.num_vars();
        let mut alloc = Allocator {
            next: n,
            lower: (0..n).map(|i| query.lower_bound(VarId(i))).collect(),
            upper: (0..n).map(|i| query.upper_bound(VarId(i))).collect(),
        };
        let mut definitions = Vec::new();
        let mut constraints = Vec::with_capacity(query.constraints().len());

        for def in query.constraints() {
            let constraint: PwlConstraint = match def {
                ConstraintDef::Relu { b, f } => {
                    let aux = alloc.fresh(0.0, f64::INFINITY);
                    definitions.push(Row::new(aux, vec![(*f, 1.0), (*b, -1.0)]));
                    Relu::new(*b, *f, aux).into()
                }
                ConstraintDef::LeakyRelu { b, f, slope } => {
                    let active = alloc.fresh(f64::NEG_INFINITY, f64::INFINITY);
                    definitions.push(Row::new(active, vec![(*f, 1.0), (*b, -1.0)]));
                    let inactive = alloc.fresh(f64::NEG_INFINITY, f64::INFINITY);
                    definitions.push(Row::new(inactive, vec![(*f, 1.0), (*b, -slope)]));
                    LeakyRelu::new(*b, *f, *slope, active, inactive).into()
                }
                ConstraintDef::Abs { b, f } => {
                    let pos = alloc.fresh(0.0, f64::INFINITY);
                    definitions.push(Row::new(pos, vec![(*f, 1.0), (*b, -1.0)]));
                    let neg = alloc.fresh(0.0, f64::INFINITY);
                    definitions.push(Row::new(neg, vec![(*f, 1.0), (*b, 1.0)]));
                    Abs::new(*b, *f, pos, neg).into()
                }
                ConstraintDef::Sign { b, f } => Sign::new(*b, *f, &tolerance).into(),
                ConstraintDef::Max { inputs, output } => {
                    let aux = inputs
                        .iter()
                        .map(|x| {
                            let a = alloc.fresh(0.0, f64::INFINITY);
                            definitions.push(Row::new(a, vec![(*output, 1.0), (*x, -1.0)]));
                            a
                        })
                        .collect();
                    Max::new(inputs.clone(), *output, aux).into()
                }
                ConstraintDef::Disjunction { disjuncts } => {
                    let lowered = disjuncts
                        .iter()
                        .map(|d| {
                            d.iter()
                                .flat_map(|eq| lower_disjunct_equation(eq, &mut alloc, &mut definitions))
                                .collect()
                        })
                        .collect();
                    Disjunction::new(lowered).into()
                }
            };
            constraints.push(constraint);
        }

        for eq in query.equations() {
            let (lower, upper) = match eq.relation {
                Relation::Eq => (eq.scalar, eq.scalar),
                Relation::Le => (f64::NEG_INFINITY, eq.scalar),
                Relation::Ge => (eq.scalar, f64::INFINITY),
            };
            let slack = alloc.fresh(lower, upper);
            definitions.push(Row::new(slack, eq.merged_terms()));
        }

        let num_vars = alloc.next;
        let mut equation_watchers = vec![Vec::new(); num_vars];
        for (j, row) in definitions.iter().enumerate() {
            equation_watchers[row.basic.0].push(j);
            for &(var, _) in &row.terms {
                equation_watchers[var.0].push(j);
            }
        }
        let mut constraint_watchers = vec![Vec::new(); num_vars];
        for (i, c) in constraints.iter().enumerate() {
            let mut vars = c.variables();
            vars.sort();
            vars.dedup();
            for var in vars {
                constraint_watchers[var.0].push(i);
            }
        }

        debug!(
            query_vars = n,
            total_vars = num_vars,
            rows = definitions.len(),
            constraints = constraints.len(),
            "preprocessed query"
        );

        Ok(Self {
            query: query.clone(),
            num_vars,
            definitions,
            constraints,
            lower: alloc.lower,
            upper: alloc.upper,
            equation_watchers,
            constraint_watchers,
            tolerance,
        })
    }

    pub fn query(&self) -> &InputQuery {
        &self.query
    }

    /// Variables of the query itself, excluding auxiliaries and slacks.
    pub fn num_query_vars(&self) -> usize {
        self.query.num_vars()
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn definitions(&self) -> &[Row] {
        &self.definitions
    }

    pub fn num_definitions(&self) -> usize {
        self.definitions.len()
    }

    /// Definition row `j` as `-basic + Σ terms = 0`.
    pub fn row_terms(&self, j: usize) -> impl Iterator<Item = (VarId, f64)> + Clone + '_ {
        let row = &self.definitions[j];
        std::iter::once((row.basic, -1.0)).chain(row.terms.iter().copied())
    }

    pub fn constraints(&self) -> &[PwlConstraint] {
        &self.constraints
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    #[inline]
    pub fn constraint(&self, index: usize) -> &PwlConstraint {
        &self.constraints[index]
    }

    /// Definition rows mentioning `var`.
    #[inline]
    pub fn equation_watchers(&self, var: VarId) -> &[usize] {
        &self.equation_watchers[var.0]
    }

    /// Constraints mentioning `var`.
    #[inline]
    pub fn constraint_watchers(&self, var: VarId) -> &[usize] {
        &self.constraint_watchers[var.0]
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// Bounds before any propagation. Fails with the first variable whose
    /// bounds already cross.
    pub fn initial_bounds(&self) -> std::result::Result<BoundStore, VarId> {
        BoundStore::from_bounds(self.lower.clone(), self.upper.clone(), self.tolerance)
    }
}

/// Lower one disjunct equation to bound tightenings, introducing an
/// auxiliary variable when it spans several variables.
fn lower_disjunct_equation(
    eq: &Equation,
    alloc: &mut Allocator,
    definitions: &mut Vec<Row>,
) -> Vec<Tightening> {
    let terms = eq.merged_terms();
    let (var, coefficient) = match terms.as_slice() {
        [] => {
            let holds = match eq.relation {
                Relation::Eq => eq.scalar == 0.0,
                Relation::Le => 0.0 <= eq.scalar,
                Relation::Ge => 0.0 >= eq.scalar,
            };
            if holds {
                return Vec::new();
            }
            // Unsatisfiable: a variable pinned to zero that must reach one.
            let zero = alloc.fresh(f64::NEG_INFINITY, f64::INFINITY);
            definitions.push(Row::new(zero, Vec::new()));
            return vec![Tightening::lower(zero, 1.0)];
        }
        [(var, c)] => (*var, *c),
        _ => {
            let aux = alloc.fresh(f64::NEG_INFINITY, f64::INFINITY);
            definitions.push(Row::new(aux, terms));
            (aux, 1.0)
        }
    };
    let value = eq.scalar / coefficient;
    // Dividing by a negative coefficient flips the relation.
    let relation = match (eq.relation, coefficient < 0.0) {
        (Relation::Le, true) => Relation::Ge,
        (Relation::Ge, true) => Relation::Le,
        (r, _) => r,
    };
    match relation {
        Relation::Eq => vec![Tightening::lower(var, value), Tightening::upper(var, value)],
        Relation::Le => vec![Tightening::upper(var, value)],
        Relation::Ge => vec![Tightening::lower(var, value)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlin_core::MarlinError;
    use marlin_pwl::ConstraintKind;

    #[test]
    fn test_layout_and_watchers() {
        let mut q = InputQuery::with_variables(3);
        q.add_equality(&[VarId(0), VarId(1)], &[2.0, -1.0], 0.0, false)
            .unwrap();
        q.add_relu(VarId(1), VarId(2));
        q.set_lower_bound(VarId(0), -1.0);
        q.set_upper_bound(VarId(0), 1.0);

        let p = Problem::from_query(&q, Tolerance::DEFAULT).unwrap();
        // x0..x2, relu aux x3, slack x4
        assert_eq!(p.num_query_vars(), 3);
        assert_eq!(p.num_vars(), 5);
        assert_eq!(p.num_definitions(), 2);
        assert_eq!(p.definitions()[0].basic, VarId(3));
        assert_eq!(p.definitions()[1].basic, VarId(4));
        assert_eq!(p.constraint(0).kind(), ConstraintKind::Relu);
        assert_eq!(p.equation_watchers(VarId(1)), &[0, 1]);
        assert_eq!(p.constraint_watchers(VarId(3)), &[0]);

        let bounds = p.initial_bounds().unwrap();
        assert_eq!(bounds.lower(VarId(3)), 0.0);
        assert_eq!(bounds.get(VarId(4)).lower, 0.0);
        assert_eq!(bounds.get(VarId(4)).upper, 0.0);
    }

    #[test]
    fn test_row_terms_sum_to_zero_on_definition() {
        let mut q = InputQuery::with_variables(2);
        q.add_inequality(&[VarId(0), VarId(1)], &[1.0, 3.0], 4.0, true)
            .unwrap();
        let p = Problem::from_query(&q, Tolerance::DEFAULT).unwrap();
        let values = [1.0, 2.0, 7.0];
        let sum: f64 = p.row_terms(0).map(|(v, c)| c * values[v.0]).sum();
        assert_eq!(sum, 0.0);
        let bounds = p.initial_bounds().unwrap();
        assert_eq!(bounds.upper(VarId(2)), 4.0);
        assert_eq!(bounds.lower(VarId(2)), f64::NEG_INFINITY);
    }

    #[test]
    fn test_disjunction_lowering() {
        let mut q = InputQuery::with_variables(2);
        q.add_disjunction(vec![
            vec![Equation::from_terms(&[VarId(0)], &[-2.0], 1.0, Relation::Le)],
            vec![Equation::from_terms(
                &[VarId(0), VarId(1)],
                &[1.0, 1.0],
                3.0,
                Relation::Eq,
            )],
        ]);
        let p = Problem::from_query(&q, Tolerance::DEFAULT).unwrap();
        let PwlConstraint::Disjunction(d) = p.constraint(0) else {
            panic!("expected a disjunction");
        };
        // -2·x0 ≤ 1  ⇒  x0 ≥ -0.5
        assert_eq!(d.disjuncts()[0], vec![Tightening::lower(VarId(0), -0.5)]);
        // x0 + x1 = 3 through aux x2
        assert_eq!(
            d.disjuncts()[1],
            vec![Tightening::lower(VarId(2), 3.0), Tightening::upper(VarId(2), 3.0)]
        );
        assert_eq!(p.definitions()[0].basic, VarId(2));
    }

    #[test]
    fn test_invalid_query_is_rejected() {
        let mut q = InputQuery::with_variables(1);
        q.add_relu(VarId(0), VarId(3));
        let err = Problem::from_query(&q, Tolerance::DEFAULT).unwrap_err();
        assert!(matches!(err, MarlinError::VariableOutOfRange { .. }));
    }

    #[test]
    fn test_crossing_query_bounds() {
        let mut q = InputQuery::with_variables(1);
        q.set_lower_bound(VarId(0), 2.0);
        q.set_upper_bound(VarId(0), 1.0);
        let p = Problem::from_query(&q, Tolerance::DEFAULT).unwrap();
        assert_eq!(p.initial_bounds().unwrap_err(), VarId(0));
    }
}
