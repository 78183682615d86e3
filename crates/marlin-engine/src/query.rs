//! The input query: variables, linear equations, piecewise-linear
//! constraints and bounds, as produced by a network encoder.

use marlin_core::{Equation, MarlinError, Relation, Result, Tolerance, VarId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A piecewise-linear relation between query variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintDef {
    Relu { b: VarId, f: VarId },
    LeakyRelu { b: VarId, f: VarId, slope: f64 },
    Abs { b: VarId, f: VarId },
    Sign { b: VarId, f: VarId },
    Max { inputs: Vec<VarId>, output: VarId },
    /// Holds when all equations of at least one disjunct hold.
    Disjunction { disjuncts: Vec<Vec<Equation>> },
}

impl ConstraintDef {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintDef::Relu { .. } => "relu",
            ConstraintDef::LeakyRelu { .. } => "leaky_relu",
            ConstraintDef::Abs { .. } => "abs",
            ConstraintDef::Sign { .. } => "sign",
            ConstraintDef::Max { .. } => "max",
            ConstraintDef::Disjunction { .. } => "disjunction",
        }
    }

    pub fn variables(&self) -> Vec<VarId> {
        match self {
            ConstraintDef::Relu { b, f }
            | ConstraintDef::LeakyRelu { b, f, .. }
            | ConstraintDef::Abs { b, f }
            | ConstraintDef::Sign { b, f } => vec![*b, *f],
            ConstraintDef::Max { inputs, output } => {
                let mut vars = inputs.clone();
                vars.push(*output);
                vars
            }
            ConstraintDef::Disjunction { disjuncts } => disjuncts
                .iter()
                .flatten()
                .flat_map(|e| e.variables())
                .collect(),
        }
    }

    /// Whether `values` satisfies the relation, up to `tol`.
    pub fn holds(&self, values: &[f64], tol: &Tolerance) -> bool {
        match self {
            ConstraintDef::Relu { b, f } => tol.approx_eq(values[f.0], values[b.0].max(0.0)),
            ConstraintDef::LeakyRelu { b, f, slope } => {
                let x = values[b.0];
                let expected = if x >= 0.0 { x } else { slope * x };
                tol.approx_eq(values[f.0], expected)
            }
            ConstraintDef::Abs { b, f } => tol.approx_eq(values[f.0], values[b.0].abs()),
            ConstraintDef::Sign { b, f } => tol.approx_eq(values[f.0], tol.sign(values[b.0])),
            ConstraintDef::Max { inputs, output } => {
                let expected = inputs
                    .iter()
                    .map(|x| values[x.0])
                    .fold(f64::NEG_INFINITY, f64::max);
                tol.approx_eq(values[output.0], expected)
            }
            ConstraintDef::Disjunction { disjuncts } => disjuncts
                .iter()
                .any(|d| d.iter().all(|e| e.is_satisfied(values, tol))),
        }
    }
}

/// A verification query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputQuery {
    num_vars: usize,
    #[serde(default)]
    equations: Vec<Equation>,
    /// Equations that encode the property rather than the network.
    #[serde(default)]
    property_equations: Vec<Equation>,
    #[serde(default)]
    constraints: Vec<ConstraintDef>,
    #[serde(default)]
    lower_bounds: BTreeMap<VarId, f64>,
    #[serde(default)]
    upper_bounds: BTreeMap<VarId, f64>,
    #[serde(default)]
    input_vars: Vec<VarId>,
    #[serde(default)]
    output_vars: Vec<VarId>,
}

impl InputQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query with `num_vars` variables and nothing else.
    pub fn with_variables(num_vars: usize) -> Self {
        Self {
            num_vars,
            ..Self::default()
        }
    }

    pub fn new_variable(&mut self) -> VarId {
        let var = VarId(self.num_vars);
        self.num_vars += 1;
        var
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn set_num_vars(&mut self, num_vars: usize) {
        self.num_vars = num_vars;
    }

    pub fn add_equation(&mut self, equation: Equation, is_property: bool) {
        if is_property {
            self.property_equations.push(equation);
        } else {
            self.equations.push(equation);
        }
    }

    /// `Σ coeffs[i]·vars[i] = scalar`.
    pub fn add_equality(
        &mut self,
        vars: &[VarId],
        coeffs: &[f64],
        scalar: f64,
        is_property: bool,
    ) -> Result<()> {
        self.add_linear(vars, coeffs, scalar, Relation::Eq, is_property)
    }

    /// `Σ coeffs[i]·vars[i] ≤ scalar`.
    pub fn add_inequality(
        &mut self,
        vars: &[VarId],
        coeffs: &[f64],
        scalar: f64,
        is_property: bool,
    ) -> Result<()> {
        self.add_linear(vars, coeffs, scalar, Relation::Le, is_property)
    }

    fn add_linear(
        &mut self,
        vars: &[VarId],
        coeffs: &[f64],
        scalar: f64,
        relation: Relation,
        is_property: bool,
    ) -> Result<()> {
        if vars.len() != coeffs.len() {
            return Err(MarlinError::ShapeMismatch {
                context: "equation coefficients",
                expected: vars.len(),
                got: coeffs.len(),
            });
        }
        self.add_equation(
            Equation::from_terms(vars, coeffs, scalar, relation),
            is_property,
        );
        Ok(())
    }

    /// Network equations followed by property equations.
    pub fn equations(&self) -> impl Iterator<Item = &Equation> {
        self.equations.iter().chain(&self.property_equations)
    }

    pub fn num_equations(&self) -> usize {
        self.equations.len() + self.property_equations.len()
    }

    /// Set a lower bound. `-∞` removes it.
    pub fn set_lower_bound(&mut self, var: VarId, value: f64) {
        if value == f64::NEG_INFINITY {
            self.lower_bounds.remove(&var);
        } else {
            self.lower_bounds.insert(var, value);
        }
    }

    /// Set an upper bound. `+∞` removes it.
    pub fn set_upper_bound(&mut self, var: VarId, value: f64) {
        if value == f64::INFINITY {
            self.upper_bounds.remove(&var);
        } else {
            self.upper_bounds.insert(var, value);
        }
    }

    pub fn lower_bound(&self, var: VarId) -> f64 {
        self.lower_bounds
            .get(&var)
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn upper_bound(&self, var: VarId) -> f64 {
        self.upper_bounds.get(&var).copied().unwrap_or(f64::INFINITY)
    }

    pub fn lower_bound_exists(&self, var: VarId) -> bool {
        self.lower_bounds.contains_key(&var)
    }

    pub fn upper_bound_exists(&self, var: VarId) -> bool {
        self.upper_bounds.contains_key(&var)
    }

    pub fn add_relu(&mut self, b: VarId, f: VarId) {
        self.constraints.push(ConstraintDef::Relu { b, f });
    }

    pub fn add_leaky_relu(&mut self, b: VarId, f: VarId, slope: f64) {
        self.constraints.push(ConstraintDef::LeakyRelu { b, f, slope });
    }

    pub fn add_abs(&mut self, b: VarId, f: VarId) {
        self.constraints.push(ConstraintDef::Abs { b, f });
    }

    pub fn add_sign(&mut self, b: VarId, f: VarId) {
        self.constraints.push(ConstraintDef::Sign { b, f });
    }

    pub fn add_max(&mut self, inputs: Vec<VarId>, output: VarId) {
        self.constraints.push(ConstraintDef::Max { inputs, output });
    }

    pub fn add_disjunction(&mut self, disjuncts: Vec<Vec<Equation>>) {
        self.constraints
            .push(ConstraintDef::Disjunction { disjuncts });
    }

    pub fn constraints(&self) -> &[ConstraintDef] {
        &self.constraints
    }

    pub fn mark_input(&mut self, var: VarId) {
        self.input_vars.push(var);
    }

    pub fn mark_output(&mut self, var: VarId) {
        self.output_vars.push(var);
    }

    pub fn input_vars(&self) -> &[VarId] {
        &self.input_vars
    }

    pub fn output_vars(&self) -> &[VarId] {
        &self.output_vars
    }

    /// Drop every bound and every property equation, keeping the network.
    pub fn clear_property(&mut self) {
        self.lower_bounds.clear();
        self.upper_bounds.clear();
        self.property_equations.clear();
    }

    /// Reject queries that reference unknown variables or carry values the
    /// solver cannot reason about.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_vars;
        let check_var = |var: VarId| -> Result<()> {
            if var.0 >= n {
                Err(MarlinError::VariableOutOfRange {
                    var: var.0,
                    num_vars: n,
                })
            } else {
                Ok(())
            }
        };

        for (index, eq) in self.equations().enumerate() {
            validate_equation(index, eq, &check_var)?;
        }

        for (bounds, side) in [(&self.lower_bounds, "lower"), (&self.upper_bounds, "upper")] {
            for (&var, &value) in bounds {
                check_var(var)?;
                if !value.is_finite() {
                    return Err(MarlinError::InvalidBound {
                        var: var.0,
                        reason: format!("{side} bound is {value}"),
                    });
                }
            }
        }

        for (index, def) in self.constraints.iter().enumerate() {
            let invalid = |reason: &str| MarlinError::InvalidConstraint {
                index,
                reason: reason.to_string(),
            };
            for var in def.variables() {
                check_var(var)?;
            }
            match def {
                ConstraintDef::Relu { b, f }
                | ConstraintDef::Abs { b, f }
                | ConstraintDef::Sign { b, f }
                    if b == f =>
                {
                    return Err(invalid("input and output are the same variable"));
                }
                ConstraintDef::LeakyRelu { b, f, slope } => {
                    if b == f {
                        return Err(invalid("input and output are the same variable"));
                    }
                    if !(*slope > 0.0 && *slope < 1.0) {
                        return Err(invalid("leaky relu slope must lie in (0, 1)"));
                    }
                }
                ConstraintDef::Max { inputs, output } => {
                    if inputs.is_empty() {
                        return Err(invalid("max has no inputs"));
                    }
                    if inputs.contains(output) {
                        return Err(invalid("max output is also an input"));
                    }
                }
                ConstraintDef::Disjunction { disjuncts } => {
                    if disjuncts.is_empty() {
                        return Err(invalid("disjunction has no disjuncts"));
                    }
                    if disjuncts.iter().any(|d| d.is_empty()) {
                        return Err(invalid("disjunct has no constraints"));
                    }
                    for eq in disjuncts.iter().flatten() {
                        validate_equation(index, eq, &check_var)?;
                    }
                }
                _ => {}
            }
        }

        for &var in self.input_vars.iter().chain(&self.output_vars) {
            check_var(var)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the query as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a query written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

fn validate_equation(
    index: usize,
    eq: &Equation,
    check_var: &impl Fn(VarId) -> Result<()>,
) -> Result<()> {
    if !eq.scalar.is_finite() {
        return Err(MarlinError::NonFiniteValue {
            equation: index,
            detail: format!("scalar {}", eq.scalar),
        });
    }
    for addend in &eq.addends {
        check_var(addend.var)?;
        if !addend.coefficient.is_finite() {
            return Err(MarlinError::NonFiniteValue {
                equation: index,
                detail: format!("coefficient {} of {}", addend.coefficient, addend.var),
            });
        }
    }
    Ok(())
}
