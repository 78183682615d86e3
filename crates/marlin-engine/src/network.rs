//! Feed-forward networks and their encoding as input queries.

use marlin_core::{Bound, MarlinError, Result, Tolerance, VarId};
use serde::{Deserialize, Serialize};

use crate::query::InputQuery;
use crate::result::{Assignment, UnknownReason};

/// Dense affine layer, `y = W·x + b`, weights stored row-major by output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LinearLayer {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Result<Self> {
        let layer = Self { weights, bias };
        layer.check_shape()?;
        Ok(layer)
    }

    fn check_shape(&self) -> Result<()> {
        if self.weights.len() != self.bias.len() {
            return Err(MarlinError::ShapeMismatch {
                context: "linear layer bias",
                expected: self.weights.len(),
                got: self.bias.len(),
            });
        }
        let in_features = self.in_features();
        if let Some(row) = self.weights.iter().find(|row| row.len() != in_features) {
            return Err(MarlinError::ShapeMismatch {
                context: "linear layer weights",
                expected: in_features,
                got: row.len(),
            });
        }
        Ok(())
    }

    pub fn in_features(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    pub fn out_features(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }
}

/// Max over windows of input positions; one output per window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPoolLayer {
    windows: Vec<Vec<usize>>,
}

impl MaxPoolLayer {
    pub fn new(windows: Vec<Vec<usize>>) -> Result<Self> {
        let layer = Self { windows };
        layer.check_windows(usize::MAX)?;
        Ok(layer)
    }

    /// Every window is non-empty and only reads positions below `width`.
    fn check_windows(&self, width: usize) -> Result<()> {
        if self.windows.iter().any(Vec::is_empty) {
            return Err(MarlinError::ShapeMismatch {
                context: "max pool window",
                expected: 1,
                got: 0,
            });
        }
        if let Some(&i) = self.windows.iter().flatten().find(|&&i| i >= width) {
            return Err(MarlinError::ShapeMismatch {
                context: "max pool index",
                expected: width,
                got: i,
            });
        }
        Ok(())
    }

    /// Non-overlapping windows of `size` over `width` inputs. A trailing
    /// partial window is kept.
    pub fn strided(width: usize, size: usize) -> Result<Self> {
        let size = size.max(1);
        Self::new(
            (0..width)
                .step_by(size)
                .map(|start| (start..(start + size).min(width)).collect())
                .collect(),
        )
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.windows
            .iter()
            .map(|w| w.iter().map(|&i| x[i]).fold(f64::NEG_INFINITY, f64::max))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Linear(LinearLayer),
    Relu,
    LeakyRelu { slope: f64 },
    Abs,
    Sign,
    MaxPool(MaxPoolLayer),
}

impl Layer {
    fn output_width(&self, input_width: usize) -> usize {
        match self {
            Layer::Linear(l) => l.out_features(),
            Layer::MaxPool(p) => p.windows.len(),
            _ => input_width,
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Layer::Linear(l) => l.forward(x),
            Layer::Relu => x.iter().map(|v| v.max(0.0)).collect(),
            Layer::LeakyRelu { slope } => x
                .iter()
                .map(|&v| if v >= 0.0 { v } else { slope * v })
                .collect(),
            Layer::Abs => x.iter().map(|v| v.abs()).collect(),
            // Same zero convention as the solver's sign constraint.
            Layer::Sign => x.iter().map(|&v| Tolerance::DEFAULT.sign(v)).collect(),
            Layer::MaxPool(p) => p.forward(x),
        }
    }
}

/// A network encoded as a query, with the variables of its inputs and
/// outputs in order.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedNetwork {
    pub query: InputQuery,
    pub inputs: Vec<VarId>,
    pub outputs: Vec<VarId>,
}

/// Answer to a local robustness question.
#[derive(Debug, Clone, PartialEq)]
pub enum RobustnessOutcome {
    /// No point in the region changes the classification.
    Robust,
    /// A point in the region where `class` scores at least as high as the
    /// expected class.
    Adversarial { class: usize, assignment: Assignment },
    Unknown(UnknownReason),
}

impl RobustnessOutcome {
    pub fn is_robust(&self) -> bool {
        matches!(self, RobustnessOutcome::Robust)
    }
}

/// A sequential network with a fixed input width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    input_size: usize,
    layers: Vec<Layer>,
}

impl FeedForwardNetwork {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            layers: Vec::new(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.layers
            .iter()
            .fold(self.input_size, |width, layer| layer.output_width(width))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Append a layer, checking it accepts the current output width.
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        check_layer(self.layers.len(), self.output_size(), &layer)?;
        self.layers.push(layer);
        Ok(())
    }

    /// Re-run the layer checks of [`add_layer`](Self::add_layer) over the
    /// whole network. Deserialized networks bypass the builder, so
    /// [`evaluate`](Self::evaluate) and [`encode`](Self::encode) call this
    /// first.
    pub fn validate(&self) -> Result<()> {
        let mut width = self.input_size;
        for (index, layer) in self.layers.iter().enumerate() {
            check_layer(index, width, layer)?;
            width = layer.output_width(width);
        }
        Ok(())
    }

    pub fn with_layer(mut self, layer: Layer) -> Result<Self> {
        self.add_layer(layer)?;
        Ok(self)
    }

    /// Forward pass.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>> {
        if inputs.len() != self.input_size {
            return Err(MarlinError::ShapeMismatch {
                context: "network input",
                expected: self.input_size,
                got: inputs.len(),
            });
        }
        self.validate()?;
        Ok(self
            .layers
            .iter()
            .fold(inputs.to_vec(), |x, layer| layer.forward(&x)))
    }

    /// Encode the network as a query over inputs restricted to `input_bounds`.
    ///
    /// Every neuron gets one variable; affine layers become equations and
    /// activation layers become piecewise-linear constraints.
    pub fn encode(&self, input_bounds: &[Bound]) -> Result<EncodedNetwork> {
        if input_bounds.len() != self.input_size {
            return Err(MarlinError::ShapeMismatch {
                context: "input bounds",
                expected: self.input_size,
                got: input_bounds.len(),
            });
        }
        self.validate()?;
        let mut query = InputQuery::new();
        let inputs: Vec<VarId> = input_bounds
            .iter()
            .map(|bound| {
                let var = query.new_variable();
                query.set_lower_bound(var, bound.lower);
                query.set_upper_bound(var, bound.upper);
                query.mark_input(var);
                var
            })
            .collect();

        let mut current = inputs.clone();
        for layer in &self.layers {
            current = match layer {
                Layer::Linear(l) => l
                    .weights
                    .iter()
                    .zip(&l.bias)
                    .map(|(row, &b)| {
                        // Σ wᵢxᵢ - y = -b
                        let y = query.new_variable();
                        let mut vars = current.clone();
                        vars.push(y);
                        let mut coeffs = row.clone();
                        coeffs.push(-1.0);
                        query.add_equality(&vars, &coeffs, -b, false).map(|()| y)
                    })
                    .collect::<Result<Vec<_>>>()?,
                Layer::Relu => map_unary(&mut query, &current, InputQuery::add_relu),
                Layer::LeakyRelu { slope } => {
                    let slope = *slope;
                    map_unary(&mut query, &current, |q, b, f| q.add_leaky_relu(b, f, slope))
                }
                Layer::Abs => map_unary(&mut query, &current, InputQuery::add_abs),
                Layer::Sign => map_unary(&mut query, &current, InputQuery::add_sign),
                Layer::MaxPool(p) => p
                    .windows
                    .iter()
                    .map(|window| {
                        let y = query.new_variable();
                        query.add_max(window.iter().map(|&i| current[i]).collect(), y);
                        y
                    })
                    .collect(),
            };
        }
        for &var in &current {
            query.mark_output(var);
        }
        Ok(EncodedNetwork {
            query,
            inputs,
            outputs: current,
        })
    }
}

fn check_layer(index: usize, width: usize, layer: &Layer) -> Result<()> {
    match layer {
        Layer::Linear(l) => {
            l.check_shape()?;
            if l.in_features() != width {
                return Err(MarlinError::ShapeMismatch {
                    context: "linear layer input",
                    expected: width,
                    got: l.in_features(),
                });
            }
        }
        Layer::MaxPool(p) => p.check_windows(width)?,
        Layer::LeakyRelu { slope } if !(*slope > 0.0 && *slope < 1.0) => {
            return Err(MarlinError::InvalidConstraint {
                index,
                reason: "leaky relu slope must lie in (0, 1)".to_string(),
            });
        }
        _ => {}
    }
    Ok(())
}

fn map_unary(
    query: &mut InputQuery,
    inputs: &[VarId],
    mut add: impl FnMut(&mut InputQuery, VarId, VarId),
) -> Vec<VarId> {
    inputs
        .iter()
        .map(|&b| {
            let f = query.new_variable();
            add(query, b, f);
            f
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> FeedForwardNetwork {
        FeedForwardNetwork::new(2)
            .with_layer(Layer::Linear(
                LinearLayer::new(vec![vec![1.0, -1.0], vec![0.5, 2.0]], vec![0.0, -1.0]).unwrap(),
            ))
            .unwrap()
            .with_layer(Layer::Relu)
            .unwrap()
            .with_layer(Layer::MaxPool(MaxPoolLayer::strided(2, 2).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_evaluate() {
        let net = small();
        assert_eq!(net.output_size(), 1);
        // [1 - 0, 0.5 + 0 - 1] = [1, -0.5] → relu [1, 0] → max 1
        assert_eq!(net.evaluate(&[1.0, 0.0]).unwrap(), vec![1.0]);
        assert!(net.evaluate(&[1.0]).is_err());
    }

    #[test]
    fn test_shape_checks() {
        assert!(LinearLayer::new(vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 0.0]).is_err());
        assert!(LinearLayer::new(vec![vec![1.0]], vec![]).is_err());
        let mut net = FeedForwardNetwork::new(3);
        let err = net
            .add_layer(Layer::Linear(LinearLayer::new(vec![vec![1.0, 1.0]], vec![0.0]).unwrap()))
            .unwrap_err();
        assert!(matches!(err, MarlinError::ShapeMismatch { expected: 3, got: 2, .. }));
        assert!(net
            .add_layer(Layer::MaxPool(MaxPoolLayer::new(vec![vec![0, 3]]).unwrap()))
            .is_err());
    }

    #[test]
    fn test_encode_layout() {
        let net = small();
        let encoded = net
            .encode(&[Bound::new(-1.0, 1.0), Bound::new(0.0, 2.0)])
            .unwrap();
        let q = &encoded.query;
        // 2 inputs + 2 affine + 2 relu + 1 max
        assert_eq!(q.num_vars(), 7);
        assert_eq!(q.num_equations(), 2);
        assert_eq!(q.constraints().len(), 3);
        assert_eq!(encoded.inputs, vec![VarId(0), VarId(1)]);
        assert_eq!(encoded.outputs, vec![VarId(6)]);
        assert_eq!(q.upper_bound(VarId(1)), 2.0);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_strided_windows() {
        let pool = MaxPoolLayer::strided(5, 2).unwrap();
        assert_eq!(pool.windows, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_deserialized_network_is_checked() {
        let json = r#"{"input_size":2,"layers":[{"type":"max_pool","windows":[[0,5]]}]}"#;
        let net: FeedForwardNetwork = serde_json::from_str(json).unwrap();
        let err = net.encode(&[Bound::new(0.0, 1.0); 2]).unwrap_err();
        assert!(matches!(err, MarlinError::ShapeMismatch { expected: 2, got: 5, .. }));
        assert!(net.evaluate(&[0.0, 1.0]).is_err());

        let json = r#"{"input_size":2,"layers":[
            {"type":"linear","weights":[[1.0,2.0,3.0]],"bias":[0.0]}
        ]}"#;
        let net: FeedForwardNetwork = serde_json::from_str(json).unwrap();
        assert!(net.validate().is_err());
        assert!(net.encode(&[Bound::new(0.0, 1.0); 2]).is_err());

        let json = r#"{"input_size":1,"layers":[{"type":"leaky_relu","slope":2.0}]}"#;
        let net: FeedForwardNetwork = serde_json::from_str(json).unwrap();
        assert!(matches!(
            net.evaluate(&[1.0]),
            Err(MarlinError::InvalidConstraint { index: 0, .. })
        ));
    }

    #[test]
    fn test_network_json() {
        let net = small();
        let json = serde_json::to_string(&net).unwrap();
        let back: FeedForwardNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
