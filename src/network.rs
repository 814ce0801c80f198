use crate::error::{NetworkError, Result};
use ndarray::{
    Array, Array1, Array2, ArrayView1, Axis, Zip,
    linalg::{general_mat_mul, general_mat_vec_mul},
};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::Uniform};

// A fully-connected feed-forward network of sigmoid neurons.
//
// Besides its parameters the network owns the scratch buffers of a single sample's forward and
// backward pass. They are sized once at construction and overwritten by every call to
// [`Network::forward`] or [`Network::backward`], so views handed out by those methods (and by
// [`Network::output`], [`Network::nabla_biases`], [`Network::nabla_weights`]) are only valid
// until the next pass. Copy them with `to_owned()` to keep them around.
#[derive(Debug, Clone)]
pub struct Network {
    sizes: Vec<usize>,
    // biases[i] and weights[i] feed layer i + 1. weights[i] is a [sizes[i + 1] x sizes[i]] matrix,
    // so each row holds the incoming weights of one neuron.
    biases: Vec<Array1<f64>>,
    weights: Vec<Array2<f64>>,

    // One entry per layer, activations[0] being a copy of the input.
    activations: Vec<Array1<f64>>,
    // Pre-activation sums, one entry per non-input layer (zs[i] belongs to layer i + 1).
    zs: Vec<Array1<f64>>,
    nabla_biases: Vec<Array1<f64>>,
    nabla_weights: Vec<Array2<f64>>,
}

impl Network {
    // Builds a network with every weight and bias drawn independently from a uniform
    // distribution on [-1, 1). Pass a seeded generator to make the initialisation reproducible.
    pub fn new<R: Rng + ?Sized>(sizes: Vec<usize>, rng: &mut R) -> Result<Network> {
        validate_sizes(&sizes)?;

        let distribution = Uniform::<f64>::new(-1.0, 1.0);
        let biases = sizes
            .iter()
            .skip(1)
            .map(|&size| Array::random_using(size, distribution, rng))
            .collect();
        let weights = sizes
            .iter()
            // Pair each size with the following one, giving a [next_size x current_size] matrix.
            .zip(sizes.iter().skip(1))
            .map(|(&current_size, &next_size)| {
                Array::random_using((next_size, current_size), distribution, rng)
            })
            .collect();

        Ok(Network::with_parameters(sizes, biases, weights))
    }

    // Builds a network from existing parameters, checking that their shapes match `sizes`.
    pub fn from_parameters(
        sizes: Vec<usize>,
        biases: Vec<Array1<f64>>,
        weights: Vec<Array2<f64>>,
    ) -> Result<Network> {
        validate_sizes(&sizes)?;
        check_bias_shapes(&sizes, &biases)?;
        check_weight_shapes(&sizes, &weights)?;
        Ok(Network::with_parameters(sizes, biases, weights))
    }

    fn with_parameters(
        sizes: Vec<usize>,
        biases: Vec<Array1<f64>>,
        weights: Vec<Array2<f64>>,
    ) -> Network {
        Network {
            activations: sizes.iter().map(|&size| Array1::zeros(size)).collect(),
            zs: biases.iter().map(|bias| Array1::zeros(bias.raw_dim())).collect(),
            nabla_biases: biases.iter().map(|bias| Array1::zeros(bias.raw_dim())).collect(),
            nabla_weights: weights
                .iter()
                .map(|weight| Array2::zeros(weight.raw_dim()))
                .collect(),
            sizes,
            biases,
            weights,
        }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn num_layers(&self) -> usize {
        self.sizes.len()
    }

    pub fn biases(&self) -> &[Array1<f64>] {
        &self.biases
    }

    pub fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    // Replaces all biases. The number of vectors and each length must match the layer sizes.
    pub fn set_biases(&mut self, biases: Vec<Array1<f64>>) -> Result<()> {
        check_bias_shapes(&self.sizes, &biases)?;
        self.biases = biases;
        Ok(())
    }

    // Replaces all weights. The number of matrices and each shape must match the layer sizes.
    pub fn set_weights(&mut self, weights: Vec<Array2<f64>>) -> Result<()> {
        check_weight_shapes(&self.sizes, &weights)?;
        self.weights = weights;
        Ok(())
    }

    // The output layer's activations as of the last forward pass.
    pub fn output(&self) -> ArrayView1<'_, f64> {
        self.activations[self.sizes.len() - 1].view()
    }

    // Bias gradients of the last backward pass, one vector per non-input layer.
    pub fn nabla_biases(&self) -> &[Array1<f64>] {
        &self.nabla_biases
    }

    // Weight gradients of the last backward pass, shaped like [`Network::weights`].
    pub fn nabla_weights(&self) -> &[Array2<f64>] {
        &self.nabla_weights
    }

    // Propagates `input` through the network and returns the output layer's activations.
    //
    // Every layer computes a' = σ(w.a + b), storing both the pre-activation z = w.a + b and the
    // activation a' in the network's scratch buffers for a following backward pass.
    pub fn forward<'a>(
        &mut self,
        input: impl Into<ArrayView1<'a, f64>>,
    ) -> Result<ArrayView1<'_, f64>> {
        let input = input.into();
        if input.len() != self.sizes[0] {
            return Err(NetworkError::Dimension(format!(
                "input has {} values but the input layer has {} neurons",
                input.len(),
                self.sizes[0]
            )));
        }

        self.activations[0].assign(&input);
        for layer in 1..self.sizes.len() {
            // The previous layer's activation is read while the current one is written, so split
            // the activation buffers between the two.
            let (previous, current) = self.activations.split_at_mut(layer);
            let z = &mut self.zs[layer - 1];

            z.assign(&self.biases[layer - 1]);
            general_mat_vec_mul(1.0, &self.weights[layer - 1], &previous[layer - 1], 1.0, z);

            Zip::from(&mut current[0])
                .and(&*z)
                .for_each(|activation, &z| *activation = sigmoid(z));
        }

        Ok(self.output())
    }

    // Computes the gradient of the quadratic cost of a single sample (x, y) with respect to every
    // bias and weight. The result is left in [`Network::nabla_biases`] and
    // [`Network::nabla_weights`], replacing that of the previous call.
    pub fn backward<'a, 'b>(
        &mut self,
        x: impl Into<ArrayView1<'a, f64>>,
        y: impl Into<ArrayView1<'b, f64>>,
    ) -> Result<()> {
        let y = y.into();
        let output_size = self.sizes[self.sizes.len() - 1];
        if y.len() != output_size {
            return Err(NetworkError::Dimension(format!(
                "expected output has {} values but the output layer has {output_size} neurons",
                y.len()
            )));
        }

        self.forward(x)?;

        // Index of the output layer within biases, weights, zs and the nablas. Its activations
        // live one further along, at activations[output + 1].
        let output = self.sizes.len() - 2;

        // Output error: δ = (a - y) * σ'(z). The error of a layer is also its bias gradient, so
        // nabla_biases doubles as the storage for δ while walking back through the layers.
        Zip::from(&mut self.nabla_biases[output])
            .and(&self.activations[output + 1])
            .and(&y)
            .and(&self.zs[output])
            .for_each(|delta, &a, &y, &z| *delta = (a - y) * sigmoid_derivative(z));
        outer_product(
            &self.nabla_biases[output],
            &self.activations[output],
            &mut self.nabla_weights[output],
        );

        // Walk back through the hidden layers, each time using the error of the layer above:
        // δ = (wᵀ.δ_above) * σ'(z).
        for layer in (0..output).rev() {
            let (below, above) = self.nabla_biases.split_at_mut(layer + 1);
            let delta = &mut below[layer];

            general_mat_vec_mul(1.0, &self.weights[layer + 1].t(), &above[0], 0.0, delta);
            Zip::from(&mut *delta)
                .and(&self.zs[layer])
                .for_each(|delta, &z| *delta *= sigmoid_derivative(z));

            outer_product(delta, &self.activations[layer], &mut self.nabla_weights[layer]);
        }

        Ok(())
    }

    // Runs `input` through the network and returns the index of the most activated output
    // neuron, the lowest index winning a tie.
    pub fn classify<'a>(&mut self, input: impl Into<ArrayView1<'a, f64>>) -> Result<usize> {
        let output = self.forward(input)?;
        Ok(argmax(output).unwrap_or(0))
    }

    // Half the squared distance between the network's output for `x` and `y`. This is the cost
    // whose gradient [`Network::backward`] computes.
    pub fn quadratic_cost<'a, 'b>(
        &mut self,
        x: impl Into<ArrayView1<'a, f64>>,
        y: impl Into<ArrayView1<'b, f64>>,
    ) -> Result<f64> {
        let y = y.into();
        let output = self.forward(x)?;
        if y.len() != output.len() {
            return Err(NetworkError::Dimension(format!(
                "expected output has {} values but the output layer has {} neurons",
                y.len(),
                output.len()
            )));
        }
        Ok(0.5 * output.iter().zip(y.iter()).map(|(a, y)| (a - y).powi(2)).sum::<f64>())
    }

    // Moves every parameter against the given gradient: p -= step * nabla_p.
    pub(crate) fn apply_gradients(
        &mut self,
        nabla_biases: &[Array1<f64>],
        nabla_weights: &[Array2<f64>],
        step: f64,
    ) {
        for (bias, nabla_bias) in self.biases.iter_mut().zip(nabla_biases) {
            bias.scaled_add(-step, nabla_bias);
        }
        for (weight, nabla_weight) in self.weights.iter_mut().zip(nabla_weights) {
            weight.scaled_add(-step, nabla_weight);
        }
    }
}

// Position of the largest value. On a tie the first position wins.
pub fn argmax(values: ArrayView1<'_, f64>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        // Comparing indices in reverse makes the earlier of two equal values the larger one.
        .max_by(|(i, a), (j, b)| a.total_cmp(b).then(j.cmp(i)))
        .map(|(index, _)| index)
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-z))
}

pub fn sigmoid_derivative(z: f64) -> f64 {
    let s = sigmoid(z);
    s * (1.0 - s)
}

// out = column ⊗ row, i.e. out[i][j] = column[i] * row[j].
fn outer_product(column: &Array1<f64>, row: &Array1<f64>, out: &mut Array2<f64>) {
    let column = column.view().insert_axis(Axis(1));
    let row = row.view().insert_axis(Axis(0));
    general_mat_mul(1.0, &column, &row, 0.0, out);
}

fn validate_sizes(sizes: &[usize]) -> Result<()> {
    if sizes.len() < 2 {
        return Err(NetworkError::Config(format!(
            "a network needs at least 2 layers, got {}",
            sizes.len()
        )));
    }
    if let Some(layer) = sizes.iter().position(|&size| size == 0) {
        return Err(NetworkError::Config(format!("layer {layer} has no neurons")));
    }
    Ok(())
}

fn check_bias_shapes(sizes: &[usize], biases: &[Array1<f64>]) -> Result<()> {
    if biases.len() != sizes.len() - 1 {
        return Err(NetworkError::Dimension(format!(
            "got {} bias vectors for {} layers",
            biases.len(),
            sizes.len()
        )));
    }
    for (layer, (bias, &size)) in biases.iter().zip(&sizes[1..]).enumerate() {
        if bias.len() != size {
            return Err(NetworkError::Dimension(format!(
                "bias vector {layer} has {} values, expected {size}",
                bias.len()
            )));
        }
    }
    Ok(())
}

fn check_weight_shapes(sizes: &[usize], weights: &[Array2<f64>]) -> Result<()> {
    if weights.len() != sizes.len() - 1 {
        return Err(NetworkError::Dimension(format!(
            "got {} weight matrices for {} layers",
            weights.len(),
            sizes.len()
        )));
    }
    for (layer, (weight, window)) in weights.iter().zip(sizes.windows(2)).enumerate() {
        if weight.dim() != (window[1], window[0]) {
            return Err(NetworkError::Dimension(format!(
                "weight matrix {layer} is {:?}, expected {:?}",
                weight.dim(),
                (window[1], window[0])
            )));
        }
    }
    Ok(())
}
