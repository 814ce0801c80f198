use crate::dataset::Dataset;
use crate::error::{NetworkError, Result};
use crate::network::{Network, argmax};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::{Rng, seq::SliceRandom};
use std::time::{Duration, Instant};
use tracing::{info, trace};

// Hyper-parameters of stochastic gradient descent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub mini_batch_size: usize,
    // The learning rate η.
    pub learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 30,
            mini_batch_size: 10,
            learning_rate: 3.0,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mini_batch_size == 0 {
            return Err(NetworkError::Config(
                "mini-batch size must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(NetworkError::Config(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

// Test-set accuracy after one epoch of training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: usize,
    pub hits: usize,
    pub total: usize,
    // Time spent on the epoch, evaluation included.
    pub elapsed: Duration,
}

impl EpochReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

// Drives mini-batch stochastic gradient descent on a [`Network`].
//
// The trainer owns the gradient sums of the current mini-batch. The network only ever holds the
// gradient of a single sample, so summing over the batch happens here.
pub struct Trainer {
    config: TrainConfig,
    nabla_biases_sum: Vec<Array1<f64>>,
    nabla_weights_sum: Vec<Array2<f64>>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Trainer> {
        config.validate()?;
        Ok(Trainer {
            config,
            nabla_biases_sum: Vec::new(),
            nabla_weights_sum: Vec::new(),
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    // Trains `network` for the configured number of epochs and returns one report per epoch.
    pub fn sgd<R: Rng + ?Sized>(
        &mut self,
        network: &mut Network,
        training_set: &Dataset,
        test_set: &Dataset,
        rng: &mut R,
    ) -> Result<Vec<EpochReport>> {
        self.sgd_with(network, training_set, test_set, rng, |_| {})
    }

    // Like [`Trainer::sgd`], calling `on_epoch` as soon as each epoch has been evaluated.
    //
    // Every epoch the training indices are shuffled and consumed in slices of
    // `mini_batch_size`. When the training set size isn't a multiple of the mini-batch size,
    // the last slice of the epoch is simply shorter.
    pub fn sgd_with<R, F>(
        &mut self,
        network: &mut Network,
        training_set: &Dataset,
        test_set: &Dataset,
        rng: &mut R,
        mut on_epoch: F,
    ) -> Result<Vec<EpochReport>>
    where
        R: Rng + ?Sized,
        F: FnMut(&EpochReport),
    {
        check_dimensions(network, training_set, "training")?;
        check_dimensions(network, test_set, "test")?;

        let TrainConfig {
            epochs,
            mini_batch_size,
            learning_rate,
        } = self.config;
        info!(
            layers = ?network.sizes(),
            training_samples = training_set.size(),
            test_samples = test_set.size(),
            epochs,
            mini_batch_size,
            learning_rate,
            "starting stochastic gradient descent"
        );

        let mut indices: Vec<usize> = (0..training_set.size()).collect();
        let mut reports = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let start = Instant::now();
            indices.shuffle(rng);

            for mini_batch in indices.chunks(mini_batch_size) {
                self.update_mini_batch(network, training_set, mini_batch, learning_rate)?;
            }

            let hits = evaluate(network, test_set)?;
            let report = EpochReport {
                epoch,
                hits,
                total: test_set.size(),
                elapsed: start.elapsed(),
            };
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Epoch {epoch}: {hits} / {}",
                report.total
            );

            on_epoch(&report);
            reports.push(report);
        }

        Ok(reports)
    }

    // Takes one gradient descent step using the samples of `training_set` at `mini_batch`.
    //
    // The gradient of every sample is computed against the same parameters; the network is only
    // modified once the whole batch has been processed, moving each parameter by
    // `learning_rate / mini_batch.len()` times its summed gradient. An empty batch does nothing.
    pub fn update_mini_batch(
        &mut self,
        network: &mut Network,
        training_set: &Dataset,
        mini_batch: &[usize],
        learning_rate: f64,
    ) -> Result<()> {
        if mini_batch.is_empty() {
            return Ok(());
        }
        self.reset_sums(network);

        for &index in mini_batch {
            if index >= training_set.size() {
                return Err(NetworkError::Dimension(format!(
                    "sample index {index} is out of range for a dataset of {} samples",
                    training_set.size()
                )));
            }
            network.backward(training_set.input(index), training_set.output(index))?;

            for (sum, nabla_bias) in self.nabla_biases_sum.iter_mut().zip(network.nabla_biases()) {
                *sum += nabla_bias;
            }
            for (sum, nabla_weight) in self
                .nabla_weights_sum
                .iter_mut()
                .zip(network.nabla_weights())
            {
                *sum += nabla_weight;
            }
        }

        let step = learning_rate / mini_batch.len() as f64;
        network.apply_gradients(&self.nabla_biases_sum, &self.nabla_weights_sum, step);
        trace!(samples = mini_batch.len(), step, "applied mini-batch update");
        Ok(())
    }

    // Zero the gradient sums, reallocating them only when the network's shape has changed since
    // the previous batch.
    fn reset_sums(&mut self, network: &Network) {
        let same_shape = self.nabla_weights_sum.len() == network.weights().len()
            && self
                .nabla_weights_sum
                .iter()
                .zip(network.weights())
                .all(|(sum, weight)| sum.dim() == weight.dim());

        if same_shape {
            self.nabla_biases_sum.iter_mut().for_each(|sum| sum.fill(0.0));
            self.nabla_weights_sum.iter_mut().for_each(|sum| sum.fill(0.0));
        } else {
            self.nabla_biases_sum = network
                .biases()
                .iter()
                .map(|bias| Array1::zeros(bias.raw_dim()))
                .collect();
            self.nabla_weights_sum = network
                .weights()
                .iter()
                .map(|weight| Array2::zeros(weight.raw_dim()))
                .collect();
        }
    }
}

// Counts the samples of `test_set` whose most activated output neuron is the one set to 1.0 in
// the expected output.
pub fn evaluate(network: &mut Network, test_set: &Dataset) -> Result<usize> {
    check_dimensions(network, test_set, "test")?;

    let mut hits = 0;
    for index in 0..test_set.size() {
        let output = network.forward(test_set.input(index))?;
        if let Some(predicted) = argmax(output) {
            if test_set.output(index)[predicted] == 1.0 {
                hits += 1;
            }
        }
    }
    Ok(hits)
}

fn check_dimensions(network: &Network, dataset: &Dataset, name: &str) -> Result<()> {
    let sizes = network.sizes();
    let (input, output) = (sizes[0], sizes[sizes.len() - 1]);
    if dataset.input_dim() != input || dataset.output_dim() != output {
        return Err(NetworkError::Dimension(format!(
            "{name} set has {} inputs and {} outputs, the network expects {input} and {output}",
            dataset.input_dim(),
            dataset.output_dim()
        )));
    }
    Ok(())
}
