use crate::error::{NetworkError, Result};
use ndarray::{Array2, ArrayView1};

// A fixed-size collection of (input, expected output) pairs. Each row of `inputs` is one sample's
// input vector and the same row of `outputs` is the activation the network should produce for it,
// which for classification is a one-hot vector.
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Array2<f64>,
    outputs: Array2<f64>,
}

impl Dataset {
    // Creates a zero-filled dataset of `size` samples, to be populated with
    // [`Dataset::set_input_vector`] and [`Dataset::set_output_vector`].
    pub fn new(size: usize, input_dim: usize, output_dim: usize) -> Dataset {
        Dataset {
            inputs: Array2::zeros((size, input_dim)),
            outputs: Array2::zeros((size, output_dim)),
        }
    }

    pub fn size(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.outputs.ncols()
    }

    pub fn set_input_vector(&mut self, index: usize, values: &[f64]) -> Result<()> {
        Self::set_row(&mut self.inputs, index, values, "input")
    }

    pub fn set_output_vector(&mut self, index: usize, values: &[f64]) -> Result<()> {
        Self::set_row(&mut self.outputs, index, values, "output")
    }

    // Panics if `index >= self.size()`.
    pub fn input(&self, index: usize) -> ArrayView1<'_, f64> {
        self.inputs.row(index)
    }

    // Panics if `index >= self.size()`.
    pub fn output(&self, index: usize) -> ArrayView1<'_, f64> {
        self.outputs.row(index)
    }

    fn set_row(matrix: &mut Array2<f64>, index: usize, values: &[f64], kind: &str) -> Result<()> {
        if index >= matrix.nrows() {
            return Err(NetworkError::Dimension(format!(
                "{kind} index {index} is out of range for a dataset of {} samples",
                matrix.nrows()
            )));
        }
        if values.len() != matrix.ncols() {
            return Err(NetworkError::Dimension(format!(
                "{kind} vector has {} values, expected {}",
                values.len(),
                matrix.ncols()
            )));
        }

        matrix.row_mut(index).assign(&ArrayView1::from(values));
        Ok(())
    }
}
