// A feed-forward network of sigmoid neurons trained by mini-batch stochastic gradient descent,
// together with the MNIST and PNG plumbing needed to train it on handwritten digits.

pub mod dataset;
pub mod error;
pub mod image_io;
pub mod mnist;
pub mod network;
pub mod network_file;
pub mod trainer;

pub use dataset::Dataset;
pub use error::{NetworkError, Result};
pub use network::Network;
pub use trainer::{EpochReport, TrainConfig, Trainer, evaluate};
