use thiserror::Error;

// Everything that can go wrong while building, running or persisting a network.
#[derive(Error, Debug)]
pub enum NetworkError {
    // Invalid layer sizes or training parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // A vector's length doesn't match the layer it is fed to or compared against.
    #[error("Dimension mismatch: {0}")]
    Dimension(String),

    // A corrupt or mismatched network file or dataset header.
    #[error("Format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
