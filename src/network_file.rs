// Binary network files.
//
// All values are little-endian:
//
// u32             number of layers L
// u32 x L         layer sizes
// f64 ...         biases of layers 1..L, concatenated
// f64 ...         weights of layers 1..L, concatenated, each matrix row-major
//                 (one row per neuron, one column per neuron of the previous layer)

use crate::error::{NetworkError, Result};
use crate::network::Network;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

const U32_BYTES: usize = 4;
const F64_BYTES: usize = 8;

impl Network {
    // Writes the network to `path`. The file is first written next to its destination and only
    // renamed into place once complete, so a failed save never leaves a truncated file behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");

        let result = File::create(&partial)
            .map_err(NetworkError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                self.write_to(&mut writer)?;
                writer.flush()?;
                Ok(())
            })
            .and_then(|()| fs::rename(&partial, path).map_err(NetworkError::from));
        if result.is_err() {
            if let Err(error) = fs::remove_file(&partial) {
                warn!(path = ?partial, %error, "could not remove partially written network file");
            }
        }
        result?;

        info!(path = %path.display(), layers = ?self.sizes(), "saved network");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Network> {
        let path = path.as_ref();
        let network = Network::read_from(File::open(path)?)?;
        info!(path = %path.display(), layers = ?network.sizes(), "loaded network");
        Ok(network)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let layer_count = to_u32(self.num_layers())?;
        writer.write_all(&layer_count.to_le_bytes())?;
        for &size in self.sizes() {
            writer.write_all(&to_u32(size)?.to_le_bytes())?;
        }

        for value in self.biases().iter().flat_map(|bias| bias.iter()) {
            writer.write_all(&value.to_le_bytes())?;
        }
        // Iterating a standard-layout matrix visits it in row-major order, but the weights may
        // have been set from a transposed view, so walk the rows explicitly.
        for weight in self.weights() {
            for row in weight.rows() {
                for value in row {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    // Reads a network previously written by [`Network::write_to`]. The reader must contain
    // exactly one network; trailing bytes are reported as a format error.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Network> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut cursor = ByteCursor::new(&bytes);

        let layer_count = cursor.read_u32("layer count")? as usize;
        if layer_count < 2 {
            return Err(NetworkError::Format(format!(
                "network file declares {layer_count} layers, at least 2 are required"
            )));
        }
        // Checked against the remaining bytes before collecting, so a corrupt count can't trigger
        // a huge allocation.
        cursor.ensure(layer_count, U32_BYTES, "layer sizes")?;
        let sizes = (0..layer_count)
            .map(|_| cursor.read_u32("layer sizes").map(|size| size as usize))
            .collect::<Result<Vec<_>>>()?;
        if let Some(layer) = sizes.iter().position(|&size| size == 0) {
            return Err(NetworkError::Format(format!(
                "layer {layer} of the network file has no neurons"
            )));
        }

        let biases = sizes
            .iter()
            .skip(1)
            .map(|&size| cursor.read_f64s(size).map(Array1::from))
            .collect::<Result<Vec<_>>>()?;
        let weights = sizes
            .iter()
            .tuple_windows()
            .map(|(&columns, &rows)| {
                let count = rows.checked_mul(columns).ok_or_else(|| {
                    NetworkError::Format(format!("a {rows} x {columns} weight matrix is too large"))
                })?;
                let values = cursor.read_f64s(count)?;
                Array2::from_shape_vec((rows, columns), values)
                    .map_err(|e| NetworkError::Format(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        if cursor.remaining() != 0 {
            return Err(NetworkError::Format(format!(
                "{} unexpected bytes after the last weight matrix",
                cursor.remaining()
            )));
        }

        Network::from_parameters(sizes, biases, weights).map_err(|e| match e {
            NetworkError::Config(message) | NetworkError::Dimension(message) => {
                NetworkError::Format(message)
            }
            other => other,
        })
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        NetworkError::Format(format!("{value} does not fit the network file's 32-bit fields"))
    })
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { bytes, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn ensure(&self, count: usize, width: usize, what: &str) -> Result<()> {
        match count.checked_mul(width) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(NetworkError::Format(format!(
                "network file is truncated: {count} {what} declared, {} bytes left",
                self.remaining()
            ))),
        }
    }

    fn take(&mut self, count: usize, width: usize, what: &str) -> Result<&'a [u8]> {
        self.ensure(count, width, what)?;
        let start = self.position;
        self.position += count * width;
        Ok(&self.bytes[start..self.position])
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(1, U32_BYTES, what)?;
        Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| {
            NetworkError::Format("malformed 32-bit field".to_string())
        })?))
    }

    fn read_f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        let bytes = self.take(count, F64_BYTES, "parameters")?;
        Ok(bytes
            .chunks_exact(F64_BYTES)
            .map(|chunk| {
                let mut buffer = [0u8; F64_BYTES];
                buffer.copy_from_slice(chunk);
                f64::from_le_bytes(buffer)
            })
            .collect())
    }
}
