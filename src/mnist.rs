use crate::dataset::Dataset;
use crate::error::{NetworkError, Result};
use flate2::read::GzDecoder;
use std::{fs::File, io::Read, path::Path};
use tracing::info;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;
const IMAGE_HEADER_BYTES: usize = 16;
const LABEL_HEADER_BYTES: usize = 8;

// Number of digit classes, and so the length of every expected output vector.
pub const CLASSES: usize = 10;

pub const TRAINING_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TRAINING_LABELS: &str = "train-labels-idx1-ubyte.gz";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

// One MNIST image file and its label file, decompressed and validated. Pixels are kept as the raw
// bytes of the file (0 is background, 255 is ink) until they are converted into a Dataset.
#[derive(Debug, Clone)]
pub struct MnistSet {
    rows: usize,
    columns: usize,
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

impl MnistSet {
    pub fn load(images: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<MnistSet> {
        let set = MnistSet::from_idx(read_gz(images.as_ref())?, read_gz(labels.as_ref())?)?;
        info!(
            images = %images.as_ref().display(),
            samples = set.len(),
            rows = set.rows,
            columns = set.columns,
            "loaded MNIST set"
        );
        Ok(set)
    }

    // Parses uncompressed idx image and label files.
    pub fn from_idx(image_bytes: Vec<u8>, label_bytes: Vec<u8>) -> Result<MnistSet> {
        // The image file starts with four big-endian 32-bit integers: the magic number, the number
        // of images, the rows per image and the columns per image. The label file starts with its
        // own magic number followed by the number of labels.
        let image_header = read_header(&image_bytes, IMAGE_HEADER_BYTES, "image")?;
        let label_header = read_header(&label_bytes, LABEL_HEADER_BYTES, "label")?;

        if image_header[0] != IMAGE_MAGIC {
            return Err(NetworkError::Format(format!(
                "invalid MNIST image file: magic number {} instead of {IMAGE_MAGIC}",
                image_header[0]
            )));
        }
        if label_header[0] != LABEL_MAGIC {
            return Err(NetworkError::Format(format!(
                "invalid MNIST label file: magic number {} instead of {LABEL_MAGIC}",
                label_header[0]
            )));
        }

        let (images, rows, columns) = (
            image_header[1] as usize,
            image_header[2] as usize,
            image_header[3] as usize,
        );
        let labels = label_header[1] as usize;
        if images != labels {
            return Err(NetworkError::Format(format!(
                "{images} images but {labels} labels"
            )));
        }

        let pixels = &image_bytes[IMAGE_HEADER_BYTES..];
        let expected_pixels = images
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(columns))
            .ok_or_else(|| NetworkError::Format("image dimensions overflow".to_string()))?;
        if pixels.len() != expected_pixels {
            return Err(NetworkError::Format(format!(
                "image file holds {} pixel bytes, its header announces {expected_pixels}",
                pixels.len()
            )));
        }

        let label_values = &label_bytes[LABEL_HEADER_BYTES..];
        if label_values.len() != labels {
            return Err(NetworkError::Format(format!(
                "label file holds {} labels, its header announces {labels}",
                label_values.len()
            )));
        }
        if let Some(&label) = label_values.iter().find(|&&label| label as usize >= CLASSES) {
            return Err(NetworkError::Format(format!("label {label} is not a digit")));
        }

        Ok(MnistSet {
            rows,
            columns,
            pixels: pixels.to_vec(),
            labels: label_values.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    // Raw pixel bytes of one image, row by row.
    pub fn image(&self, index: usize) -> Option<&[u8]> {
        let size = self.rows * self.columns;
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.pixels.get(start..end)
    }

    pub fn label(&self, index: usize) -> Option<u8> {
        self.labels.get(index).copied()
    }

    // Converts the set into network inputs and expected outputs: every pixel is scaled into
    // [0, 1] and every label becomes a one-hot vector of length [`CLASSES`].
    pub fn to_dataset(&self) -> Result<Dataset> {
        let size = self.rows * self.columns;
        let mut dataset = Dataset::new(self.len(), size, CLASSES);
        if size == 0 {
            return Ok(dataset);
        }

        let samples = self.pixels.chunks_exact(size).zip(&self.labels);
        for (index, (image, &label)) in samples.enumerate() {
            let input = image
                .iter()
                .map(|&value| value as f64 / 255.0)
                .collect::<Vec<_>>();
            // All zeros except for the neuron of the correct digit.
            let mut expected_output = [0.0; CLASSES];
            expected_output[label as usize] = 1.0;

            dataset.set_input_vector(index, &input)?;
            dataset.set_output_vector(index, &expected_output)?;
        }

        Ok(dataset)
    }
}

pub struct MnistData {
    pub training: MnistSet,
    pub test: MnistSet,
}

impl MnistData {
    // Loads the four standard gzip-compressed MNIST files from `directory`.
    pub fn load(directory: impl AsRef<Path>) -> Result<MnistData> {
        let directory = directory.as_ref();
        Ok(MnistData {
            training: MnistSet::load(
                directory.join(TRAINING_IMAGES),
                directory.join(TRAINING_LABELS),
            )?,
            test: MnistSet::load(directory.join(TEST_IMAGES), directory.join(TEST_LABELS))?,
        })
    }
}

fn read_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut unzipped_file = GzDecoder::new(file);
    let mut bytes = Vec::new();
    unzipped_file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn read_header(bytes: &[u8], length: usize, kind: &str) -> Result<Vec<u32>> {
    let header = bytes.get(..length).ok_or_else(|| {
        NetworkError::Format(format!("MNIST {kind} file is shorter than its header"))
    })?;
    Ok(header
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx_images(rows: u32, columns: u32, images: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for value in [IMAGE_MAGIC, images.len() as u32, rows, columns] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        images.iter().for_each(|image| bytes.extend_from_slice(image));
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for value in [LABEL_MAGIC, labels.len() as u32] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn parses_images_and_labels() {
        let set = MnistSet::from_idx(
            idx_images(2, 2, &[&[0, 255, 51, 0], &[255, 255, 0, 0]]),
            idx_labels(&[7, 1]),
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!((set.rows(), set.columns()), (2, 2));
        assert_eq!(set.image(1), Some(&[255, 255, 0, 0][..]));
        assert_eq!(set.label(0), Some(7));
        assert_eq!(set.image(2), None);
    }

    #[test]
    fn huge_image_index_is_none() {
        let set = MnistSet::from_idx(idx_images(28, 28, &[&[0; 784]]), idx_labels(&[5])).unwrap();

        assert_eq!(set.image(usize::MAX / 100), None);
        assert_eq!(set.image(usize::MAX), None);
        assert_eq!(set.label(usize::MAX), None);
    }

    #[test]
    fn dataset_is_normalised_and_one_hot() {
        let images = idx_images(1, 2, &[&[0, 255], &[51, 102]]);
        let set = MnistSet::from_idx(images, idx_labels(&[3, 9])).unwrap();
        let dataset = set.to_dataset().unwrap();

        assert_eq!(dataset.input_dim(), 2);
        assert_eq!(dataset.output_dim(), CLASSES);
        assert_eq!(dataset.input(0).to_vec(), vec![0.0, 1.0]);
        assert_eq!(dataset.input(1).to_vec(), vec![0.2, 0.4]);

        let output = dataset.output(1);
        assert_eq!(output[9], 1.0);
        assert_eq!(output.sum(), 1.0);
    }

    #[test]
    fn wrong_magic_number_is_rejected() {
        let mut images = idx_images(1, 1, &[&[0]]);
        images[3] = 0;
        assert!(matches!(
            MnistSet::from_idx(images, idx_labels(&[0])),
            Err(NetworkError::Format(_))
        ));
        assert!(matches!(
            MnistSet::from_idx(idx_images(1, 1, &[&[0]]), idx_images(1, 1, &[&[0]])),
            Err(NetworkError::Format(_))
        ));
    }

    #[test]
    fn inconsistent_counts_are_rejected() {
        assert!(matches!(
            MnistSet::from_idx(idx_images(1, 1, &[&[0], &[1]]), idx_labels(&[0])),
            Err(NetworkError::Format(_))
        ));

        let mut truncated = idx_images(2, 2, &[&[0, 0, 0, 0]]);
        truncated.pop();
        assert!(matches!(
            MnistSet::from_idx(truncated, idx_labels(&[0])),
            Err(NetworkError::Format(_))
        ));

        assert!(matches!(
            MnistSet::from_idx(vec![0, 0, 8], idx_labels(&[0])),
            Err(NetworkError::Format(_))
        ));
    }

    #[test]
    fn labels_must_be_digits() {
        assert!(matches!(
            MnistSet::from_idx(idx_images(1, 1, &[&[0]]), idx_labels(&[10])),
            Err(NetworkError::Format(_))
        ));
    }
}
