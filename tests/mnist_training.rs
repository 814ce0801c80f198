use flate2::{Compression, write::GzEncoder};
use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
use neural_digits::image_io::{read_digit_png, write_digit_png};
use neural_digits::mnist::{
    CLASSES, MnistData, TEST_IMAGES, TEST_LABELS, TRAINING_IMAGES, TRAINING_LABELS,
};
use neural_digits::{Network, NetworkError, TrainConfig, Trainer, evaluate};
use std::{fs::File, io::Write, path::Path};
use tempfile::tempdir;

const SIDE: u32 = 4;

// A 4x4 "digit": zeros draw ink in the left half of the image, ones in the right half. `shade`
// varies the ink a little between samples.
fn digit(label: u8, shade: u8) -> Vec<u8> {
    (0..SIDE * SIDE)
        .map(|i| {
            let left = i % SIDE < SIDE / 2;
            if left == (label == 0) { 255 - shade } else { shade }
        })
        .collect()
}

fn write_gz(path: &Path, bytes: &[u8]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap();
}

fn write_set(directory: &Path, images_name: &str, labels_name: &str, samples: &[(u8, u8)]) {
    let mut images = Vec::new();
    for value in [2051, samples.len() as u32, SIDE, SIDE] {
        images.extend_from_slice(&u32::to_be_bytes(value));
    }
    let mut labels = Vec::new();
    for value in [2049, samples.len() as u32] {
        labels.extend_from_slice(&u32::to_be_bytes(value));
    }
    for &(label, shade) in samples {
        images.extend(digit(label, shade));
        labels.push(label);
    }

    write_gz(&directory.join(images_name), &images);
    write_gz(&directory.join(labels_name), &labels);
}

fn synthetic_mnist(directory: &Path) {
    let training: Vec<_> = (0..20).map(|i| ((i % 2) as u8, (i * 3) as u8)).collect();
    let test: Vec<_> = (0..6).map(|i| ((i % 2) as u8, (i * 5 + 1) as u8)).collect();
    write_set(directory, TRAINING_IMAGES, TRAINING_LABELS, &training);
    write_set(directory, TEST_IMAGES, TEST_LABELS, &test);
}

#[test]
fn trains_on_gzipped_mnist_files() {
    let directory = tempdir().unwrap();
    synthetic_mnist(directory.path());

    let mnist_data = MnistData::load(directory.path()).unwrap();
    let training_set = mnist_data.training.to_dataset().unwrap();
    let test_set = mnist_data.test.to_dataset().unwrap();
    assert_eq!(training_set.size(), 20);
    assert_eq!(test_set.size(), 6);

    let mut rng = StdRng::seed_from_u64(2018);
    let input_neurons = (SIDE * SIDE) as usize;
    let mut network = Network::new(vec![input_neurons, 8, CLASSES], &mut rng).unwrap();
    let mut trainer = Trainer::new(TrainConfig {
        epochs: 150,
        mini_batch_size: 6,
        learning_rate: 3.0,
    })
    .unwrap();

    let reports = trainer
        .sgd(&mut network, &training_set, &test_set, &mut rng)
        .unwrap();
    assert_eq!(reports.len(), 150);
    assert!(reports.iter().all(|report| report.hits <= report.total));
    assert_eq!(reports.last().unwrap().hits, test_set.size());
    assert_eq!(evaluate(&mut network, &test_set).unwrap(), test_set.size());

    // The saved network classifies an exported image the same way.
    let network_path = directory.path().join("network.bin");
    network.save(&network_path).unwrap();
    let mut loaded = Network::load(&network_path).unwrap();

    let image_path = directory.path().join("digit.png");
    write_digit_png(mnist_data.test.image(1).unwrap(), SIDE, SIDE, &image_path).unwrap();
    let input = read_digit_png(&image_path, SIDE, SIDE).unwrap();
    assert_eq!(loaded.classify(input.as_slice()).unwrap(), 1);
}

#[test]
fn missing_mnist_files_are_io_errors() {
    let directory = tempdir().unwrap();
    assert!(matches!(
        MnistData::load(directory.path()),
        Err(NetworkError::Io(_))
    ));
}

#[test]
fn network_and_dataset_must_agree() {
    let directory = tempdir().unwrap();
    synthetic_mnist(directory.path());
    let mnist_data = MnistData::load(directory.path()).unwrap();
    let training_set = mnist_data.training.to_dataset().unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut network = Network::new(vec![784, 30, CLASSES], &mut rng).unwrap();
    let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
    assert!(matches!(
        trainer.sgd(&mut network, &training_set, &training_set, &mut rng),
        Err(NetworkError::Dimension(_))
    ));
}
