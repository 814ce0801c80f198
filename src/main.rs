use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
use neural_digits::image_io::{DIGIT_SIDE, read_digit_png, write_digit_png};
use neural_digits::mnist::{CLASSES, MnistData, MnistSet, TRAINING_IMAGES, TRAINING_LABELS};
use neural_digits::{Network, TrainConfig, Trainer};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const INPUT_NEURONS: usize = (DIGIT_SIDE * DIGIT_SIDE) as usize;
const OUTPUT_NEURONS: usize = CLASSES;

#[derive(Parser)]
#[command(name = "neural-digits")]
#[command(about = "Handwritten digit recognition with a sigmoid network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Train a network on MNIST and save it
    Train {
        /// Directory holding the four gzip-compressed MNIST files
        #[arg(short, long, value_name = "PATH", default_value = "data")]
        data: PathBuf,
        /// Network file to continue training from, instead of a random network
        #[arg(short, long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// Where to save the trained network
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        /// Hidden layer sizes of a new network, comma separated
        #[arg(long, value_delimiter = ',', default_value = "30")]
        hidden: Vec<usize>,
        #[arg(short, long, default_value_t = 30)]
        epochs: usize,
        #[arg(short, long, default_value_t = 10)]
        batch_size: usize,
        /// Learning rate
        #[arg(long, default_value_t = 3.0)]
        eta: f64,
        /// Seed for weight initialisation and shuffling; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the digit a trained network sees in a 28x28 PNG
    Classify {
        #[arg(short, long, value_name = "PATH")]
        network: PathBuf,
        #[arg(short, long, value_name = "PATH")]
        image: PathBuf,
    },
    /// Write one MNIST training image to a PNG
    Export {
        #[arg(short, long, value_name = "PATH", default_value = "data")]
        data: PathBuf,
        #[arg(long)]
        index: usize,
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("Invalid log level: {}", other),
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Train {
            data,
            input,
            output,
            hidden,
            epochs,
            batch_size,
            eta,
            seed,
        } => {
            let config = TrainConfig {
                epochs,
                mini_batch_size: batch_size,
                learning_rate: eta,
            };
            train(data, input, output, hidden, config, seed)
        }
        Command::Classify { network, image } => {
            let mut network = Network::load(&network)
                .with_context(|| format!("Failed to load network {}", network.display()))?;
            let input = read_digit_png(&image, DIGIT_SIDE, DIGIT_SIDE)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            let digit = network.classify(input.as_slice())?;
            println!("{digit}");
            Ok(())
        }
        Command::Export {
            data,
            index,
            output,
        } => {
            let set = MnistSet::load(data.join(TRAINING_IMAGES), data.join(TRAINING_LABELS))
                .context("Failed to load the MNIST training set")?;
            let Some(pixels) = set.image(index) else {
                bail!("Image {} does not exist, the training set has {}", index, set.len());
            };
            write_digit_png(pixels, set.columns() as u32, set.rows() as u32, &output)?;
            info!(index, label = ?set.label(index), path = %output.display(), "exported image");
            Ok(())
        }
    }
}

fn train(
    data: PathBuf,
    input: Option<PathBuf>,
    output: PathBuf,
    hidden: Vec<usize>,
    config: TrainConfig,
    seed: Option<u64>,
) -> Result<()> {
    let start = Instant::now();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut trainer = Trainer::new(config)?;

    let mut network = match &input {
        Some(path) => Network::load(path)
            .with_context(|| format!("Failed to load network {}", path.display()))?,
        None => {
            let sizes = std::iter::once(INPUT_NEURONS)
                .chain(hidden)
                .chain(std::iter::once(OUTPUT_NEURONS))
                .collect();
            Network::new(sizes, &mut rng)?
        }
    };

    let mnist_data = MnistData::load(&data)
        .with_context(|| format!("Failed to load MNIST data from {}", data.display()))?;
    let training_set = mnist_data.training.to_dataset()?;
    let test_set = mnist_data.test.to_dataset()?;

    let config = trainer.config();
    info!(
        layers = ?network.sizes(),
        epochs = config.epochs,
        mini_batch_size = config.mini_batch_size,
        learning_rate = config.learning_rate,
        "training started"
    );
    let mut best = 0.0f64;
    trainer.sgd_with(&mut network, &training_set, &test_set, &mut rng, |report| {
        best = best.max(report.accuracy());
    })?;

    // Only reached when training succeeded, so a failed run never leaves an output file.
    network
        .save(&output)
        .with_context(|| format!("Failed to save network {}", output.display()))?;
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        best_accuracy = best,
        "training finished"
    );
    Ok(())
}
