use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use region_stream_rs::image_pipeline::{
    InMemoryProducer, PixelBuffer, Region, StreamingWriter, ToleranceComparator, WriteRequest,
    open_sink, read_image,
};
use region_stream_rs::logger;
use region_stream_rs::regression::{ExpectedOutcome, RegressionCase, run_all};

use tracing::{error, info};

#[derive(Parser)]
#[command(name = "region_stream")]
#[command(about = "Streamed, pasted and compressed region writing")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an image with every streaming/pasting/compression combination
    StreamingTest {
        input: PathBuf,
        /// Output path prefix, the combination tag and extension are appended
        output_base: String,
        /// Output extension, `vol` or `tif`
        extension: String,
        /// Per combination: 1 when the write must fail, 0 when it must succeed
        expect: Vec<String>,
        /// Pieces used by the streaming combinations
        #[arg(long, default_value_t = 10)]
        pieces: usize,
    },

    /// Write a synthetic 8-bit test volume
    Generate {
        output: PathBuf,
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [30, 30, 30])]
        size: Vec<usize>,
        /// Pieces the volume is streamed in
        #[arg(long, default_value_t = 1)]
        pieces: usize,
        #[arg(long)]
        compress: bool,
    },

    /// Compare two 8-bit images pixel by pixel
    Compare {
        test: PathBuf,
        baseline: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        tolerance: f64,
        #[arg(long, default_value_t = 0)]
        radius: usize,
        #[arg(long, default_value_t = 0)]
        max_pixels: u64,
    },
}

/// Smooth gradient with a bright diagonal, so that pasted slices are easy to
/// spot and compression has something to work on.
fn synthetic_volume(size: [usize; 3]) -> PixelBuffer<u8, 3> {
    PixelBuffer::from_fn(Region::from_size(size), |[x, y, z]| {
        if x == y && y == z {
            255
        } else {
            ((x * 3 + y * 2 + z) % 200) as u8
        }
    })
}

fn generate(output: &Path, size: &[usize], pieces: usize, compress: bool) -> Result<()> {
    let size: [usize; 3] = size
        .try_into()
        .context("size needs exactly three extents")?;
    let image = synthetic_volume(size);
    let request = WriteRequest::builder(*image.region())
        .pieces(pieces)
        .compress(compress)
        .build();

    let mut producer = InMemoryProducer::new(image);
    let mut sink = open_sink::<3>(output)?;
    let report = StreamingWriter::default()
        .write(&request, &mut producer, &mut sink)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(bytes = report.bytes_written(), "Volume generated");
    report.print_summary();
    Ok(())
}

fn compare(test: &Path, baseline: &Path, comparator: ToleranceComparator) -> Result<bool> {
    let test_image = read_image::<u8, 3>(test).with_context(|| format!("reading {}", test.display()))?;
    let baseline_image =
        read_image::<u8, 3>(baseline).with_context(|| format!("reading {}", baseline.display()))?;
    let result = comparator.compare(&test_image, &baseline_image)?;
    println!("NumberOfPixelsWithDifference: {}", result.differing_pixel_count);
    println!("MaximumDifference: {}", result.max_difference);
    Ok(result.differing_pixel_count <= comparator.max_differing_pixels)
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::StreamingTest {
            input,
            output_base,
            extension,
            expect,
            pieces,
        } => {
            let mut case = RegressionCase::new(input, output_base, extension);
            case.pieces = pieces;
            run_all(&case, &ExpectedOutcome::from_flags(&expect))
        }
        Commands::Generate {
            output,
            size,
            pieces,
            compress,
        } => generate(&output, &size, pieces, compress).map(|_| true),
        Commands::Compare {
            test,
            baseline,
            tolerance,
            radius,
            max_pixels,
        } => compare(
            &test,
            &baseline,
            ToleranceComparator::new(tolerance, radius).with_max_differing_pixels(max_pixels),
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        logger::init_with_default("debug");
    } else {
        logger::init();
    }

    info!("Starting region_stream...");

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
